use std::cell::RefCell;
use std::fs::File;
use std::rc::Rc;

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::backend::Backend;
use crate::backend::instr_table::InstrTable;
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{InstrQueue, InstrTrace};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PerfCounters {
    pub fetch_cnt: u64,
    pub trap_skip_cnt: u64,
    pub dispatch_cnt: u64,
    pub control_cnt: u64,
    pub issue_cnt: u64,
    pub execute_cnt: u64,
    pub broadcast_cnt: u64,
    pub store_cnt: u64,
    pub retire_cnt: u64,
    pub dispatch_stall_cnt: u64,
    pub cdb_conflict_cnt: u64,
    pub cycle_cnt: u64,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct Trace {
    pub fetch: bool,
    pub dispatch: bool,
    pub issue: bool,
    pub execute: bool,
    pub broadcast: bool,
    pub retire: bool,
    pub cycle: bool,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
pub(crate) struct CPUConfig {
    // the capacity of the instruction queue between frontend and backend
    pub(crate) instr_queue_capacity: u16,
    // the number of integer reservation stations; loads and stores use them too
    pub(crate) int_rs_count: u16,
    // the number of floating point reservation stations
    pub(crate) fp_rs_count: u16,
    // the number of integer functional units
    pub(crate) int_eu_count: u8,
    // the number of floating point functional units
    pub(crate) fp_eu_count: u8,
    // the number of cycles an integer functional unit needs per instruction
    pub(crate) int_eu_latency: u8,
    // the number of cycles a floating point functional unit needs per instruction
    pub(crate) fp_eu_latency: u8,
    // which pipeline events should be logged at info level
    #[serde(default)]
    pub(crate) trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> Self {
        CPUConfig {
            instr_queue_capacity: 16,
            int_rs_count: 5,
            fp_rs_count: 3,
            int_eu_count: 3,
            fp_eu_count: 1,
            int_eu_latency: 5,
            fp_eu_latency: 7,
            trace: Trace::default(),
        }
    }
}

impl CPUConfig {
    /// Rejects configurations with an empty pool or a zero latency.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("instr_queue_capacity", self.instr_queue_capacity as u64),
            ("int_rs_count", self.int_rs_count as u64),
            ("fp_rs_count", self.fp_rs_count as u64),
            ("int_eu_count", self.int_eu_count as u64),
            ("fp_eu_count", self.fp_eu_count as u64),
            ("int_eu_latency", self.int_eu_latency as u64),
            ("fp_eu_latency", self.fp_eu_latency as u64),
        ];

        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Invalid(name.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("'{0}' must be larger than 0")]
    Invalid(String),
    #[error("can't read config: {0}")]
    IOError(#[from] std::io::Error),
    #[error("can't parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// A structural invariant of the model was broken; this is a bug in the model, not in the trace.
#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum SimError {
    #[error("invariant violated at cycle {cycle} by instruction {index}: {reason}")]
    InvariantViolation {
        cycle: u64,
        index: usize,
        reason: String,
    },
}

pub(crate) fn load_cpu_config(file_path: &str) -> Result<CPUConfig, ConfigError> {
    let file = File::open(file_path)?;
    let config: CPUConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

/// The cycle engine.
///
/// Every cycle runs the stages back to front: retire, execute->CDB, issue->execute,
/// dispatch->issue, fetch->dispatch. Running them in reverse keeps a result broadcast in
/// this cycle invisible to this cycle's readiness checks, and keeps an instruction that was
/// dispatched this cycle from issuing before the next one.
pub(crate) struct CPU {
    cpu_config: CPUConfig,
    pub(crate) backend: Backend,
    pub(crate) frontend: Frontend,
    pub(crate) instr_queue: Rc<RefCell<InstrQueue>>,
    pub(crate) instr_table: Rc<RefCell<InstrTable>>,
    pub(crate) perf_counters: Rc<RefCell<PerfCounters>>,
    // the cycle that the next step will execute; cycles are numbered from 1.
    cycle: u64,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Result<CPU, ConfigError> {
        cpu_config.validate()?;

        let instr_queue = Rc::new(RefCell::new(InstrQueue::new(cpu_config.instr_queue_capacity)));
        let instr_table = Rc::new(RefCell::new(InstrTable::new()));
        let perf_counters = Rc::new(RefCell::new(PerfCounters::default()));

        let backend = Backend::new(
            cpu_config,
            Rc::clone(&instr_queue),
            Rc::clone(&instr_table),
            Rc::clone(&perf_counters),
        );

        let frontend = Frontend::new(
            cpu_config,
            Rc::clone(&instr_queue),
            Rc::clone(&instr_table),
            Rc::clone(&perf_counters),
        );

        Ok(CPU {
            cpu_config: cpu_config.clone(),
            backend,
            frontend,
            instr_queue,
            instr_table,
            perf_counters,
            cycle: 1,
        })
    }

    /// Drops all in-flight state; the next step is cycle 1 again.
    pub(crate) fn reset(&mut self) {
        *self.instr_queue.borrow_mut() = InstrQueue::new(self.cpu_config.instr_queue_capacity);
        *self.instr_table.borrow_mut() = InstrTable::new();
        *self.perf_counters.borrow_mut() = PerfCounters::default();

        self.backend = Backend::new(
            &self.cpu_config,
            Rc::clone(&self.instr_queue),
            Rc::clone(&self.instr_table),
            Rc::clone(&self.perf_counters),
        );
        self.frontend = Frontend::new(
            &self.cpu_config,
            Rc::clone(&self.instr_queue),
            Rc::clone(&self.instr_table),
            Rc::clone(&self.perf_counters),
        );
        self.cycle = 1;
    }

    /// The number of cycles executed so far.
    pub(crate) fn cycles(&self) -> u64 {
        self.cycle - 1
    }

    /// Executes a single cycle.
    pub(crate) fn step(&mut self) -> Result<(), SimError> {
        let cycle = self.cycle;

        self.backend.cycle_retire();
        self.backend.cycle_cdb(cycle)?;
        self.backend.cycle_execute(cycle)?;
        self.backend.cycle_issue(cycle)?;
        self.frontend.do_cycle(cycle)?;
        self.backend.cycle_dispatch(cycle)?;

        self.cycle += 1;

        let mut perf_counters = self.perf_counters.borrow_mut();
        perf_counters.cycle_cnt += 1;

        if self.cpu_config.trace.cycle {
            info!("[Cycle:{}][Fetched={}][Dispatched={}][Issued={}][Executed={}][Broadcast={}][Queue={}]",
                  cycle,
                  perf_counters.fetch_cnt,
                  perf_counters.dispatch_cnt + perf_counters.control_cnt,
                  perf_counters.issue_cnt,
                  perf_counters.execute_cnt,
                  perf_counters.broadcast_cnt,
                  self.instr_queue.borrow().size());
        }
        Ok(())
    }

    /// True when the trace is consumed and nothing is left anywhere in the machine.
    pub(crate) fn is_done(&self) -> bool {
        self.frontend.is_exhausted()
            && self.instr_queue.borrow().is_empty()
            && self.backend.is_idle()
    }

    /// Runs the trace to completion and returns the number of cycles it took.
    pub(crate) fn run(&mut self, instr_trace: InstrTrace) -> Result<u64, SimError> {
        self.reset();
        info!("Running trace of {} instructions", instr_trace.len());
        self.frontend.init(instr_trace);

        loop {
            self.step()?;
            if self.is_done() {
                break;
            }
        }

        info!("Trace complete after {} cycles", self.cycles());
        Ok(self.cycles())
    }
}
