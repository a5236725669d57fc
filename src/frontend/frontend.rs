use std::cell::RefCell;
use std::rc::Rc;

use log::{info, trace};

use crate::backend::instr_table::{InstrTable, Stage};
use crate::cpu::{CPUConfig, PerfCounters, SimError, Trace};
use crate::instructions::instructions::{InstrQueue, InstrTrace};

/// Pulls instructions from the trace into the instruction queue; one per cycle.
pub(crate) struct Frontend {
    instr_queue: Rc<RefCell<InstrQueue>>,
    instr_table: Rc<RefCell<InstrTable>>,
    instr_trace: Option<InstrTrace>,
    trace: Trace,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Frontend {
    pub(crate) fn new(cpu_config: &CPUConfig,
                      instr_queue: Rc<RefCell<InstrQueue>>,
                      instr_table: Rc<RefCell<InstrTable>>,
                      perf_counters: Rc<RefCell<PerfCounters>>,
    ) -> Frontend {
        Frontend {
            instr_queue,
            instr_table,
            instr_trace: None,
            trace: cpu_config.trace.clone(),
            perf_counters,
        }
    }

    pub(crate) fn init(&mut self, instr_trace: InstrTrace) {
        self.instr_trace = Some(instr_trace);
    }

    /// True once every instruction of the trace has been pulled (or there is no trace).
    pub(crate) fn is_exhausted(&self) -> bool {
        match &self.instr_trace {
            None => true,
            Some(instr_trace) => instr_trace.is_exhausted(),
        }
    }

    pub(crate) fn do_cycle(&mut self, cycle: u64) -> Result<(), SimError> {
        let instr_trace = match &mut self.instr_trace {
            None => return Ok(()),
            Some(instr_trace) => instr_trace,
        };

        let mut instr_queue = self.instr_queue.borrow_mut();
        if instr_queue.is_full() {
            return Ok(());
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        while let Some(instr) = instr_trace.next() {
            if instr.class.is_trap() {
                // traps are not simulated.
                trace!("Skipped trap [{}]", instr);
                perf_counters.trap_skip_cnt += 1;
                continue;
            }

            if self.trace.fetch {
                info!("Fetched [{}]", instr);
            } else {
                trace!("Fetched [{}]", instr);
            }

            let mut instr_table = self.instr_table.borrow_mut();
            let id = instr_table.allocate(instr);
            instr_table.get_mut(id).record(Stage::Fetch, cycle)?;
            instr_queue.enqueue(id);
            perf_counters.fetch_cnt += 1;
            break;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::{Instr, InstrClass};

    fn new_frontend(capacity: u16) -> (Frontend, Rc<RefCell<InstrQueue>>, Rc<RefCell<InstrTable>>) {
        let mut cpu_config = CPUConfig::default();
        cpu_config.instr_queue_capacity = capacity;
        let instr_queue = Rc::new(RefCell::new(InstrQueue::new(capacity)));
        let instr_table = Rc::new(RefCell::new(InstrTable::new()));
        let perf_counters = Rc::new(RefCell::new(PerfCounters::default()));
        let frontend = Frontend::new(&cpu_config, Rc::clone(&instr_queue), Rc::clone(&instr_table), perf_counters);
        (frontend, instr_queue, instr_table)
    }

    #[test]
    fn test_fetch_one_per_cycle_skipping_traps() {
        let (mut frontend, instr_queue, instr_table) = new_frontend(4);
        frontend.init(InstrTrace::new(vec![
            Instr::new(0, InstrClass::Trap),
            Instr::new(1, InstrClass::Trap),
            Instr::new(2, InstrClass::IntComp),
            Instr::new(3, InstrClass::Load),
        ]));

        frontend.do_cycle(1).unwrap();
        assert_eq!(instr_queue.borrow().size(), 1);
        assert_eq!(instr_table.borrow().find_by_index(2).and_then(|s| s.fetch_cycle), Some(1));
        assert!(!frontend.is_exhausted());

        frontend.do_cycle(2).unwrap();
        assert_eq!(instr_queue.borrow().size(), 2);
        assert!(frontend.is_exhausted());

        frontend.do_cycle(3).unwrap();
        assert_eq!(instr_queue.borrow().size(), 2);
        assert_eq!(instr_table.borrow().len(), 2);
    }

    #[test]
    fn test_no_fetch_when_queue_full() {
        let (mut frontend, instr_queue, _) = new_frontend(1);
        frontend.init(InstrTrace::new(vec![
            Instr::new(0, InstrClass::IntComp),
            Instr::new(1, InstrClass::IntComp),
        ]));

        frontend.do_cycle(1).unwrap();
        frontend.do_cycle(2).unwrap();
        assert_eq!(instr_queue.borrow().size(), 1);
        assert!(!frontend.is_exhausted());
    }

    #[test]
    fn test_trailing_traps_exhaust_trace() {
        let (mut frontend, instr_queue, _) = new_frontend(2);
        frontend.init(InstrTrace::new(vec![Instr::new(0, InstrClass::Trap)]));

        frontend.do_cycle(1).unwrap();
        assert!(instr_queue.borrow().is_empty());
        assert!(frontend.is_exhausted());
    }
}
