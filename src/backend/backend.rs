use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, trace};

use crate::backend::common_data_bus::CDB;
use crate::backend::execution_unit::EUTable;
use crate::backend::instr_table::{InstrTable, Stage};
use crate::backend::map_table::MapTable;
use crate::backend::reservation_station::RSTable;
use crate::cpu::{CPUConfig, PerfCounters, SimError, Trace};
use crate::instructions::instructions::{InstrId, InstrQueue, MAX_SOURCE_COUNT, Pool, REGISTER_CNT};

// Logs at info when the stage is traced, otherwise at trace level.
macro_rules! stage_log {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            info!($($arg)+);
        } else {
            trace!($($arg)+);
        }
    };
}

pub(crate) struct Backend {
    instr_queue: Rc<RefCell<InstrQueue>>,
    instr_table: Rc<RefCell<InstrTable>>,
    pub(crate) map_table: MapTable,
    pub(crate) int_rs_table: RSTable,
    pub(crate) fp_rs_table: RSTable,
    pub(crate) int_eu_table: EUTable,
    pub(crate) fp_eu_table: EUTable,
    pub(crate) cdb: CDB,
    trace: Trace,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig,
                      instr_queue: Rc<RefCell<InstrQueue>>,
                      instr_table: Rc<RefCell<InstrTable>>,
                      perf_counters: Rc<RefCell<PerfCounters>>) -> Backend {
        Backend {
            trace: cpu_config.trace.clone(),
            instr_queue,
            instr_table,
            map_table: MapTable::new(REGISTER_CNT),
            int_rs_table: RSTable::new(cpu_config.int_rs_count),
            fp_rs_table: RSTable::new(cpu_config.fp_rs_count),
            int_eu_table: EUTable::new(cpu_config.int_eu_count, cpu_config.int_eu_latency),
            fp_eu_table: EUTable::new(cpu_config.fp_eu_count, cpu_config.fp_eu_latency),
            cdb: CDB::new(),
            perf_counters,
        }
    }

    fn rs_table_mut(&mut self, pool: Pool) -> &mut RSTable {
        match pool {
            Pool::Int => &mut self.int_rs_table,
            Pool::Fp => &mut self.fp_rs_table,
        }
    }

    fn rs_table(&self, pool: Pool) -> &RSTable {
        match pool {
            Pool::Int => &self.int_rs_table,
            Pool::Fp => &self.fp_rs_table,
        }
    }

    fn eu_table(&self, pool: Pool) -> &EUTable {
        match pool {
            Pool::Int => &self.int_eu_table,
            Pool::Fp => &self.fp_eu_table,
        }
    }

    fn eu_table_mut(&mut self, pool: Pool) -> &mut EUTable {
        match pool {
            Pool::Int => &mut self.int_eu_table,
            Pool::Fp => &mut self.fp_eu_table,
        }
    }

    /// True if no instruction holds a reservation station, a functional unit or the CDB.
    pub(crate) fn is_idle(&self) -> bool {
        self.cdb.is_empty()
            && self.int_rs_table.is_empty()
            && self.fp_rs_table.is_empty()
            && self.int_eu_table.is_empty()
            && self.fp_eu_table.is_empty()
    }

    // The instruction that broadcast last cycle leaves the machine.
    pub(crate) fn cycle_retire(&mut self) {
        if let Some(id) = self.cdb.clear() {
            let instr_table = self.instr_table.borrow();
            stage_log!(self.trace.retire, "Retired [{}]", instr_table.get(id).instr);
            self.perf_counters.borrow_mut().retire_cnt += 1;
        }
    }

    // Completed instructions leave their functional unit: stores silently, everything
    // else through the CDB, oldest first, one per cycle.
    pub(crate) fn cycle_cdb(&mut self, cycle: u64) -> Result<(), SimError> {
        let mut candidates: Vec<(Pool, u8, InstrId)> = Vec::new();

        for pool in [Pool::Int, Pool::Fp] {
            for (eu_index, id) in self.eu_table(pool).busy() {
                let (complete, is_store) = {
                    let instr_table = self.instr_table.borrow();
                    let slot = instr_table.get(id);
                    let execute_cycle = match slot.execute_cycle {
                        Some(c) => c,
                        None => return Err(slot.violation(cycle, String::from("occupies a functional unit without executing"))),
                    };
                    let complete = self.eu_table(pool).is_complete(execute_cycle, cycle);
                    (complete, !slot.instr.class.writes_cdb())
                };

                if !complete {
                    continue;
                }

                if is_store {
                    self.release(pool, eu_index, id, cycle)?;
                    let instr_table = self.instr_table.borrow();
                    stage_log!(self.trace.broadcast, "Completed without broadcast [{}]", instr_table.get(id).instr);
                    self.perf_counters.borrow_mut().store_cnt += 1;
                } else {
                    candidates.push((pool, eu_index, id));
                }
            }
        }

        let instr_table = Rc::clone(&self.instr_table);

        let oldest = {
            let instr_table = instr_table.borrow();
            let oldest = candidates
                .iter()
                .copied()
                .min_by_key(|(_, _, id)| instr_table.index(*id));
            oldest
        };

        let (pool, eu_index, id) = match oldest {
            None => return Ok(()),
            Some(candidate) => candidate,
        };

        if let Some(occupant) = self.cdb.occupant() {
            let instr_table = instr_table.borrow();
            return Err(instr_table.get(occupant).violation(cycle, String::from("still on the CDB after retire")));
        }

        if !self.cdb.broadcast(id) {
            let instr_table = instr_table.borrow();
            return Err(instr_table.get(id).violation(cycle, String::from("CDB is taken")));
        }
        instr_table.borrow_mut().get_mut(id).record(Stage::Broadcast, cycle)?;
        self.release(pool, eu_index, id, cycle)?;

        {
            let instr_table = instr_table.borrow();
            stage_log!(self.trace.broadcast, "Broadcast [{}]", instr_table.get(id).instr);
            for (_, _, loser) in candidates.iter().filter(|(_, _, c)| *c != id) {
                debug!("CDB conflict at cycle {}: [{}] waits for the bus", cycle, instr_table.get(*loser).instr);
            }
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        perf_counters.broadcast_cnt += 1;
        perf_counters.cdb_conflict_cnt += (candidates.len() - 1) as u64;
        Ok(())
    }

    fn release(&mut self, pool: Pool, eu_index: u8, id: InstrId, cycle: u64) -> Result<(), SimError> {
        self.eu_table_mut(pool).deallocate(eu_index);
        if !self.rs_table_mut(pool).deallocate(id) {
            let instr_table = self.instr_table.borrow();
            return Err(instr_table.get(id).violation(cycle, format!("not in the {} reservation stations", pool)));
        }
        Ok(())
    }

    // Ready instructions start executing, oldest first, as long as there are idle units.
    pub(crate) fn cycle_execute(&mut self, cycle: u64) -> Result<(), SimError> {
        for pool in [Pool::Int, Pool::Fp] {
            let mut ready: Vec<InstrId> = {
                let instr_table = self.instr_table.borrow();
                let mut ready: Vec<InstrId> = self.rs_table(pool)
                    .busy()
                    .into_iter()
                    .filter(|id| instr_table.ready_to_execute(*id, cycle))
                    .collect();
                ready.sort_by_key(|id| instr_table.index(*id));
                ready
            };

            for id in ready.drain(..) {
                if self.eu_table_mut(pool).allocate(id).is_none() {
                    // the rest stays ready for a later cycle.
                    break;
                }

                let mut instr_table = self.instr_table.borrow_mut();
                let slot = instr_table.get_mut(id);
                slot.record(Stage::Execute, cycle)?;
                slot.deps = [None; MAX_SOURCE_COUNT];
                stage_log!(self.trace.execute, "Executing [{}]", slot.instr);
                self.perf_counters.borrow_mut().execute_cnt += 1;
            }
        }
        Ok(())
    }

    // Instructions dispatched in an earlier cycle are marked issued.
    pub(crate) fn cycle_issue(&mut self, cycle: u64) -> Result<(), SimError> {
        let mut instr_table = self.instr_table.borrow_mut();

        for pool in [Pool::Int, Pool::Fp] {
            for id in self.rs_table(pool).busy() {
                let slot = instr_table.get_mut(id);
                if slot.can_issue(cycle) {
                    slot.record(Stage::Issue, cycle)?;
                    stage_log!(self.trace.issue, "Issued [{}]", slot.instr);
                    self.perf_counters.borrow_mut().issue_cnt += 1;
                }
            }
        }
        Ok(())
    }

    // Moves the head of the instruction queue into a reservation station. Single
    // dispatch port: when the head can't move, nothing behind it moves either.
    pub(crate) fn cycle_dispatch(&mut self, cycle: u64) -> Result<(), SimError> {
        let instr_queue = Rc::clone(&self.instr_queue);
        let mut instr_queue = instr_queue.borrow_mut();

        let id = match instr_queue.head() {
            None => return Ok(()),
            Some(id) => id,
        };

        let class = self.instr_table.borrow().get(id).instr.class;

        let pool = match class.pool() {
            Some(pool) => pool,
            None => {
                // control flow is resolved at dispatch and never reaches the backend.
                let mut instr_table = self.instr_table.borrow_mut();
                let slot = instr_table.get_mut(id);
                if !class.is_control() {
                    return Err(slot.violation(cycle, format!("{:?} can't be dispatched", class)));
                }
                slot.record(Stage::Dispatch, cycle)?;
                stage_log!(self.trace.dispatch, "Dispatched control [{}]", slot.instr);
                instr_queue.dequeue();
                self.perf_counters.borrow_mut().control_cnt += 1;
                return Ok(());
            }
        };

        if self.rs_table_mut(pool).allocate(id).is_none() {
            let instr_table = self.instr_table.borrow();
            debug!("Dispatch stall at cycle {}: no free {} reservation station for [{}]", cycle, pool, instr_table.get(id).instr);
            self.perf_counters.borrow_mut().dispatch_stall_cnt += 1;
            return Ok(());
        }

        let mut instr_table = self.instr_table.borrow_mut();
        self.map_table.capture_dependencies(&mut instr_table, id);
        self.map_table.claim_destinations(&instr_table, id, cycle)?;

        let slot = instr_table.get_mut(id);
        slot.record(Stage::Dispatch, cycle)?;
        stage_log!(self.trace.dispatch, "Dispatched [{}]", slot.instr);
        instr_queue.dequeue();
        self.perf_counters.borrow_mut().dispatch_cnt += 1;
        Ok(())
    }
}
