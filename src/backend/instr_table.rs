use std::fmt;
use std::rc::Rc;

use crate::cpu::SimError;
use crate::instructions::instructions::{Instr, InstrId, MAX_SOURCE_COUNT};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Stage {
    Fetch,
    Dispatch,
    Issue,
    Execute,
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Dispatch => "dispatch",
            Stage::Issue => "issue",
            Stage::Execute => "execute",
            Stage::Broadcast => "cdb",
        };
        write!(f, "{}", name)
    }
}

/// The dynamic record of a single fetched instruction.
#[derive(Debug, Clone)]
pub(crate) struct InstrSlot {
    pub(crate) instr: Rc<Instr>,
    pub(crate) fetch_cycle: Option<u64>,
    pub(crate) dispatch_cycle: Option<u64>,
    pub(crate) issue_cycle: Option<u64>,
    pub(crate) execute_cycle: Option<u64>,
    pub(crate) cdb_cycle: Option<u64>,
    // The producers of the source operands; None if the value was available at dispatch.
    pub(crate) deps: [Option<InstrId>; MAX_SOURCE_COUNT],
}

impl InstrSlot {
    fn new(instr: Rc<Instr>) -> Self {
        Self {
            instr,
            fetch_cycle: None,
            dispatch_cycle: None,
            issue_cycle: None,
            execute_cycle: None,
            cdb_cycle: None,
            deps: [None; MAX_SOURCE_COUNT],
        }
    }

    pub(crate) fn cycle(&self, stage: Stage) -> Option<u64> {
        match stage {
            Stage::Fetch => self.fetch_cycle,
            Stage::Dispatch => self.dispatch_cycle,
            Stage::Issue => self.issue_cycle,
            Stage::Execute => self.execute_cycle,
            Stage::Broadcast => self.cdb_cycle,
        }
    }

    /// Records the cycle at which the instruction entered `stage`.
    ///
    /// A stage can be entered only once, and only after the stage before it; dispatch may
    /// happen in the fetch cycle and a broadcast in the cycle execution completes, every
    /// other boundary takes at least one cycle.
    pub(crate) fn record(&mut self, stage: Stage, cycle: u64) -> Result<(), SimError> {
        if let Some(previous) = self.cycle(stage) {
            return Err(self.violation(cycle, format!("{} cycle already set to {}", stage, previous)));
        }

        let (before, strict) = match stage {
            Stage::Fetch => (None, false),
            Stage::Dispatch => (Some(Stage::Fetch), false),
            Stage::Issue => (Some(Stage::Dispatch), true),
            Stage::Execute => (Some(Stage::Issue), true),
            Stage::Broadcast => (Some(Stage::Execute), false),
        };

        if let Some(before) = before {
            match self.cycle(before) {
                None => {
                    return Err(self.violation(cycle, format!("{} before {}", stage, before)));
                }
                Some(before_cycle) => {
                    if before_cycle > cycle || (strict && before_cycle == cycle) {
                        return Err(self.violation(
                            cycle,
                            format!("{} at cycle {} does not follow {} at cycle {}", stage, cycle, before, before_cycle)));
                    }
                }
            }
        }

        match stage {
            Stage::Fetch => self.fetch_cycle = Some(cycle),
            Stage::Dispatch => self.dispatch_cycle = Some(cycle),
            Stage::Issue => self.issue_cycle = Some(cycle),
            Stage::Execute => self.execute_cycle = Some(cycle),
            Stage::Broadcast => self.cdb_cycle = Some(cycle),
        }
        Ok(())
    }

    pub(crate) fn violation(&self, cycle: u64, reason: String) -> SimError {
        SimError::InvariantViolation { cycle, index: self.instr.index, reason }
    }

    // Dispatched in an earlier cycle, not yet issued.
    pub(crate) fn can_issue(&self, cycle: u64) -> bool {
        matches!(self.dispatch_cycle, Some(c) if c < cycle) && self.issue_cycle.is_none()
    }
}

/// Arena of all instructions fetched during a run, in fetch order.
///
/// Records are never removed during a run, so an InstrId held by the map table or a
/// dependency vector stays valid after the producer has retired.
pub(crate) struct InstrTable {
    slots: Vec<InstrSlot>,
}

impl InstrTable {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn allocate(&mut self, instr: Rc<Instr>) -> InstrId {
        let id = InstrId(self.slots.len());
        self.slots.push(InstrSlot::new(instr));
        id
    }

    pub(crate) fn get(&self, id: InstrId) -> &InstrSlot {
        &self.slots[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: InstrId) -> &mut InstrSlot {
        &mut self.slots[id.0]
    }

    pub(crate) fn index(&self, id: InstrId) -> usize {
        self.slots[id.0].instr.index
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=&InstrSlot> {
        self.slots.iter()
    }

    /// Looks up the record of the instruction at program index `index`.
    pub(crate) fn find_by_index(&self, index: usize) -> Option<&InstrSlot> {
        // slots are in program order, but traps leave gaps in the indices.
        self.slots
            .binary_search_by_key(&index, |slot| slot.instr.index)
            .ok()
            .map(|pos| &self.slots[pos])
    }

    /// True if every operand of the instruction was broadcast before `cycle`.
    ///
    /// A result broadcast in the current cycle is not forwarded.
    pub(crate) fn operands_ready(&self, id: InstrId, cycle: u64) -> bool {
        self.get(id).deps.iter().flatten().all(|producer| {
            matches!(self.get(*producer).cdb_cycle, Some(c) if c < cycle)
        })
    }

    /// True if the instruction can enter execution in `cycle`.
    pub(crate) fn ready_to_execute(&self, id: InstrId, cycle: u64) -> bool {
        let slot = self.get(id);
        matches!(slot.issue_cycle, Some(c) if c < cycle)
            && slot.execute_cycle.is_none()
            && self.operands_ready(id, cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::InstrClass;

    fn new_slot() -> InstrSlot {
        InstrSlot::new(Rc::new(Instr::new(4, InstrClass::IntComp)))
    }

    #[test]
    fn test_record_in_order() {
        let mut slot = new_slot();
        slot.record(Stage::Fetch, 1).unwrap();
        slot.record(Stage::Dispatch, 1).unwrap();
        slot.record(Stage::Issue, 2).unwrap();
        slot.record(Stage::Execute, 3).unwrap();
        slot.record(Stage::Broadcast, 8).unwrap();
        assert_eq!(slot.cdb_cycle, Some(8));
    }

    #[test]
    fn test_record_twice_is_violation() {
        let mut slot = new_slot();
        slot.record(Stage::Fetch, 1).unwrap();
        let err = slot.record(Stage::Fetch, 2).unwrap_err();
        match err {
            SimError::InvariantViolation { cycle, index, .. } => {
                assert_eq!(cycle, 2);
                assert_eq!(index, 4);
            }
        }
    }

    #[test]
    fn test_record_same_cycle_issue_is_violation() {
        let mut slot = new_slot();
        slot.record(Stage::Fetch, 1).unwrap();
        slot.record(Stage::Dispatch, 1).unwrap();
        assert!(slot.record(Stage::Issue, 1).is_err());
        assert!(slot.issue_cycle.is_none());
    }

    #[test]
    fn test_record_out_of_order_is_violation() {
        let mut slot = new_slot();
        assert!(slot.record(Stage::Execute, 5).is_err());
    }

    #[test]
    fn test_operands_ready_requires_earlier_broadcast() {
        let mut table = InstrTable::new();
        let producer = table.allocate(Rc::new(Instr::new(0, InstrClass::IntComp)));
        let consumer = table.allocate(Rc::new(Instr::new(1, InstrClass::IntComp)));
        table.get_mut(consumer).deps[1] = Some(producer);

        assert!(!table.operands_ready(consumer, 10));

        table.get_mut(producer).cdb_cycle = Some(8);
        assert!(!table.operands_ready(consumer, 8));
        assert!(table.operands_ready(consumer, 9));
    }

    #[test]
    fn test_find_by_index_skips_gaps() {
        let mut table = InstrTable::new();
        table.allocate(Rc::new(Instr::new(0, InstrClass::IntComp)));
        table.allocate(Rc::new(Instr::new(2, InstrClass::Load)));

        assert_eq!(table.find_by_index(2).map(|s| s.instr.class), Some(InstrClass::Load));
        assert!(table.find_by_index(1).is_none());
    }
}
