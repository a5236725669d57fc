use crate::backend::instr_table::InstrTable;
use crate::cpu::SimError;
use crate::instructions::instructions::{InstrId, RegisterType, REGISTER_CNT, ZERO_REG};

/// The Map Table. This structure is used for the register renaming
/// process. The entry for a given architectural register points to the
/// most recently dispatched instruction that writes it.
///
/// Entries are never removed. An entry for a producer that already
/// retired is harmless: consumers check the producer's broadcast cycle.
pub(crate) struct MapTable {
    pub(crate) table: Vec<Option<InstrId>>,
}

impl MapTable {
    pub fn new(register_cnt: u16) -> Self {
        Self { table: vec![None; register_cnt as usize] }
    }

    pub fn get(&self, arch_reg: RegisterType) -> Option<InstrId> {
        self.table[arch_reg as usize]
    }

    /// Points every source operand of the instruction at its current producer.
    pub(crate) fn capture_dependencies(&self, instr_table: &mut InstrTable, id: InstrId) {
        let slot = instr_table.get_mut(id);
        for (k, source) in slot.instr.source.iter().enumerate() {
            slot.deps[k] = match source {
                Some(arch_reg) if *arch_reg != ZERO_REG => self.get(*arch_reg),
                _ => None,
            };
        }
    }

    /// Makes the instruction the producer of its sink registers.
    ///
    /// Must be called after capture_dependencies for the same instruction.
    pub(crate) fn claim_destinations(&mut self, instr_table: &InstrTable, id: InstrId, cycle: u64) -> Result<(), SimError> {
        let slot = instr_table.get(id);
        if slot.deps.iter().any(|dep| *dep == Some(id)) {
            return Err(slot.violation(cycle, String::from("instruction depends on itself")));
        }

        // an instruction that never broadcasts can't be waited on.
        if !slot.instr.class.writes_cdb() {
            return Ok(());
        }

        for arch_reg in slot.instr.sink.iter().flatten() {
            if *arch_reg != ZERO_REG {
                self.table[*arch_reg as usize] = Some(id);
            }
        }
        Ok(())
    }
}

impl Default for MapTable {
    fn default() -> Self {
        MapTable::new(REGISTER_CNT)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::instructions::instructions::{Instr, InstrClass};

    #[test]
    fn test_capture_then_claim() {
        let mut instr_table = InstrTable::new();
        let mut map_table = MapTable::default();

        let first = instr_table.allocate(Rc::new(Instr::new(0, InstrClass::IntComp).with_sinks(&[1]).with_sources(&[2])));
        map_table.capture_dependencies(&mut instr_table, first);
        map_table.claim_destinations(&instr_table, first, 1).unwrap();
        assert_eq!(instr_table.get(first).deps, [None, None, None]);
        assert_eq!(map_table.get(1), Some(first));

        // reads and writes r1: depends on the previous producer, not on itself.
        let second = instr_table.allocate(Rc::new(Instr::new(1, InstrClass::IntComp).with_sinks(&[1]).with_sources(&[3, 1])));
        map_table.capture_dependencies(&mut instr_table, second);
        map_table.claim_destinations(&instr_table, second, 2).unwrap();
        assert_eq!(instr_table.get(second).deps, [None, Some(first), None]);
        assert_eq!(map_table.get(1), Some(second));
    }

    #[test]
    fn test_zero_register_never_renamed() {
        let mut instr_table = InstrTable::new();
        let mut map_table = MapTable::default();

        let writer = instr_table.allocate(Rc::new(Instr::new(0, InstrClass::IntComp).with_sinks(&[ZERO_REG])));
        map_table.capture_dependencies(&mut instr_table, writer);
        map_table.claim_destinations(&instr_table, writer, 1).unwrap();
        assert_eq!(map_table.get(ZERO_REG), None);

        let reader = instr_table.allocate(Rc::new(Instr::new(1, InstrClass::IntComp).with_sources(&[ZERO_REG])));
        map_table.capture_dependencies(&mut instr_table, reader);
        assert_eq!(instr_table.get(reader).deps, [None, None, None]);
    }

    #[test]
    fn test_store_does_not_claim() {
        let mut instr_table = InstrTable::new();
        let mut map_table = MapTable::default();

        let store = instr_table.allocate(Rc::new(Instr::new(0, InstrClass::Store).with_sinks(&[5])));
        map_table.capture_dependencies(&mut instr_table, store);
        map_table.claim_destinations(&instr_table, store, 1).unwrap();
        assert_eq!(map_table.get(5), None);
    }

    #[test]
    fn test_self_dependency_is_violation() {
        let mut instr_table = InstrTable::new();
        let mut map_table = MapTable::default();

        let id = instr_table.allocate(Rc::new(Instr::new(3, InstrClass::IntComp).with_sinks(&[1]).with_sources(&[1])));
        map_table.claim_destinations(&instr_table, id, 1).unwrap();
        // capturing after claiming would make the instruction its own producer.
        map_table.capture_dependencies(&mut instr_table, id);
        assert!(map_table.claim_destinations(&instr_table, id, 1).is_err());
    }
}
