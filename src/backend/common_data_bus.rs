use crate::instructions::instructions::InstrId;

/// The Common Data Bus: one broadcast per cycle.
///
/// The broadcasting instruction stays on the bus until the next cycle's retire clears it.
#[derive(Default)]
pub(crate) struct CDB {
    occupant: Option<InstrId>,
}

impl CDB {
    pub(crate) fn new() -> CDB {
        CDB { occupant: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }

    pub(crate) fn occupant(&self) -> Option<InstrId> {
        self.occupant
    }

    /// Puts the instruction on the bus. Returns false, leaving the bus untouched, if it is taken.
    pub(crate) fn broadcast(&mut self, instr_id: InstrId) -> bool {
        if self.occupant.is_some() {
            return false;
        }
        self.occupant = Some(instr_id);
        true
    }

    pub(crate) fn clear(&mut self) -> Option<InstrId> {
        self.occupant.take()
    }
}
