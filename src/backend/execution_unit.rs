use crate::instructions::instructions::InstrId;

/// A single functional unit.
pub(crate) struct EU {
    pub(crate) index: u8,
    pub(crate) instr_id: Option<InstrId>,
    pub(crate) state: EUState,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum EUState {
    IDLE,
    BUSY,
}

impl EU {
    fn reset(&mut self) {
        self.instr_id = None;
        self.state = EUState::IDLE;
    }
}

/// A pool of identical functional units with a fixed latency.
///
/// A unit is busy from the cycle its instruction starts executing until the
/// instruction leaves; that is at least `latency` cycles, longer when the
/// result has to wait for the CDB.
pub(crate) struct EUTable {
    pub(crate) capacity: u8,
    pub(crate) latency: u8,
    idle_stack: Vec<u8>,
    array: Vec<EU>,
}

impl EUTable {
    pub(crate) fn new(capacity: u8, latency: u8) -> EUTable {
        let mut idle_stack = Vec::with_capacity(capacity as usize);
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(EU { index: i, instr_id: None, state: EUState::IDLE });
        }
        for i in (0..capacity).rev() {
            idle_stack.push(i);
        }

        EUTable {
            capacity,
            latency,
            array,
            idle_stack,
        }
    }

    pub(crate) fn size(&self) -> u8 {
        self.capacity - self.idle_stack.len() as u8
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Starts the instruction on an idle unit. Returns None when every unit is busy.
    pub(crate) fn allocate(&mut self, instr_id: InstrId) -> Option<u8> {
        let eu_index = self.idle_stack.pop()?;
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.state == EUState::IDLE);
        eu.state = EUState::BUSY;
        eu.instr_id = Some(instr_id);
        Some(eu_index)
    }

    pub(crate) fn deallocate(&mut self, eu_index: u8) {
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.state == EUState::BUSY, "Can't deallocate an idle EU {}", eu_index);
        eu.reset();
        self.idle_stack.push(eu_index);
    }

    /// True if an instruction that started executing at `execute_cycle` is done by `cycle`.
    pub(crate) fn is_complete(&self, execute_cycle: u64, cycle: u64) -> bool {
        cycle >= execute_cycle + self.latency as u64
    }

    /// The busy units as (unit index, instruction) pairs.
    pub(crate) fn busy(&self) -> Vec<(u8, InstrId)> {
        self.array
            .iter()
            .filter_map(|eu| eu.instr_id.map(|id| (eu.index, id)))
            .collect()
    }
}
