use crate::instructions::instructions::InstrId;

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
}

// A single reservation station
pub(crate) struct RS {
    pub(crate) index: u16,
    pub(crate) state: RSState,
    pub(crate) instr_id: Option<InstrId>,
}

impl RS {
    fn new(index: u16) -> Self {
        Self {
            index,
            state: RSState::IDLE,
            instr_id: None,
        }
    }

    fn reset(&mut self) {
        self.instr_id = None;
        self.state = RSState::IDLE;
    }
}

/// A pool of reservation stations.
///
/// An entry is held from dispatch until the instruction broadcasts (or, for a store,
/// finishes executing), so an executing instruction still occupies its station.
pub(crate) struct RSTable {
    pub(crate) capacity: u16,
    free_stack: Vec<u16>,
    array: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new(capacity: u16) -> Self {
        let mut free_stack = Vec::with_capacity(capacity as usize);
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(RS::new(i));
        }
        // lowest index on top of the stack
        for i in (0..capacity).rev() {
            free_stack.push(i);
        }

        RSTable {
            capacity,
            array,
            free_stack,
        }
    }

    pub(crate) fn size(&self) -> u16 {
        self.capacity - self.free_stack.len() as u16
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Occupies a free station with the instruction. Returns None when the pool is full;
    /// a busy station is never overwritten.
    pub(crate) fn allocate(&mut self, instr_id: InstrId) -> Option<u16> {
        let rs_index = self.free_stack.pop()?;
        let rs = &mut self.array[rs_index as usize];
        debug_assert!(rs.state == RSState::IDLE);
        rs.state = RSState::BUSY;
        rs.instr_id = Some(instr_id);
        Some(rs_index)
    }

    /// Frees the station holding the instruction. Returns false if no station holds it.
    pub(crate) fn deallocate(&mut self, instr_id: InstrId) -> bool {
        match self.array.iter_mut().find(|rs| rs.instr_id == Some(instr_id)) {
            Some(rs) => {
                rs.reset();
                self.free_stack.push(rs.index);
                true
            }
            None => false,
        }
    }

    /// The instructions held by the busy stations, in station order.
    pub(crate) fn busy(&self) -> Vec<InstrId> {
        self.array.iter().filter_map(|rs| rs.instr_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_full() {
        let mut table = RSTable::new(2);
        assert!(table.is_empty());
        assert_eq!(table.allocate(InstrId(0)), Some(0));
        assert_eq!(table.allocate(InstrId(1)), Some(1));
        assert_eq!(table.allocate(InstrId(2)), None);
        assert_eq!(table.size(), 2);
        assert_eq!(table.busy(), vec![InstrId(0), InstrId(1)]);
    }

    #[test]
    fn test_deallocate_frees_the_right_station() {
        let mut table = RSTable::new(3);
        table.allocate(InstrId(10));
        table.allocate(InstrId(11));
        table.allocate(InstrId(12));

        assert!(table.deallocate(InstrId(11)));
        assert!(!table.deallocate(InstrId(11)));
        assert_eq!(table.busy(), vec![InstrId(10), InstrId(12)]);

        assert_eq!(table.allocate(InstrId(13)), Some(1));
    }
}
