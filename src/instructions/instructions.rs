use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Converts a byte offset into the input to a 1-based line/column.
    pub(crate) fn from_offset(input: &str, offset: usize) -> SourceLocation {
        let mut line = 1;
        let mut column = 1;
        for (pos, c) in input.char_indices() {
            if pos >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        SourceLocation { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The class of an instruction; this is all the scheduler needs to know about an opcode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum InstrClass {
    IntComp,
    FpComp,
    Load,
    Store,
    CondCtrl,
    UncondCtrl,
    Trap,
}

/// The reservation station / functional unit pool an instruction is scheduled on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Pool {
    Int,
    Fp,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Int => write!(f, "INT"),
            Pool::Fp => write!(f, "FP"),
        }
    }
}

impl InstrClass {
    pub(crate) fn is_control(&self) -> bool {
        matches!(self, InstrClass::CondCtrl | InstrClass::UncondCtrl)
    }

    pub(crate) fn is_trap(&self) -> bool {
        *self == InstrClass::Trap
    }

    // Loads and stores do their address arithmetic on the integer units.
    pub(crate) fn pool(&self) -> Option<Pool> {
        match self {
            InstrClass::IntComp | InstrClass::Load | InstrClass::Store => Some(Pool::Int),
            InstrClass::FpComp => Some(Pool::Fp),
            InstrClass::CondCtrl | InstrClass::UncondCtrl | InstrClass::Trap => None,
        }
    }

    pub(crate) fn writes_cdb(&self) -> bool {
        matches!(self, InstrClass::IntComp | InstrClass::FpComp | InstrClass::Load)
    }
}

pub(crate) fn mnemonic(class: InstrClass) -> &'static str {
    match class {
        InstrClass::IntComp => "ICOMP",
        InstrClass::FpComp => "FCOMP",
        InstrClass::Load => "LOAD",
        InstrClass::Store => "STORE",
        InstrClass::CondCtrl => "BRANCH",
        InstrClass::UncondCtrl => "JUMP",
        InstrClass::Trap => "TRAP",
    }
}

pub(crate) fn get_class(mnemonic: &str) -> Option<InstrClass> {
    let string = mnemonic.to_uppercase();

    match string.as_str() {
        "ICOMP" | "INT" => Some(InstrClass::IntComp),
        "FCOMP" | "FP" => Some(InstrClass::FpComp),
        "LOAD" | "LD" => Some(InstrClass::Load),
        "STORE" | "ST" => Some(InstrClass::Store),
        "BRANCH" | "COND" => Some(InstrClass::CondCtrl),
        "JUMP" | "CALL" | "UNCOND" => Some(InstrClass::UncondCtrl),
        "TRAP" | "SYSCALL" => Some(InstrClass::Trap),
        _ => None,
    }
}

pub(crate) type RegisterType = u16;

pub(crate) const INT_REG_CNT: u16 = 32;
pub(crate) const FP_REG_CNT: u16 = 32;
pub(crate) const FP_REG_BASE: u16 = INT_REG_CNT;
pub(crate) const HI: u16 = FP_REG_BASE + FP_REG_CNT;
pub(crate) const LO: u16 = HI + 1;
pub(crate) const FCC: u16 = LO + 1;
// The total number of architectural registers known to the map table.
pub(crate) const REGISTER_CNT: u16 = FCC + 1;
// r0 is hardwired to zero; it never carries a dependency.
pub(crate) const ZERO_REG: u16 = 0;

pub(crate) fn register_name(reg: RegisterType) -> String {
    match reg {
        HI => String::from("hi"),
        LO => String::from("lo"),
        FCC => String::from("fcc"),
        _ if reg >= FP_REG_BASE => format!("f{}", reg - FP_REG_BASE),
        _ => format!("r{}", reg),
    }
}

// The maximum number of source (input) operands for an instruction.
pub(crate) const MAX_SOURCE_COUNT: usize = 3;
pub(crate) const MAX_SINK_COUNT: usize = 2;

/// The static part of an instruction descriptor. The dynamic timing lives in the InstrTable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Instr {
    // position in the trace; the tie-breaker for all contention.
    pub(crate) index: usize,
    pub(crate) class: InstrClass,
    pub(crate) source: [Option<RegisterType>; MAX_SOURCE_COUNT],
    pub(crate) sink: [Option<RegisterType>; MAX_SINK_COUNT],
    pub(crate) loc: Option<SourceLocation>,
}

impl Instr {
    pub(crate) fn new(index: usize, class: InstrClass) -> Instr {
        Instr {
            index,
            class,
            source: [None; MAX_SOURCE_COUNT],
            sink: [None; MAX_SINK_COUNT],
            loc: None,
        }
    }

    pub(crate) fn with_sources(mut self, sources: &[RegisterType]) -> Instr {
        assert!(sources.len() <= MAX_SOURCE_COUNT, "Too many sources: {}", sources.len());
        for (k, reg) in sources.iter().enumerate() {
            self.source[k] = Some(*reg);
        }
        self
    }

    pub(crate) fn with_sinks(mut self, sinks: &[RegisterType]) -> Instr {
        assert!(sinks.len() <= MAX_SINK_COUNT, "Too many sinks: {}", sinks.len());
        for (k, reg) in sinks.iter().enumerate() {
            self.sink[k] = Some(*reg);
        }
        self
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(self.class))?;

        let sinks: Vec<String> = self.sink.iter().flatten().map(|r| register_name(*r)).collect();
        let sources: Vec<String> = self.source.iter().flatten().map(|r| register_name(*r)).collect();

        if !sinks.is_empty() {
            write!(f, " {}", sinks.join(","))?;
        }
        if !sources.is_empty() {
            write!(f, " <- {}", sources.join(","))?;
        }

        write!(f, " ({})", self.index)?;

        if let Some(loc) = self.loc {
            write!(f, " ; {}", loc)?;
        }

        Ok(())
    }
}

/// A stable handle to a dynamic instruction record in the InstrTable.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub(crate) struct InstrId(pub(crate) usize);

// The InstrQueue sits between frontend and backend and holds fetched
// instructions in program order until they are dispatched.
pub(crate) struct InstrQueue {
    capacity: u16,
    head: u64,
    tail: u64,
    instructions: Vec<InstrId>,
}

impl InstrQueue {
    pub fn new(capacity: u16) -> Self {
        let mut instructions = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            instructions.push(InstrId(0));
        }

        InstrQueue {
            capacity,
            head: 0,
            tail: 0,
            instructions,
        }
    }

    pub fn size(&self) -> u16 {
        (self.tail - self.head) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    pub fn enqueue(&mut self, instr_id: InstrId) {
        assert!(!self.is_full(), "Can't enqueue when InstrQueue is full.");

        let index = (self.tail % self.capacity as u64) as usize;
        self.instructions[index] = instr_id;
        self.tail += 1;
    }

    pub fn dequeue(&mut self) -> InstrId {
        assert!(!self.is_empty(), "Can't dequeue when InstrQueue is empty.");

        let instr_id = self.peek();
        self.head += 1;
        instr_id
    }

    pub fn peek(&self) -> InstrId {
        assert!(!self.is_empty(), "Can't peek when InstrQueue is empty.");

        let index = (self.head % self.capacity as u64) as usize;
        self.instructions[index]
    }

    pub fn head(&self) -> Option<InstrId> {
        if self.is_empty() {
            None
        } else {
            Some(self.peek())
        }
    }
}

/// An ordered instruction trace with a pull cursor.
///
/// Checking for the end of the trace never consumes anything; only `next` moves the cursor.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstrTrace {
    code: Vec<Rc<Instr>>,
    cursor: usize,
}

impl InstrTrace {
    pub(crate) fn new(code: Vec<Instr>) -> InstrTrace {
        InstrTrace {
            code: code.into_iter().map(Rc::new).collect(),
            cursor: 0,
        }
    }

    pub(crate) fn next(&mut self) -> Option<Rc<Instr>> {
        let instr = self.code.get(self.cursor).map(Rc::clone);
        if instr.is_some() {
            self.cursor += 1;
        }
        instr
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.cursor >= self.code.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.code.len()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_queue_fifo() {
        let mut queue = InstrQueue::new(2);
        assert!(queue.is_empty());
        assert_eq!(queue.head(), None);

        queue.enqueue(InstrId(7));
        queue.enqueue(InstrId(8));
        assert!(queue.is_full());
        assert_eq!(queue.dequeue(), InstrId(7));

        queue.enqueue(InstrId(9));
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.dequeue(), InstrId(8));
        assert_eq!(queue.dequeue(), InstrId(9));
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_instr_queue_enqueue_full() {
        let mut queue = InstrQueue::new(1);
        queue.enqueue(InstrId(0));
        queue.enqueue(InstrId(1));
    }

    #[test]
    fn test_trace_cursor_end_check_is_side_effect_free() {
        let mut trace = InstrTrace::new(vec![Instr::new(0, InstrClass::IntComp)]);
        assert!(!trace.is_exhausted());
        assert!(!trace.is_exhausted());
        assert_eq!(trace.next().map(|i| i.index), Some(0));
        assert!(trace.is_exhausted());
        assert!(trace.next().is_none());
        assert!(trace.is_exhausted());
    }

    #[test]
    fn test_class_pools() {
        assert_eq!(InstrClass::Load.pool(), Some(Pool::Int));
        assert_eq!(InstrClass::Store.pool(), Some(Pool::Int));
        assert_eq!(InstrClass::FpComp.pool(), Some(Pool::Fp));
        assert_eq!(InstrClass::CondCtrl.pool(), None);
        assert!(!InstrClass::Store.writes_cdb());
        assert!(InstrClass::Load.writes_cdb());
    }

    #[test]
    fn test_register_names() {
        assert_eq!(register_name(3), "r3");
        assert_eq!(register_name(FP_REG_BASE + 2), "f2");
        assert_eq!(register_name(FCC), "fcc");
    }

    #[test]
    fn test_source_location_from_offset() {
        let input = "ab\ncd";
        assert_eq!(SourceLocation::from_offset(input, 0), SourceLocation { line: 1, column: 1 });
        assert_eq!(SourceLocation::from_offset(input, 4), SourceLocation { line: 2, column: 2 });
    }
}
