// The syntax tree of a trace file; positions are byte offsets into the input.

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRef {
    pub name: String,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub mnemonic: String,
    pub sinks: Vec<RegisterRef>,
    pub sources: Vec<RegisterRef>,
    pub pos: usize,
}
