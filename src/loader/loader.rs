use std::fs;
use std::io;

use lalrpop_util::ParseError;
use regex::Regex;
use thiserror::Error;

use crate::instructions::instructions::{FCC, FP_REG_BASE, FP_REG_CNT, get_class, HI, Instr, InstrClass, InstrTrace, INT_REG_CNT, LO, MAX_SINK_COUNT, MAX_SOURCE_COUNT, RegisterType, SourceLocation};
use crate::loader::ast::{Line, RegisterRef};
use crate::trace_file::TraceFileParser;

#[derive(Error, Debug)]
pub(crate) enum LoadError {
    #[error("{0}")]
    ParseError(String),
    #[error("{}", .0.join("\n"))]
    AnalysisError(Vec<String>),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    IOError(String),
}

struct Loader {
    src: String,
    register_regex: Regex,
    errors: Vec<String>,
}

impl Loader {
    fn new(src: String) -> Loader {
        Loader {
            src,
            register_regex: Regex::new(r"^(?i)([rf])(\d+)$").unwrap(),
            errors: Vec::new(),
        }
    }

    fn load(&mut self) -> Result<InstrTrace, LoadError> {
        let lines = self.parse()?;

        let mut code = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if let Some(instr) = self.analyze_line(index, line) {
                code.push(instr);
            }
        }

        if !self.errors.is_empty() {
            return Err(LoadError::AnalysisError(self.errors.clone()));
        }

        Ok(InstrTrace::new(code))
    }

    fn parse(&self) -> Result<Vec<Line>, LoadError> {
        let src = self.src.as_str();
        TraceFileParser::new()
            .parse(src)
            .map_err(|err| {
                let err = err.map_location(|offset| SourceLocation::from_offset(src, offset));
                let loc = match &err {
                    ParseError::InvalidToken { location } => Some(*location),
                    ParseError::UnrecognizedEof { location, .. } => Some(*location),
                    ParseError::UnrecognizedToken { token: (start, _, _), .. } => Some(*start),
                    ParseError::ExtraToken { token: (start, _, _) } => Some(*start),
                    ParseError::User { .. } => None,
                };
                match loc {
                    Some(loc) => LoadError::ParseError(format!("Parse error at {}: {}", loc, err)),
                    None => LoadError::ParseError(format!("Parse error: {}", err)),
                }
            })
    }

    fn location(&self, pos: usize) -> SourceLocation {
        SourceLocation::from_offset(&self.src, pos)
    }

    fn analyze_line(&mut self, index: usize, line: &Line) -> Option<Instr> {
        let loc = self.location(line.pos);
        let error_cnt = self.errors.len();

        let class = match get_class(&line.mnemonic) {
            Some(class) => class,
            None => {
                self.errors.push(format!("Unknown instruction class '{}' at {}", line.mnemonic, loc));
                return None;
            }
        };

        if line.sources.len() > MAX_SOURCE_COUNT {
            self.errors.push(format!("{} has {} sources, at most {} are allowed, at {}",
                                     line.mnemonic, line.sources.len(), MAX_SOURCE_COUNT, loc));
        }

        if line.sinks.len() > MAX_SINK_COUNT {
            self.errors.push(format!("{} has {} sinks, at most {} are allowed, at {}",
                                     line.mnemonic, line.sinks.len(), MAX_SINK_COUNT, loc));
        }

        if class == InstrClass::Store && !line.sinks.is_empty() {
            self.errors.push(format!("{} writes memory and can't have a sink register, at {}", line.mnemonic, loc));
        }

        let sinks = self.parse_registers(&line.sinks);
        let sources = self.parse_registers(&line.sources);

        if self.errors.len() > error_cnt {
            return None;
        }

        let mut instr = Instr::new(index, class)
            .with_sources(&sources)
            .with_sinks(&sinks);
        instr.loc = Some(loc);
        Some(instr)
    }

    fn parse_registers(&mut self, refs: &[RegisterRef]) -> Vec<RegisterType> {
        let mut registers = Vec::with_capacity(refs.len());
        for register_ref in refs {
            match get_register(&self.register_regex, &register_ref.name) {
                Some(reg) => registers.push(reg),
                None => {
                    let loc = self.location(register_ref.pos);
                    self.errors.push(format!("Illegal register '{}' at {}", register_ref.name, loc));
                }
            }
        }
        registers
    }
}

fn get_register(register_regex: &Regex, name: &str) -> Option<RegisterType> {
    match name.to_lowercase().as_str() {
        "hi" => return Some(HI),
        "lo" => return Some(LO),
        "fcc" => return Some(FCC),
        _ => {}
    }

    let captures = register_regex.captures(name)?;
    let reg: u16 = captures[2].parse().ok()?;
    let is_fp = captures[1].eq_ignore_ascii_case("f");

    if is_fp {
        if reg >= FP_REG_CNT {
            return None;
        }
        Some(FP_REG_BASE + reg)
    } else {
        if reg >= INT_REG_CNT {
            return None;
        }
        Some(reg)
    }
}

pub(crate) fn load_from_string(src: String) -> Result<InstrTrace, LoadError> {
    let mut loader = Loader::new(src);
    loader.load()
}

pub(crate) fn load(path: &str) -> Result<InstrTrace, LoadError> {
    let src = match fs::read_to_string(path) {
        Ok(src) => src,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(LoadError::NotFoundError(format!("File '{}' does not exist.", path)));
        }
        Err(err) => {
            return Err(LoadError::IOError(format!("Failed to read '{}': {}", path, err)));
        }
    };

    load_from_string(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_ok(src: &str) -> Vec<Instr> {
        let mut trace = match load_from_string(src.to_string()) {
            Ok(trace) => trace,
            Err(err) => panic!("{}", err),
        };
        let mut code = Vec::new();
        while let Some(instr) = trace.next() {
            code.push((*instr).clone());
        }
        code
    }

    fn analysis_errors(src: &str) -> Vec<String> {
        match load_from_string(src.to_string()) {
            Err(LoadError::AnalysisError(errors)) => errors,
            Err(err) => panic!("unexpected error {}", err),
            Ok(_) => panic!("expected an analysis error"),
        }
    }

    #[test]
    fn test_all_classes() {
        let code = load_ok(r#"
# every class once
icomp r3 <- r1, r2;
FCOMP f2 <- f0, f4;
load r4 <- r3;
store <- r4, r5;
branch <- r1;
jump;
call r31;
trap;
"#);
        let classes: Vec<InstrClass> = code.iter().map(|i| i.class).collect();
        assert_eq!(classes, vec![
            InstrClass::IntComp,
            InstrClass::FpComp,
            InstrClass::Load,
            InstrClass::Store,
            InstrClass::CondCtrl,
            InstrClass::UncondCtrl,
            InstrClass::UncondCtrl,
            InstrClass::Trap,
        ]);
        assert_eq!(code[7].index, 7);
    }

    #[test]
    fn test_operands() {
        let code = load_ok("fcomp f10, fcc <- f8, f6, hi;\nload r4 <- r3;");
        assert_eq!(code[0].sink, [Some(FP_REG_BASE + 10), Some(FCC)]);
        assert_eq!(code[0].source, [Some(FP_REG_BASE + 8), Some(FP_REG_BASE + 6), Some(HI)]);
        assert_eq!(code[1].sink, [Some(4), None]);
        assert_eq!(code[1].source, [Some(3), None, None]);
        assert_eq!(code[1].loc, Some(SourceLocation { line: 2, column: 1 }));
    }

    #[test]
    fn test_whitespace_and_comments() {
        let code = load_ok("  icomp r1 <- r2 ;\n# c\n\ticomp r3 <- r1;\r\n\n   jump ; # trailing\n");
        assert_eq!(code.len(), 3);
        assert_eq!(code[0].loc, Some(SourceLocation { line: 1, column: 3 }));
        assert_eq!(code[1].source, [Some(1), None, None]);
        assert_eq!(code[1].loc, Some(SourceLocation { line: 3, column: 2 }));
        assert_eq!(code[2].class, InstrClass::UncondCtrl);
    }

    #[test]
    fn test_empty_trace() {
        let code = load_ok("# nothing here\n");
        assert!(code.is_empty());
    }

    #[test]
    fn test_unknown_class_and_register() {
        let errors = analysis_errors("mul r1 <- r2;\nicomp r40 <- x1;");
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Unknown instruction class 'mul' at 1:1"), "{}", errors[0]);
        assert!(errors[1].contains("'r40'"), "{}", errors[1]);
        assert!(errors[2].contains("'x1' at 2:14"), "{}", errors[2]);
    }

    #[test]
    fn test_operand_counts() {
        let errors = analysis_errors("icomp r1, r2, r3 <- r4;\nicomp r1 <- r1, r2, r3, r4;\nstore r1 <- r2;");
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("sinks"));
        assert!(errors[1].contains("sources"));
        assert!(errors[2].contains("can't have a sink"));
    }

    #[test]
    fn test_parse_error() {
        match load_from_string(String::from("icomp r1 <- r2")) {
            Err(LoadError::ParseError(msg)) => assert!(msg.starts_with("Parse error at 1:"), "{}", msg),
            Err(err) => panic!("unexpected error {}", err),
            Ok(_) => panic!("expected a parse error"),
        }
    }

    #[test]
    fn test_file_not_found() {
        assert!(matches!(load("no/such/file.trace"), Err(LoadError::NotFoundError(_))));
    }
}
