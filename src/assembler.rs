//! Text front end for programs.
//!
//! ```text
//! .registers
//! 0: 5
//! .memory
//! 40: 7
//! .instructions
//! LD R0, 40
//! IADD R1, R0, R0   // double it
//! ST 41, R1
//! NOP
//! ```
//!
//! The `.registers` and `.memory` sections are optional and hold
//! `index: value` lines. Without any section header the whole file is read as
//! instructions. `//` and `#` start comments.

use std::{fs, path::Path, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::instructions::{Instruction, InstructionRecord, Opcode, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("could not read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// An assembled program: initial state plus loader records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub registers: Vec<(usize, Value)>,
    pub memory: Vec<(usize, Value)>,
    pub instructions: Vec<InstructionRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Registers,
    Memory,
    Instructions,
}

pub fn assemble_file(path: impl AsRef<Path>) -> Result<Program, AssembleError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| AssembleError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    assemble(&source)
}

pub fn assemble(source: &str) -> Result<Program, AssembleError> {
    let mut program = Program::default();
    let mut section = Section::Instructions;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix('.') {
            section = match name.trim().to_ascii_lowercase().as_str() {
                "registers" => Section::Registers,
                "memory" => Section::Memory,
                "instructions" => Section::Instructions,
                other => return Err(syntax(line_no, format!("unknown section `.{}`", other))),
            };
            continue;
        }

        match section {
            Section::Registers => {
                let (reg, value) = assignment(line_no, line)?;
                program.registers.push((reg, value));
            }
            Section::Memory => {
                let (addr, value) = assignment(line_no, line)?;
                program.memory.push((addr, value));
            }
            Section::Instructions => {
                let inst = instruction(line_no, line)?;
                program.instructions.push(InstructionRecord::from(&inst));
            }
        }
    }

    Ok(program)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find("//"), line.find('#')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn syntax(line: usize, reason: impl Into<String>) -> AssembleError {
    AssembleError::Syntax {
        line,
        reason: reason.into(),
    }
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[Rr]?(\d+)\s*:\s*(-?\d+)$").expect("assignment pattern is valid")
    })
}

fn instruction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)(?:\s+(.*))?$").expect("instruction pattern is valid")
    })
}

fn assignment(line: usize, text: &str) -> Result<(usize, Value), AssembleError> {
    let caps = assignment_re()
        .captures(text)
        .ok_or_else(|| syntax(line, format!("expected `index: value`, found `{}`", text)))?;
    let index = caps[1]
        .parse()
        .map_err(|_| syntax(line, format!("index `{}` is too large", &caps[1])))?;
    let value = caps[2]
        .parse()
        .map_err(|_| syntax(line, format!("value `{}` does not fit in 64 bits", &caps[2])))?;
    Ok((index, value))
}

fn instruction(line: usize, text: &str) -> Result<Instruction, AssembleError> {
    let caps = instruction_re()
        .captures(text)
        .ok_or_else(|| syntax(line, format!("cannot parse `{}`", text)))?;
    let opcode: Opcode = caps[1].parse().map_err(|e| syntax(line, format!("{}", e)))?;
    let args: Vec<&str> = caps
        .get(2)
        .map(|m| m.as_str().split(',').map(str::trim).collect())
        .unwrap_or_default();

    let expect = |count: usize| {
        if args.len() == count {
            Ok(())
        } else {
            Err(syntax(
                line,
                format!("{} takes {} operands, found {}", opcode, count, args.len()),
            ))
        }
    };

    let inst = match opcode {
        Opcode::Nop => {
            expect(0)?;
            Instruction::nop()
        }
        Opcode::Ld => {
            expect(2)?;
            Instruction::load(register(line, args[0])?, address(line, args[1])?)
        }
        Opcode::St => {
            expect(2)?;
            Instruction::store(register(line, args[1])?, address(line, args[0])?)
        }
        op => {
            expect(3)?;
            Instruction::compute(
                op,
                register(line, args[0])?,
                register(line, args[1])?,
                register(line, args[2])?,
            )
        }
    };
    Ok(inst)
}

// Ranges are checked when the program is loaded into the engine.
fn register(line: usize, arg: &str) -> Result<usize, AssembleError> {
    arg.strip_prefix(['R', 'r'])
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| syntax(line, format!("expected a register like `R3`, found `{}`", arg)))
}

fn address(line: usize, arg: &str) -> Result<usize, AssembleError> {
    arg.parse()
        .map_err(|_| syntax(line, format!("expected a memory address, found `{}`", arg)))
}
