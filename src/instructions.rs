use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use num::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, InternalFault, Result};

/// Architectural value type held by registers, memory and operand slots.
pub type Value = i64;

/// Number of architectural registers.
pub const NUM_REGISTERS: usize = 32;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Opcode {
    Iadd,
    Isub,
    Imul,
    Fadd,
    Fsub,
    Fmul,
    Ld,
    St,
    And,
    Or,
    Xor,
    Nop,
}

pub const OPCODE_COUNT: usize = 12;

impl Opcode {
    pub const ALL: [Opcode; OPCODE_COUNT] = [
        Opcode::Iadd,
        Opcode::Isub,
        Opcode::Imul,
        Opcode::Fadd,
        Opcode::Fsub,
        Opcode::Fmul,
        Opcode::Ld,
        Opcode::St,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Nop,
    ];

    /// Decodes a raw opcode code as produced by a loader.
    pub fn from_code(code: u8) -> Option<Opcode> {
        Opcode::from_u8(code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Iadd => "IADD",
            Opcode::Isub => "ISUB",
            Opcode::Imul => "IMUL",
            Opcode::Fadd => "FADD",
            Opcode::Fsub => "FSUB",
            Opcode::Fmul => "FMUL",
            Opcode::Ld => "LD",
            Opcode::St => "ST",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Nop => "NOP",
        }
    }

    /// Which pool services this opcode.
    pub fn unit_class(self) -> UnitClass {
        match self {
            Opcode::Iadd | Opcode::Isub => UnitClass::IntAdd,
            Opcode::Imul => UnitClass::IntMul,
            Opcode::Fadd | Opcode::Fsub => UnitClass::FpAdd,
            Opcode::Fmul => UnitClass::FpMul,
            Opcode::And | Opcode::Or | Opcode::Xor => UnitClass::Logic,
            Opcode::Ld => UnitClass::Load,
            Opcode::St => UnitClass::Store,
            Opcode::Nop => UnitClass::Passthrough,
        }
    }

    pub fn is_memory(self) -> bool {
        matches!(self, Opcode::Ld | Opcode::St)
    }

    /// Whether the instruction renames a destination register.
    pub fn writes_register(self) -> bool {
        !matches!(self, Opcode::St | Opcode::Nop)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mnemonic `{0}`")]
pub struct ParseOpcodeError(pub String);

impl FromStr for Opcode {
    type Err = ParseOpcodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Opcode::ALL
            .into_iter()
            .find(|op| op.mnemonic() == upper)
            .ok_or_else(|| ParseOpcodeError(s.to_string()))
    }
}

/// Functional-unit class an opcode is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitClass {
    IntAdd,
    IntMul,
    FpAdd,
    FpMul,
    Logic,
    Load,
    Store,
    /// NOP: needs a ROB slot only.
    Passthrough,
}

impl UnitClass {
    /// Compute classes in pool order.
    pub const COMPUTE: [UnitClass; 5] = [
        UnitClass::IntAdd,
        UnitClass::IntMul,
        UnitClass::FpAdd,
        UnitClass::FpMul,
        UnitClass::Logic,
    ];

    /// Prefix used for station display names (`IADD1`, `LD2`, ...).
    pub fn label(self) -> &'static str {
        match self {
            UnitClass::IntAdd => "IADD",
            UnitClass::IntMul => "IMUL",
            UnitClass::FpAdd => "FADD",
            UnitClass::FpMul => "FMUL",
            UnitClass::Logic => "LOGIC",
            UnitClass::Load => "LD",
            UnitClass::Store => "ST",
            UnitClass::Passthrough => "NOP",
        }
    }
}

/// Per-opcode execution latency, looked up by enum index.
///
/// Serialises as a map keyed by mnemonic; keys missing on input keep
/// their default latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Opcode, u32>", into = "BTreeMap<Opcode, u32>")]
pub struct LatencyTable([u32; OPCODE_COUNT]);

impl LatencyTable {
    pub fn get(&self, op: Opcode) -> u32 {
        self.0[op.index()]
    }

    pub fn set(&mut self, op: Opcode, cycles: u32) {
        self.0[op.index()] = cycles;
    }

    pub fn with(mut self, op: Opcode, cycles: u32) -> Self {
        self.set(op, cycles);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Opcode, u32)> + '_ {
        Opcode::ALL.into_iter().map(|op| (op, self.get(op)))
    }
}

impl Default for LatencyTable {
    fn default() -> Self {
        let mut table = [1; OPCODE_COUNT];
        table[Opcode::Iadd.index()] = 6;
        table[Opcode::Isub.index()] = 6;
        table[Opcode::Imul.index()] = 12;
        table[Opcode::Fadd.index()] = 18;
        table[Opcode::Fsub.index()] = 18;
        table[Opcode::Fmul.index()] = 30;
        Self(table)
    }
}

impl From<BTreeMap<Opcode, u32>> for LatencyTable {
    fn from(map: BTreeMap<Opcode, u32>) -> Self {
        map.into_iter()
            .fold(Self::default(), |table, (op, cycles)| table.with(op, cycles))
    }
}

impl From<LatencyTable> for BTreeMap<Opcode, u32> {
    fn from(table: LatencyTable) -> Self {
        table.iter().collect()
    }
}

/// Lifecycle of an instruction through the pipeline. Each state may only be
/// left for the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum InstructionStatus {
    NotIssued,
    Issued,
    Executing,
    ExecutionComplete,
    WrittenResult,
    Committed,
}

impl InstructionStatus {
    pub fn next(self) -> Option<InstructionStatus> {
        match self {
            Self::NotIssued => Some(Self::Issued),
            Self::Issued => Some(Self::Executing),
            Self::Executing => Some(Self::ExecutionComplete),
            Self::ExecutionComplete => Some(Self::WrittenResult),
            Self::WrittenResult => Some(Self::Committed),
            Self::Committed => None,
        }
    }
}

/// Cycle stamps recorded as the instruction moves through the stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub issue: Option<u64>,
    pub execute_start: Option<u64>,
    pub execute_complete: Option<u64>,
    pub write_result: Option<u64>,
    pub commit: Option<u64>,
}

impl Timing {
    /// Cycles spent executing, counting both the start and completion cycle.
    pub fn execution_latency(&self) -> Option<u64> {
        match (self.execute_start, self.execute_complete) {
            (Some(start), Some(end)) => Some(end - start + 1),
            _ => None,
        }
    }
}

/// Untyped instruction as handed over by an external loader. Converted to an
/// [`Instruction`] (and validated) when a program is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub opcode: u8,
    pub dst: Option<usize>,
    pub src1: Option<usize>,
    pub src2: Option<usize>,
    pub address: Option<usize>,
}

impl From<&Instruction> for InstructionRecord {
    fn from(inst: &Instruction) -> Self {
        Self {
            opcode: inst.opcode.code(),
            dst: inst.dst,
            src1: inst.src1,
            src2: inst.src2,
            address: inst.address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Position in program order, assigned at load.
    pub id: usize,
    pub opcode: Opcode,
    pub dst: Option<usize>,
    pub src1: Option<usize>,
    pub src2: Option<usize>,
    pub address: Option<usize>,
    pub timing: Timing,
    status: InstructionStatus,
}

impl Instruction {
    fn new(
        opcode: Opcode,
        dst: Option<usize>,
        src1: Option<usize>,
        src2: Option<usize>,
        address: Option<usize>,
    ) -> Self {
        Self {
            id: 0,
            opcode,
            dst,
            src1,
            src2,
            address,
            timing: Timing::default(),
            status: InstructionStatus::NotIssued,
        }
    }

    /// `LD Rdst, address`
    pub fn load(dst: usize, address: usize) -> Self {
        Self::new(Opcode::Ld, Some(dst), None, None, Some(address))
    }

    /// `ST address, Rsrc`
    pub fn store(src: usize, address: usize) -> Self {
        Self::new(Opcode::St, None, Some(src), None, Some(address))
    }

    /// Three-register arithmetic or logic instruction.
    pub fn compute(opcode: Opcode, dst: usize, src1: usize, src2: usize) -> Self {
        Self::new(opcode, Some(dst), Some(src1), Some(src2), None)
    }

    pub fn add(dst: usize, src1: usize, src2: usize) -> Self {
        Self::compute(Opcode::Iadd, dst, src1, src2)
    }

    pub fn multiply(dst: usize, src1: usize, src2: usize) -> Self {
        Self::compute(Opcode::Imul, dst, src1, src2)
    }

    pub fn nop() -> Self {
        Self::new(Opcode::Nop, None, None, None, None)
    }

    /// Decodes and validates a loader record at `position`.
    pub fn decode(position: usize, record: &InstructionRecord, memory_size: usize) -> Result<Self> {
        let opcode = Opcode::from_code(record.opcode).ok_or(EngineError::UnknownOpcode {
            position,
            code: record.opcode,
        })?;

        // keep only the fields the opcode reads
        let mut inst = match opcode {
            Opcode::Nop => Self::nop(),
            Opcode::Ld => Self::new(opcode, record.dst, None, None, record.address),
            Opcode::St => Self::new(opcode, None, record.src1, None, record.address),
            _ => Self::new(opcode, record.dst, record.src1, record.src2, None),
        };
        inst.id = position;
        inst.validate(position, memory_size)?;
        Ok(inst)
    }

    /// Checks that every operand the opcode needs is present and in range.
    pub fn validate(&self, position: usize, memory_size: usize) -> Result<()> {
        for (field, operand) in self.required_operands() {
            if field.is_none() {
                return Err(EngineError::MissingOperand {
                    position,
                    opcode: self.opcode,
                    operand,
                });
            }
        }
        for register in [self.dst, self.src1, self.src2].into_iter().flatten() {
            if register >= NUM_REGISTERS {
                return Err(EngineError::InvalidRegister { position, register });
            }
        }
        if let Some(address) = self.address {
            if address >= memory_size {
                return Err(EngineError::AddressOutOfRange {
                    position,
                    address,
                    size: memory_size,
                });
            }
        }
        Ok(())
    }

    fn required_operands(&self) -> Vec<(Option<usize>, &'static str)> {
        match self.opcode {
            Opcode::Nop => Vec::new(),
            Opcode::Ld => vec![(self.dst, "destination"), (self.address, "address")],
            Opcode::St => vec![(self.src1, "source register"), (self.address, "address")],
            _ => vec![
                (self.dst, "destination"),
                (self.src1, "first source"),
                (self.src2, "second source"),
            ],
        }
    }

    /// Drops any progress from an earlier run: status back to `NotIssued`,
    /// no timestamps.
    pub fn reset(&mut self) {
        self.timing = Timing::default();
        self.status = InstructionStatus::NotIssued;
    }

    /// Source registers read at issue, in operand-slot order.
    pub fn sources(&self) -> [Option<usize>; 2] {
        match self.opcode {
            Opcode::Ld | Opcode::Nop => [None, None],
            Opcode::St => [self.src1, None],
            _ => [self.src1, self.src2],
        }
    }

    pub fn status(&self) -> InstructionStatus {
        self.status
    }

    /// Moves to `to`, which must be the state directly after the current one.
    pub fn advance(&mut self, to: InstructionStatus) -> std::result::Result<(), InternalFault> {
        if self.status.next() != Some(to) {
            return Err(InternalFault::IllegalTransition {
                instruction: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = |r: Option<usize>| r.map_or_else(|| "R?".to_string(), |r| format!("R{}", r));
        let addr = self.address.map_or_else(|| "?".to_string(), |a| a.to_string());
        match self.opcode {
            Opcode::Ld => write!(f, "LD {}, {}", reg(self.dst), addr),
            Opcode::St => write!(f, "ST {}, {}", addr, reg(self.src1)),
            Opcode::Nop => write!(f, "NOP"),
            op => write!(
                f,
                "{} {}, {}, {}",
                op,
                reg(self.dst),
                reg(self.src1),
                reg(self.src2)
            ),
        }
    }
}
