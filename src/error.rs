//! Error types for program loading and simulation.
//!
//! Structural stalls and the max-cycle watchdog are not errors: the first is
//! retried by the issue stage, the second ends a run with a partial commit log
//! (see [`crate::cpu::Termination`]).

use crate::instructions::{InstructionStatus, Opcode};
use crate::reservation_station::Tag;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// An instruction record carries an opcode outside the enumerated set.
    #[error("unknown opcode {code:#04x} at program position {position}")]
    UnknownOpcode {
        /// Program position of the offending record.
        position: usize,
        /// The raw opcode code.
        code: u8,
    },

    /// A register index outside the architectural register file.
    #[error("register R{register} out of range at program position {position}")]
    InvalidRegister {
        /// Program position of the offending record.
        position: usize,
        /// The register index as supplied.
        register: usize,
    },

    /// A memory address outside the configured memory.
    #[error("address {address} out of range (memory size {size}) at program position {position}")]
    AddressOutOfRange {
        /// Program position of the offending record.
        position: usize,
        /// The address as supplied.
        address: usize,
        /// Configured memory size in words.
        size: usize,
    },

    /// An operand the opcode needs is absent from the record.
    #[error("{opcode} at program position {position} is missing its {operand}")]
    MissingOperand {
        /// Program position of the offending record.
        position: usize,
        /// Decoded opcode.
        opcode: Opcode,
        /// Name of the missing field.
        operand: &'static str,
    },

    /// The engine configuration cannot describe a working pipeline.
    #[error("invalid configuration: {detail}")]
    InvalidConfig {
        /// Description of the problem.
        detail: String,
    },

    /// The engine broke one of its own contracts.
    #[error("internal consistency fault: {0}")]
    Internal(#[from] InternalFault),
}

/// Contract violations inside the engine. These indicate a bug in the
/// pipeline, never a bad program.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InternalFault {
    #[error("commit attempted on an empty reorder buffer")]
    CommitOnEmptyRob,

    #[error("commit attempted on ROB slot {slot} which has not completed")]
    CommitNotCompleted { slot: usize },

    #[error("ROB slot {slot} is not valid")]
    RobSlotInvalid { slot: usize },

    #[error("write-result targets {tag} which is already free")]
    StationAlreadyFree { tag: Tag },

    #[error("instruction {instruction} cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        instruction: usize,
        from: InstructionStatus,
        to: InstructionStatus,
    },

    #[error("memory access at {address} outside {size} words")]
    MemoryOutOfBounds { address: usize, size: usize },

    #[error("{tag} started executing with an unresolved operand")]
    OperandUnresolved { tag: Tag },

    #[error("instruction {instruction} reached issue without its {operand}")]
    OperandMissing {
        instruction: usize,
        operand: &'static str,
    },

    #[error("no station or buffer named {tag}")]
    SlotMissing { tag: Tag },

    #[error("instruction {instruction} committed without a {stage} timestamp")]
    MissingTimestamp {
        instruction: usize,
        stage: &'static str,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
