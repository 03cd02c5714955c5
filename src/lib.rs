//! Cycle-level Tomasulo engine with a reorder buffer.
//!
//! Instructions issue in order into reservation stations and load/store
//! buffers, execute when their operands arrive over the common data bus and
//! commit in program order from the reorder buffer. [`cpu::Cpu`] drives the
//! four stages; [`assembler`] turns text programs into loader records.

extern crate num;
#[macro_use]
extern crate num_derive;

pub mod assembler;
pub mod commiter;
pub mod common_data_bus;
pub mod cpu;
pub mod dispatcher;
pub mod error;
pub mod execution_units;
pub mod instructions;
pub mod load_store_buffer;
pub mod memory;
pub mod register_status;
pub mod registers;
pub mod reorder_buffer;
pub mod reservation_station;
pub mod snapshot;
pub mod stats;

pub use cpu::{Cpu, CpuConfig, RunOutcome, Termination};
pub use error::{EngineError, InternalFault};
pub use instructions::{Instruction, InstructionRecord, Opcode, Value};
