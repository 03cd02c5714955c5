use serde::Serialize;
use tracing::trace;

use crate::{
    error::{InternalFault, Result},
    instructions::{Instruction, InstructionStatus, Value},
    memory::Memory,
    registers::RegisterFile,
    reorder_buffer::{Destination, ReorderBuffer},
};

/// One line of the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub instruction: Instruction,
    pub value: Value,
    pub issue_cycle: u64,
    pub execute_start_cycle: u64,
    pub execute_complete_cycle: u64,
    pub write_result_cycle: u64,
    pub commit_cycle: u64,
}
impl CommitRecord {
    fn new(instruction: &Instruction, value: Value) -> Result<Self> {
        let t = instruction.timing;
        let stamp = |cycle: Option<u64>, stage: &'static str| {
            cycle.ok_or(InternalFault::MissingTimestamp {
                instruction: instruction.id,
                stage,
            })
        };

        Ok(Self {
            instruction: instruction.clone(),
            value,
            issue_cycle: stamp(t.issue, "issue")?,
            execute_start_cycle: stamp(t.execute_start, "execute start")?,
            execute_complete_cycle: stamp(t.execute_complete, "execute complete")?,
            write_result_cycle: stamp(t.write_result, "write result")?,
            commit_cycle: stamp(t.commit, "commit")?,
        })
    }
}

/// The commit stage: applies completed ROB entries to architectural state in
/// program order.
#[derive(Debug)]
pub struct Commiter;
impl Commiter {
    pub fn new() -> Self {
        Self
    }

    pub fn commit_finished(
        &self,
        cycle: u64,
        program: &mut [Instruction],
        registers: &mut RegisterFile,
        rob: &mut ReorderBuffer,
        memory: &mut Memory,
    ) -> Result<Vec<CommitRecord>> {
        let mut committed = Vec::new();

        for (slot, entry) in rob.retire()? {
            let value = entry
                .value
                .ok_or(InternalFault::CommitNotCompleted { slot })?;

            match entry.destination {
                Destination::Reg(reg) => registers.set(reg, value),
                Destination::Memory(addr) => memory.write(addr, value)?,
                Destination::None => (),
            }

            let inst = &mut program[entry.instruction];
            inst.timing.commit = Some(cycle);
            inst.advance(InstructionStatus::Committed)?;
            trace!(cycle, rob_slot = slot, value, "committed {}", inst);

            committed.push(CommitRecord::new(inst, value)?);
        }

        Ok(committed)
    }
}

impl Default for Commiter {
    fn default() -> Self {
        Self::new()
    }
}
