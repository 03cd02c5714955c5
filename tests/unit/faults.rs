//! Contract violations surface as internal faults, not panics.

use pretty_assertions::assert_eq;

use aca_tomasulo::error::{EngineError, InternalFault};
use aca_tomasulo::instructions::{Instruction, InstructionStatus, Opcode};
use aca_tomasulo::memory::Memory;
use aca_tomasulo::reorder_buffer::{Destination, ReorderBuffer};

#[test]
fn commit_on_empty_rob() {
    let mut rob = ReorderBuffer::new(2, 2);
    assert_eq!(rob.retire_head(), Err(InternalFault::CommitOnEmptyRob));
    // the stage-level retire simply finds nothing to do
    assert_eq!(rob.retire(), Ok(Vec::new()));
}

#[test]
fn commit_before_completion() {
    let mut rob = ReorderBuffer::new(2, 2);
    let slot = rob
        .add_instruction(0, Opcode::Iadd, Destination::Reg(1))
        .unwrap();
    assert_eq!(
        rob.retire_head(),
        Err(InternalFault::CommitNotCompleted { slot })
    );
    assert_eq!(rob.len(), 1);
}

#[test]
fn completing_a_free_slot() {
    let mut rob = ReorderBuffer::new(2, 2);
    assert_eq!(
        rob.complete(1, 5),
        Err(InternalFault::RobSlotInvalid { slot: 1 })
    );
}

#[test]
fn memory_bounds() {
    let mut memory = Memory::new(4);
    assert_eq!(
        memory.read(4),
        Err(InternalFault::MemoryOutOfBounds {
            address: 4,
            size: 4
        })
    );
    assert!(memory.write(3, -7).is_ok());
    assert_eq!(memory.read(3), Ok(-7));
}

#[test]
fn skipped_stage_is_rejected() {
    let mut inst = Instruction::load(0, 1);
    inst.advance(InstructionStatus::Issued).unwrap();
    let err = inst.advance(InstructionStatus::WrittenResult).unwrap_err();
    assert_eq!(
        err,
        InternalFault::IllegalTransition {
            instruction: 0,
            from: InstructionStatus::Issued,
            to: InstructionStatus::WrittenResult
        }
    );
    assert_eq!(inst.status(), InstructionStatus::Issued);
}

#[test]
fn faults_are_distinct_from_user_errors() {
    let err: EngineError = InternalFault::CommitOnEmptyRob.into();
    assert!(matches!(err, EngineError::Internal(_)));
    assert_eq!(
        err.to_string(),
        "internal consistency fault: commit attempted on an empty reorder buffer"
    );
}
