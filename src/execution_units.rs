use tracing::trace;

use crate::{
    common_data_bus::{CommonDataBus, Completion},
    error::{InternalFault, Result},
    instructions::{Instruction, InstructionStatus, Opcode, Value},
    load_store_buffer::LoadStoreBufferPool,
    memory::Memory,
    reorder_buffer::{ReorderBuffer, RobState},
    reservation_station::{FunctionalSlot, Phase, ReservationStationPool},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteReport {
    pub started: usize,
    pub completed: usize,
}

/// The execute stage. Stateless: the countdowns live in the stations.
#[derive(Debug)]
pub struct ExecutionUnits;
impl ExecutionUnits {
    pub fn new() -> Self {
        Self
    }

    /// Starts every station whose operands are resolved, counts down every
    /// executing station and queues finished results on the bus. Issued NOPs
    /// pass straight through to a completed ROB slot.
    #[allow(clippy::too_many_arguments)]
    pub fn cycle(
        &self,
        cycle: u64,
        program: &mut [Instruction],
        reservation_stations: &mut ReservationStationPool,
        buffers: &mut LoadStoreBufferPool,
        rob: &mut ReorderBuffer,
        memory: &Memory,
        cdb: &mut CommonDataBus,
    ) -> Result<ExecuteReport> {
        let mut report = ExecuteReport::default();

        for rs in reservation_stations.iter_mut() {
            step(rs, cycle, program, rob, memory, cdb, &mut report)?;
        }
        for buf in buffers.iter_mut() {
            step(buf, cycle, program, rob, memory, cdb, &mut report)?;
        }

        self.pass_through_nops(cycle, program, rob, &mut report)?;

        Ok(report)
    }

    fn pass_through_nops(
        &self,
        cycle: u64,
        program: &mut [Instruction],
        rob: &mut ReorderBuffer,
        report: &mut ExecuteReport,
    ) -> Result<()> {
        let nops: Vec<(usize, usize)> = rob
            .iter()
            .filter(|(_, e)| e.opcode == Opcode::Nop && e.state == RobState::Issued)
            .map(|(slot, e)| (slot, e.instruction))
            .collect();

        for (slot, id) in nops {
            let inst = &mut program[id];
            inst.timing.execute_start = Some(cycle);
            inst.advance(InstructionStatus::Executing)?;
            inst.timing.execute_complete = Some(cycle);
            inst.advance(InstructionStatus::ExecutionComplete)?;
            inst.timing.write_result = Some(cycle);
            inst.advance(InstructionStatus::WrittenResult)?;
            rob.complete(slot, 0)?;
            report.started += 1;
            report.completed += 1;
        }

        Ok(())
    }
}

impl Default for ExecutionUnits {
    fn default() -> Self {
        Self::new()
    }
}

fn step<S: FunctionalSlot>(
    slot: &mut S,
    cycle: u64,
    program: &mut [Instruction],
    rob: &mut ReorderBuffer,
    memory: &Memory,
    cdb: &mut CommonDataBus,
    report: &mut ExecuteReport,
) -> Result<()> {
    let Some(occ) = slot.occupant().copied() else {
        return Ok(());
    };

    if slot.phase() == Phase::Waiting && slot.operands_ready() {
        *slot.phase_mut() = Phase::Executing {
            remaining: occ.latency,
        };
        let inst = &mut program[occ.instruction];
        inst.timing.execute_start = Some(cycle);
        inst.advance(InstructionStatus::Executing)?;
        rob.mark_executing(occ.rob_slot)?;
        report.started += 1;
    }

    // the start cycle counts as the first cycle of latency
    if slot.phase_mut().tick() {
        let value = evaluate(&*slot, occ.opcode, memory)?;
        *slot.phase_mut() = Phase::Finished;

        let inst = &mut program[occ.instruction];
        inst.timing.execute_complete = Some(cycle);
        inst.advance(InstructionStatus::ExecutionComplete)?;
        trace!(cycle, tag = %slot.tag(), value, "finished {}", inst);

        cdb.push(Completion {
            tag: slot.tag(),
            instruction: occ.instruction,
            rob_slot: occ.rob_slot,
            dest: occ.dest,
            value,
        });
        report.completed += 1;
    }

    Ok(())
}

fn evaluate<S: FunctionalSlot>(slot: &S, opcode: Opcode, memory: &Memory) -> Result<Value> {
    let unresolved = InternalFault::OperandUnresolved { tag: slot.tag() };
    let [left, right] = slot.operand_values();

    let value = match opcode {
        Opcode::Ld => memory.read(slot.address().ok_or(unresolved)?)?,
        Opcode::St => left.ok_or(unresolved)?,
        Opcode::Nop => 0,
        op => match (left, right) {
            (Some(l), Some(r)) => compute(op, l, r),
            _ => return Err(unresolved.into()),
        },
    };

    Ok(value)
}

/// Arithmetic and logic on resolved operands. Wraps on overflow.
pub fn compute(op: Opcode, left: Value, right: Value) -> Value {
    match op {
        Opcode::Iadd | Opcode::Fadd => left.wrapping_add(right),
        Opcode::Isub | Opcode::Fsub => left.wrapping_sub(right),
        Opcode::Imul | Opcode::Fmul => left.wrapping_mul(right),
        Opcode::And => left & right,
        Opcode::Or => left | right,
        Opcode::Xor => left ^ right,
        Opcode::Ld | Opcode::St | Opcode::Nop => 0,
    }
}
