//! Write-result stage.
//!
//! Completed computations wait here until they are broadcast: the value goes
//! to the owning ROB slot and to every station or buffer waiting on the
//! producer's tag, the register status entry is released if nobody renamed
//! the register since, and the producing station is freed.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    error::{InternalFault, Result},
    instructions::{Instruction, InstructionStatus, UnitClass, Value},
    load_store_buffer::LoadStoreBufferPool,
    register_status::RegisterStatusTable,
    reorder_buffer::ReorderBuffer,
    reservation_station::{FunctionalSlot, ReservationStationPool, Tag},
};

/// How many completions may be broadcast per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    /// Every completion is broadcast in the cycle it finished.
    #[default]
    Unlimited,
    /// One broadcast per cycle, oldest completion first, as a single common
    /// data bus would allow.
    SingleBus,
}

/// A finished computation awaiting broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub tag: Tag,
    pub instruction: usize,
    pub rob_slot: usize,
    pub dest: Option<usize>,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct CommonDataBus {
    policy: BroadcastPolicy,
    queue: VecDeque<Completion>,
}
impl CommonDataBus {
    pub fn new(policy: BroadcastPolicy) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, completion: Completion) {
        self.queue.push_back(completion);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Completion> {
        self.queue.iter()
    }

    /// Broadcasts as many queued completions as the policy allows. Returns
    /// how many were written.
    pub fn write_results(
        &mut self,
        cycle: u64,
        program: &mut [Instruction],
        rob: &mut ReorderBuffer,
        rst: &mut RegisterStatusTable,
        reservation_stations: &mut ReservationStationPool,
        buffers: &mut LoadStoreBufferPool,
    ) -> Result<usize> {
        let budget = match self.policy {
            BroadcastPolicy::Unlimited => self.queue.len(),
            BroadcastPolicy::SingleBus => self.queue.len().min(1),
        };

        for _ in 0..budget {
            let Some(done) = self.queue.pop_front() else {
                break;
            };

            rob.complete(done.rob_slot, done.value)?;

            reservation_stations
                .iter_mut()
                .filter(|rs| rs.is_busy())
                .for_each(|rs| rs.capture(done.tag, done.value));
            buffers
                .iter_mut()
                .filter(|buf| buf.is_busy())
                .for_each(|buf| buf.capture(done.tag, done.value));

            if let Some(dest) = done.dest {
                rst.clear_if(dest, done.tag);
            }

            release(done.tag, reservation_stations, buffers)?;

            let inst = &mut program[done.instruction];
            inst.timing.write_result = Some(cycle);
            inst.advance(InstructionStatus::WrittenResult)?;
            trace!(cycle, tag = %done.tag, value = done.value, "broadcast {}", inst);
        }

        Ok(budget)
    }
}

fn release(
    tag: Tag,
    reservation_stations: &mut ReservationStationPool,
    buffers: &mut LoadStoreBufferPool,
) -> Result<()> {
    let slot: Option<&mut dyn FunctionalSlot> = match tag.class {
        UnitClass::Load | UnitClass::Store => buffers
            .get_mut(tag)
            .map(|buf| buf as &mut dyn FunctionalSlot),
        _ => reservation_stations
            .get_mut(tag)
            .map(|rs| rs as &mut dyn FunctionalSlot),
    };

    match slot {
        Some(slot) if slot.is_busy() => {
            slot.release();
            Ok(())
        }
        _ => Err(InternalFault::StationAlreadyFree { tag }.into()),
    }
}
