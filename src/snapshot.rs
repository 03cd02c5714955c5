//! Serialisable views of the pipeline, taken at the end of a cycle, for
//! reporters and plotting tools.

use serde::Serialize;

use crate::common_data_bus::Completion;
use crate::instructions::{Opcode, Value};
use crate::load_store_buffer::LoadStoreBuffer;
use crate::reorder_buffer::{Destination, RobState};
use crate::reservation_station::{FunctionalSlot, Phase, ReservationStation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    pub name: String,
    pub busy: bool,
    pub op: Option<Opcode>,
    pub vj: Option<Value>,
    pub vk: Option<Value>,
    pub qj: Option<String>,
    pub qk: Option<String>,
    pub dest: Option<usize>,
    pub address: Option<usize>,
    pub instruction: Option<usize>,
    pub phase: Phase,
    pub cycles_left: u32,
}

impl From<&ReservationStation> for StationSnapshot {
    fn from(rs: &ReservationStation) -> Self {
        let [j, k] = rs.operands();
        Self {
            vj: j.value().filter(|_| rs.is_busy()),
            vk: k.value().filter(|_| rs.is_busy()),
            qj: j.pending().map(|t| t.to_string()),
            qk: k.pending().map(|t| t.to_string()),
            ..base(rs)
        }
    }
}

impl From<&LoadStoreBuffer> for StationSnapshot {
    fn from(buf: &LoadStoreBuffer) -> Self {
        let value = buf.value();
        Self {
            vj: value.value().filter(|_| buf.is_busy() && buf.is_store()),
            qj: value.pending().map(|t| t.to_string()),
            address: buf.address(),
            ..base(buf)
        }
    }
}

fn base<S: FunctionalSlot>(slot: &S) -> StationSnapshot {
    let occ = slot.occupant();
    StationSnapshot {
        name: slot.tag().to_string(),
        busy: slot.is_busy(),
        op: occ.map(|o| o.opcode),
        vj: None,
        vk: None,
        qj: None,
        qk: None,
        dest: occ.and_then(|o| o.dest),
        address: None,
        instruction: occ.map(|o| o.instruction),
        phase: slot.phase(),
        cycles_left: slot.cycles_left(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobSnapshot {
    pub slot: usize,
    pub instruction: usize,
    pub text: String,
    pub state: RobState,
    pub destination: Destination,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSnapshot {
    pub cycle: u64,
    /// Next program position to issue.
    pub pc: usize,
    pub registers: Vec<Value>,
    /// Producer name per register, `None` when the register file is current.
    pub register_status: Vec<Option<String>>,
    pub memory_window: Vec<(usize, Value)>,
    pub stations: Vec<StationSnapshot>,
    pub load_buffers: Vec<StationSnapshot>,
    pub store_buffers: Vec<StationSnapshot>,
    /// Occupied ROB slots in program order.
    pub rob: Vec<RobSnapshot>,
    pub pending_broadcasts: Vec<Completion>,
}
