use serde::Serialize;
use tracing::trace;

use crate::{
    error::{InternalFault, Result},
    instructions::{Instruction, InstructionStatus, LatencyTable, Opcode, UnitClass},
    load_store_buffer::LoadStoreBufferPool,
    register_status::RegisterStatusTable,
    registers::RegisterFile,
    reorder_buffer::{Destination, ReorderBuffer},
    reservation_station::{Occupant, Operand, ReservationStationPool},
};

/// Why the issue stage stopped before its width was used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StallReason {
    RobFull,
    NoFreeStation(UnitClass),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IssueReport {
    pub issued: usize,
    pub stall: Option<StallReason>,
}

/// Where issued instructions read their register operands from.
pub struct OperandSources<'a> {
    pub registers: &'a RegisterFile,
    /// Completed but uncommitted values, when forwarding is enabled.
    pub forwarding: bool,
}

/// The issue stage: moves instructions in program order into stations and
/// the reorder buffer.
#[derive(Debug)]
pub struct Dispatcher {
    dispatch_amount: usize,
}
impl Dispatcher {
    pub fn new(dispatch_amount: usize) -> Self {
        Self { dispatch_amount }
    }

    /// Issues up to `dispatch_amount` instructions, stopping at the first one
    /// that cannot get a ROB slot or a station this cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        cycle: u64,
        program: &mut [Instruction],
        pc: &mut usize,
        sources: &OperandSources<'_>,
        rst: &mut RegisterStatusTable,
        rob: &mut ReorderBuffer,
        reservation_stations: &mut ReservationStationPool,
        buffers: &mut LoadStoreBufferPool,
        latencies: &LatencyTable,
    ) -> Result<IssueReport> {
        let mut report = IssueReport::default();

        for _ in 0..self.dispatch_amount {
            let Some(inst) = program.get_mut(*pc) else {
                break; // nothing left to issue
            };

            if rob.is_full() {
                report.stall = Some(StallReason::RobFull);
                break;
            }

            let class = inst.opcode.unit_class();
            let tag = match class {
                UnitClass::Passthrough => None,
                UnitClass::Load | UnitClass::Store => buffers.find_free(class),
                _ => reservation_stations.find_free(class),
            };
            if tag.is_none() && class != UnitClass::Passthrough {
                report.stall = Some(StallReason::NoFreeStation(class));
                break;
            }

            let destination = match inst.opcode {
                Opcode::Nop => Destination::None,
                Opcode::St => inst.address.map_or(Destination::None, Destination::Memory),
                _ => inst.dst.map_or(Destination::None, Destination::Reg),
            };

            // operands are read before the destination is renamed
            let [left, right] = inst
                .sources()
                .map(|src| src.map(|reg| read_operand(reg, sources, rst, rob)));

            let Some(rob_slot) = rob.add_instruction(inst.id, inst.opcode, destination) else {
                report.stall = Some(StallReason::RobFull);
                break;
            };

            if let Some(tag) = tag {
                let occupant = Occupant {
                    opcode: inst.opcode,
                    instruction: inst.id,
                    rob_slot,
                    dest: inst.dst.filter(|_| inst.opcode.writes_register()),
                    latency: latencies.get(inst.opcode),
                };

                let id = inst.id;
                let missing = |operand| InternalFault::OperandMissing {
                    instruction: id,
                    operand,
                };
                match inst.opcode {
                    Opcode::Ld => {
                        let address = inst.address.ok_or_else(|| missing("address"))?;
                        buffers
                            .get_mut(tag)
                            .ok_or(InternalFault::SlotMissing { tag })?
                            .allocate_load(occupant, address);
                    }
                    Opcode::St => {
                        let address = inst.address.ok_or_else(|| missing("address"))?;
                        let value = left.ok_or_else(|| missing("source register"))?;
                        buffers
                            .get_mut(tag)
                            .ok_or(InternalFault::SlotMissing { tag })?
                            .allocate_store(occupant, address, value);
                    }
                    _ => {
                        let operands = [
                            left.ok_or_else(|| missing("first source"))?,
                            right.ok_or_else(|| missing("second source"))?,
                        ];
                        reservation_stations
                            .get_mut(tag)
                            .ok_or(InternalFault::SlotMissing { tag })?
                            .allocate(occupant, operands);
                    }
                }

                if let Some(dest) = occupant.dest {
                    rst.set(dest, tag); // later readers of `dest` now wait on this station
                }
            }

            inst.timing.issue = Some(cycle);
            inst.advance(InstructionStatus::Issued)?;
            trace!(cycle, instruction = inst.id, rob_slot, ?tag, "issued {}", inst);

            *pc += 1;
            report.issued += 1;
        }

        Ok(report)
    }
}

fn read_operand(
    reg: usize,
    sources: &OperandSources<'_>,
    rst: &RegisterStatusTable,
    rob: &ReorderBuffer,
) -> Operand {
    match rst.get(reg) {
        Some(tag) => Operand::Pending(tag),
        None => {
            let forwarded = if sources.forwarding {
                rob.forwarded_value(reg)
            } else {
                None
            };
            Operand::Value(forwarded.unwrap_or_else(|| sources.registers.get(reg)))
        }
    }
}
