use std::fmt;

use serde::Serialize;

use crate::instructions::{Opcode, UnitClass, Value};

/// Handle naming the station or buffer that will produce a value.
///
/// `index` counts within the pool of `class`, so `Tag { class: IntAdd, index: 1 }`
/// is displayed as `IADD2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tag {
    pub class: UnitClass,
    pub index: usize,
}
impl Tag {
    pub fn new(class: UnitClass, index: usize) -> Self {
        Self { class, index }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.label(), self.index + 1)
    }
}

/// An operand slot: a resolved value or the tag of its pending producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Value(Value),
    Pending(Tag),
}
impl Operand {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Value(val) => Some(*val),
            Self::Pending(_) => None,
        }
    }

    pub fn pending(&self) -> Option<Tag> {
        match self {
            Self::Pending(tag) => Some(*tag),
            Self::Value(_) => None,
        }
    }

    /// Takes `value` if this slot is waiting on `tag`.
    pub fn capture(&mut self, tag: Tag, value: Value) -> bool {
        if *self == Self::Pending(tag) {
            *self = Self::Value(value);
            true
        } else {
            false
        }
    }
}

/// Where a station is in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    /// Allocated, waiting for operands or for the execute stage to start it.
    Waiting,
    Executing { remaining: u32 },
    /// Result computed and queued for broadcast.
    Finished,
}
impl Phase {
    pub fn is_busy(&self) -> bool {
        !matches!(self, Phase::Idle)
    }

    /// Counts one execution cycle down. True once the last cycle has run.
    pub fn tick(&mut self) -> bool {
        match self {
            Phase::Executing { remaining } => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            _ => false,
        }
    }
}

/// What an allocated station or buffer is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupant {
    pub opcode: Opcode,
    /// Program position of the instruction.
    pub instruction: usize,
    pub rob_slot: usize,
    /// Destination register renamed to this station, if any.
    pub dest: Option<usize>,
    pub latency: u32,
}

/// Behaviour shared by reservation stations and load/store buffers, which is
/// all the execute and write-result stages need.
pub trait FunctionalSlot {
    fn tag(&self) -> Tag;
    fn phase(&self) -> Phase;
    fn phase_mut(&mut self) -> &mut Phase;
    fn occupant(&self) -> Option<&Occupant>;
    /// Values of the operand slots, `None` where absent or still pending.
    fn operand_values(&self) -> [Option<Value>; 2];
    fn operands_ready(&self) -> bool;
    /// Resolves every operand slot waiting on `tag`.
    fn capture(&mut self, tag: Tag, value: Value);
    /// Memory address for loads and stores.
    fn address(&self) -> Option<usize> {
        None
    }
    /// Frees the slot, returning what it held.
    fn release(&mut self) -> Option<Occupant>;

    fn is_busy(&self) -> bool {
        self.phase().is_busy()
    }

    /// Cycles still to run; the full latency while waiting to start.
    fn cycles_left(&self) -> u32 {
        match (self.phase(), self.occupant()) {
            (Phase::Executing { remaining }, _) => remaining,
            (Phase::Waiting, Some(occ)) => occ.latency,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationStation {
    tag: Tag,
    phase: Phase,
    occupant: Option<Occupant>,
    operands: [Operand; 2],
}
impl ReservationStation {
    pub fn new(tag: Tag) -> Self {
        ReservationStation {
            tag,
            phase: Phase::Idle,
            occupant: None,
            operands: [Operand::Value(0); 2],
        }
    }

    pub fn allocate(&mut self, occupant: Occupant, operands: [Operand; 2]) {
        self.occupant = Some(occupant);
        self.operands = operands;
        self.phase = Phase::Waiting;
    }

    pub fn operands(&self) -> &[Operand; 2] {
        &self.operands
    }
}

impl FunctionalSlot for ReservationStation {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn phase_mut(&mut self) -> &mut Phase {
        &mut self.phase
    }

    fn occupant(&self) -> Option<&Occupant> {
        self.occupant.as_ref()
    }

    fn operand_values(&self) -> [Option<Value>; 2] {
        [self.operands[0].value(), self.operands[1].value()]
    }

    fn operands_ready(&self) -> bool {
        !self.operands.iter().any(Operand::is_pending)
    }

    fn capture(&mut self, tag: Tag, value: Value) {
        for operand in self.operands.iter_mut() {
            operand.capture(tag, value);
        }
    }

    fn release(&mut self) -> Option<Occupant> {
        let occupant = self.occupant.take();
        *self = Self::new(self.tag);
        occupant
    }
}

impl fmt::Display for ReservationStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(occ) = self.occupant.filter(|_| self.is_busy()) else {
            return write!(f, "{}: idle", self.tag);
        };
        let [vj, vk] = self.operands.map(|op| show(op.value()));
        let [qj, qk] = self.operands.map(|op| show(op.pending()));
        write!(
            f,
            "{}: busy, op={}, Vj={}, Vk={}, Qj={}, Qk={}, dest={}, cycles left={}",
            self.tag,
            occ.opcode,
            vj,
            vk,
            qj,
            qk,
            show(occ.dest.map(|r| format!("R{}", r))),
            self.cycles_left()
        )
    }
}

pub(crate) fn show<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// Fixed pools of compute stations, one pool per compute class.
#[derive(Debug, Clone)]
pub struct ReservationStationPool {
    pools: Vec<Vec<ReservationStation>>,
}
impl ReservationStationPool {
    /// `sizes` gives the pool size for each class in [`UnitClass::COMPUTE`] order.
    pub fn new(sizes: [usize; 5]) -> Self {
        let pools = UnitClass::COMPUTE
            .iter()
            .zip(sizes)
            .map(|(class, size)| {
                (0..size)
                    .map(|index| ReservationStation::new(Tag::new(*class, index)))
                    .collect()
            })
            .collect();
        Self { pools }
    }

    fn slot(class: UnitClass) -> Option<usize> {
        UnitClass::COMPUTE.iter().position(|c| *c == class)
    }

    /// First idle station able to run `class`.
    pub fn find_free(&self, class: UnitClass) -> Option<Tag> {
        let pool = &self.pools[Self::slot(class)?];
        pool.iter().find(|rs| !rs.is_busy()).map(|rs| rs.tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&ReservationStation> {
        self.pools.get(Self::slot(tag.class)?)?.get(tag.index)
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut ReservationStation> {
        self.pools.get_mut(Self::slot(tag.class)?)?.get_mut(tag.index)
    }

    /// All stations in pool order.
    pub fn iter(&self) -> impl Iterator<Item = &ReservationStation> {
        self.pools.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ReservationStation> {
        self.pools.iter_mut().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|rs| !rs.is_busy())
    }
}
