use std::fmt;

use crate::instructions::{UnitClass, Value};
use crate::reservation_station::{show, FunctionalSlot, Occupant, Operand, Phase, Tag};

/// A load or store buffer. Addresses are absolute and assumed not to alias,
/// so buffers never wait on each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStoreBuffer {
    tag: Tag,
    phase: Phase,
    occupant: Option<Occupant>,
    address: usize,
    /// Value to store. Always resolved for loads.
    value: Operand,
}
impl LoadStoreBuffer {
    pub fn new(tag: Tag) -> Self {
        LoadStoreBuffer {
            tag,
            phase: Phase::Idle,
            occupant: None,
            address: 0,
            value: Operand::Value(0),
        }
    }

    pub fn is_store(&self) -> bool {
        self.tag.class == UnitClass::Store
    }

    pub fn allocate_load(&mut self, occupant: Occupant, address: usize) {
        self.allocate(occupant, address, Operand::Value(0));
    }

    pub fn allocate_store(&mut self, occupant: Occupant, address: usize, value: Operand) {
        self.allocate(occupant, address, value);
    }

    fn allocate(&mut self, occupant: Occupant, address: usize, value: Operand) {
        self.occupant = Some(occupant);
        self.address = address;
        self.value = value;
        self.phase = Phase::Waiting;
    }

    pub fn value(&self) -> Operand {
        self.value
    }
}

impl FunctionalSlot for LoadStoreBuffer {
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
        [self.value.value(), None]
    }

    fn operands_ready(&self) -> bool {
        !self.value.is_pending()
    }

    fn capture(&mut self, tag: Tag, value: Value) {
        self.value.capture(tag, value);
    }

    fn address(&self) -> Option<usize> {
        self.occupant.map(|_| self.address)
    }

    fn release(&mut self) -> Option<Occupant> {
        let occupant = self.occupant.take();
        *self = Self::new(self.tag);
        occupant
    }
}

impl fmt::Display for LoadStoreBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(occ) = self.occupant.filter(|_| self.is_busy()) else {
            return write!(f, "{}: idle", self.tag);
        };
        write!(
            f,
            "{}: busy, op={}, addr={}, Vj={}, Qj={}, dest={}, cycles left={}",
            self.tag,
            occ.opcode,
            self.address,
            show(self.value.value().filter(|_| self.is_store())),
            show(self.value.pending()),
            show(occ.dest.map(|r| format!("R{}", r))),
            self.cycles_left()
        )
    }
}

/// The load and store buffer pools.
#[derive(Debug, Clone)]
pub struct LoadStoreBufferPool {
    loads: Vec<LoadStoreBuffer>,
    stores: Vec<LoadStoreBuffer>,
}
impl LoadStoreBufferPool {
    pub fn new(loads: usize, stores: usize) -> Self {
        Self {
            loads: (0..loads)
                .map(|i| LoadStoreBuffer::new(Tag::new(UnitClass::Load, i)))
                .collect(),
            stores: (0..stores)
                .map(|i| LoadStoreBuffer::new(Tag::new(UnitClass::Store, i)))
                .collect(),
        }
    }

    fn pool(&self, class: UnitClass) -> Option<&Vec<LoadStoreBuffer>> {
        match class {
            UnitClass::Load => Some(&self.loads),
            UnitClass::Store => Some(&self.stores),
            _ => None,
        }
    }

    pub fn find_free(&self, class: UnitClass) -> Option<Tag> {
        self.pool(class)?
            .iter()
            .find(|buf| !buf.is_busy())
            .map(|buf| buf.tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&LoadStoreBuffer> {
        self.pool(tag.class)?.get(tag.index)
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut LoadStoreBuffer> {
        match tag.class {
            UnitClass::Load => self.loads.get_mut(tag.index),
            UnitClass::Store => self.stores.get_mut(tag.index),
            _ => None,
        }
    }

    pub fn loads(&self) -> &[LoadStoreBuffer] {
        &self.loads
    }

    pub fn stores(&self) -> &[LoadStoreBuffer] {
        &self.stores
    }

    /// Load buffers then store buffers.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LoadStoreBuffer> {
        self.loads.iter_mut().chain(self.stores.iter_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.loads.iter().chain(self.stores.iter()).all(|b| !b.is_busy())
    }
}
