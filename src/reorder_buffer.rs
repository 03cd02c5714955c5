//! Reorder buffer: a circular FIFO of in-flight instructions that only ever
//! retires from its head, so commit happens in program order.

use serde::Serialize;

use crate::error::InternalFault;
use crate::instructions::{Opcode, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RobState {
    Issued,
    Executing,
    Completed,
}
impl RobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Where a committed value goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Destination {
    Reg(usize),
    Memory(usize),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobEntry {
    pub valid: bool,
    /// Program position of the owning instruction.
    pub instruction: usize,
    pub opcode: Opcode,
    pub state: RobState,
    pub destination: Destination,
    pub value: Option<Value>,
}
impl RobEntry {
    fn empty() -> Self {
        Self {
            valid: false,
            instruction: 0,
            opcode: Opcode::Nop,
            state: RobState::Issued,
            destination: Destination::None,
            value: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    buffer: Vec<RobEntry>,
    max_retire: usize,
    /// Oldest entry.
    head: usize,
    /// Next free slot.
    tail: usize,
    count: usize,
}
impl ReorderBuffer {
    pub fn new(size: usize, max_retire: usize) -> Self {
        Self {
            buffer: vec![RobEntry::empty(); size],
            max_retire,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Claims the tail slot. `None` when full.
    pub fn add_instruction(
        &mut self,
        instruction: usize,
        opcode: Opcode,
        destination: Destination,
    ) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let index = self.tail;
        self.buffer[index] = RobEntry {
            valid: true,
            instruction,
            opcode,
            state: RobState::Issued,
            destination,
            value: None,
        };
        self.tail = (self.tail + 1) % self.buffer.len();
        self.count += 1;
        Some(index)
    }

    pub fn get(&self, slot: usize) -> Option<&RobEntry> {
        self.buffer.get(slot).filter(|entry| entry.valid)
    }

    fn get_mut(&mut self, slot: usize) -> Result<&mut RobEntry, InternalFault> {
        self.buffer
            .get_mut(slot)
            .filter(|entry| entry.valid)
            .ok_or(InternalFault::RobSlotInvalid { slot })
    }

    pub fn mark_executing(&mut self, slot: usize) -> Result<(), InternalFault> {
        self.get_mut(slot)?.state = RobState::Executing;
        Ok(())
    }

    pub fn complete(&mut self, slot: usize, value: Value) -> Result<(), InternalFault> {
        let entry = self.get_mut(slot)?;
        entry.state = RobState::Completed;
        entry.value = Some(value);
        Ok(())
    }

    pub fn head(&self) -> Option<&RobEntry> {
        self.get(self.head)
    }

    /// Frees the head slot, which must hold a completed entry. Returns the
    /// slot index with its final contents.
    pub fn retire_head(&mut self) -> Result<(usize, RobEntry), InternalFault> {
        if self.is_empty() {
            return Err(InternalFault::CommitOnEmptyRob);
        }
        let slot = self.head;
        let entry = self.get_mut(slot)?;
        if !entry.state.is_finished() {
            return Err(InternalFault::CommitNotCompleted { slot });
        }
        entry.valid = false;
        let retired = entry.clone();
        self.head = (self.head + 1) % self.buffer.len();
        self.count -= 1;
        Ok((slot, retired))
    }

    /// Retires up to `max_retire` completed entries from the head, stopping at
    /// the first one that has not completed.
    pub fn retire(&mut self) -> Result<Vec<(usize, RobEntry)>, InternalFault> {
        let mut retired = Vec::new();

        for _ in 0..self.max_retire {
            if !self.head().is_some_and(|entry| entry.state.is_finished()) {
                break;
            }
            retired.push(self.retire_head()?);
        }

        Ok(retired)
    }

    /// Occupied slots from head to tail, i.e. in program order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RobEntry)> {
        let len = self.buffer.len();
        (0..self.count).map(move |i| {
            let slot = (self.head + i) % len;
            (slot, &self.buffer[slot])
        })
    }

    /// Value of the youngest in-flight writer of `reg`, if it has completed.
    pub fn forwarded_value(&self, reg: usize) -> Option<Value> {
        self.iter()
            .filter(|(_, entry)| entry.destination == Destination::Reg(reg))
            .last()
            .and_then(|(_, entry)| entry.value.filter(|_| entry.state.is_finished()))
    }
}
