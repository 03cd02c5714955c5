use crate::instructions::NUM_REGISTERS;
use crate::reservation_station::Tag;

/// Maps each architectural register to the station that will produce its
/// next value, or `None` when the register file is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterStatusTable {
    table: [Option<Tag>; NUM_REGISTERS],
}
impl RegisterStatusTable {
    pub fn new() -> Self {
        Self {
            table: [None; NUM_REGISTERS],
        }
    }

    /// Renames `reg` to `tag`, superseding any older producer.
    pub fn set(&mut self, reg: usize, tag: Tag) {
        self.table[reg] = Some(tag);
    }

    pub fn get(&self, reg: usize) -> Option<Tag> {
        self.table[reg]
    }

    /// Clears `reg` only if `tag` is still its producer. Returns whether it did.
    pub fn clear_if(&mut self, reg: usize, tag: Tag) -> bool {
        if self.table[reg] == Some(tag) {
            self.table[reg] = None;
            true
        } else {
            false
        }
    }

    pub fn entries(&self) -> &[Option<Tag>] {
        &self.table
    }
}

impl Default for RegisterStatusTable {
    fn default() -> Self {
        Self::new()
    }
}
