use crate::instructions::{Value, NUM_REGISTERS};

/// Committed architectural registers. Written only by the commit stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    values: [Value; NUM_REGISTERS],
}
impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            values: [0; NUM_REGISTERS],
        }
    }

    pub fn get(&self, reg: usize) -> Value {
        self.values[reg]
    }

    pub fn set(&mut self, reg: usize, val: Value) {
        self.values[reg] = val;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
