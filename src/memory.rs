use bytes::{Buf, BufMut, BytesMut};

use crate::error::InternalFault;
use crate::instructions::Value;

const WORD_BYTES: usize = std::mem::size_of::<Value>();

/// Flat word-addressed data memory with unit latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: BytesMut,
    size: usize,
}
impl Memory {
    /// Creates a zeroed memory of `size` words.
    pub fn new(size: usize) -> Self {
        let mut bytes = BytesMut::with_capacity(size * WORD_BYTES);
        bytes.put_bytes(0, size * WORD_BYTES);
        Self { bytes, size }
    }

    /// Size in words.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn read(&self, address: usize) -> Result<Value, InternalFault> {
        let start = self.offset(address)?;
        Ok((&self.bytes[start..start + WORD_BYTES]).get_i64())
    }

    pub fn write(&mut self, address: usize, value: Value) -> Result<(), InternalFault> {
        let start = self.offset(address)?;
        (&mut self.bytes[start..start + WORD_BYTES]).put_i64(value);
        Ok(())
    }

    /// Words in `range`, clipped to the memory size.
    pub fn window(&self, range: std::ops::Range<usize>) -> Vec<(usize, Value)> {
        let end = range.end.min(self.size);
        (range.start.min(end)..end)
            .filter_map(|addr| self.read(addr).ok().map(|v| (addr, v)))
            .collect()
    }

    fn offset(&self, address: usize) -> Result<usize, InternalFault> {
        if address >= self.size {
            return Err(InternalFault::MemoryOutOfBounds {
                address,
                size: self.size,
            });
        }
        Ok(address * WORD_BYTES)
    }
}
