use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::tuple::Tuple;
use crate::file::DEFAULT_PAGE_SIZE;

/// Unordered slotted page, viewed in place over a buffer-pool frame.
///
/// Layout: a bitmap header of one bit per slot (MSB-first within each byte,
/// packed to whole bytes), followed by `capacity` fixed-width record slots.
/// Bit `i` set means slot `i` holds a record; deleted slots are zeroed.
pub struct HeapPage<'a> {
    bytes: &'a mut [u8],
    td: &'a TupleDesc,
    capacity: usize,
    header_len: usize,
}

impl<'a> HeapPage<'a> {
    /// Slots per page for records of this schema: each record costs its
    /// byte length plus one header bit
    pub fn capacity_for(td: &TupleDesc) -> usize {
        (8 * DEFAULT_PAGE_SIZE) / (8 * td.length() + 1)
    }

    pub fn new(bytes: &'a mut [u8], td: &'a TupleDesc) -> Self {
        debug_assert_eq!(bytes.len(), DEFAULT_PAGE_SIZE);
        let capacity = Self::capacity_for(td);
        let header_len = capacity.div_ceil(8);
        Self {
            bytes,
            td,
            capacity,
            header_len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn occupied(&self, slot: usize) -> bool {
        let mask = 0x80u8 >> (slot % 8);
        self.bytes[slot / 8] & mask != 0
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.header_len + slot * self.td.length();
        start..start + self.td.length()
    }

    /// Store `tuple` in the first free slot. `Ok(false)` means the page is
    /// full and nothing was written.
    pub fn insert(&mut self, tuple: &Tuple) -> RecordResult<bool> {
        for slot in 0..self.capacity {
            if !self.occupied(slot) {
                let range = self.slot_range(slot);
                self.td.serialize(&mut self.bytes[range], tuple)?;
                self.bytes[slot / 8] |= 0x80u8 >> (slot % 8);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Zero an occupied slot and clear its header bit
    pub fn delete(&mut self, slot: usize) -> RecordResult<()> {
        if slot >= self.capacity {
            return Err(RecordError::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            });
        }
        if !self.occupied(slot) {
            return Err(RecordError::SlotEmpty(slot));
        }

        let range = self.slot_range(slot);
        self.bytes[range].fill(0);
        self.bytes[slot / 8] &= !(0x80u8 >> (slot % 8));
        Ok(())
    }

    /// Deserialize the record in an occupied slot
    pub fn get(&self, slot: usize) -> RecordResult<Tuple> {
        if slot >= self.capacity {
            return Err(RecordError::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            });
        }
        if !self.occupied(slot) {
            return Err(RecordError::SlotEmpty(slot));
        }

        Ok(self.td.deserialize(&self.bytes[self.slot_range(slot)]))
    }

    /// First occupied slot, or `end()` when the page is empty
    pub fn begin(&self) -> usize {
        (0..self.capacity)
            .find(|&slot| self.occupied(slot))
            .unwrap_or(self.capacity)
    }

    /// One past the last slot
    pub fn end(&self) -> usize {
        self.capacity
    }

    /// Advance `slot` to the next occupied slot, or to `end()`
    pub fn next(&self, slot: &mut usize) {
        if *slot >= self.capacity {
            *slot = self.capacity;
            return;
        }
        *slot = (*slot + 1..self.capacity)
            .find(|&s| self.occupied(s))
            .unwrap_or(self.capacity);
    }
}
