use super::error::{IndexError, IndexResult};
use crate::file::DEFAULT_PAGE_SIZE;
use crate::record::{Field, RecordError, Tuple, TupleDesc};

/// `next_leaf` value marking the end of the sibling chain
pub const NO_NEXT_LEAF: usize = usize::MAX;

/// Header: next_leaf (u64 LE) at offset 0, size (u16 LE) at offset 8
const HEADER_LEN: usize = 10;
const SIZE_OFFSET: usize = 8;

/// Outcome of a leaf insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafInsert {
    /// New tuple stored; `at_capacity` reports whether the page is now full
    Stored { at_capacity: bool },
    /// An equal key was overwritten in place. `at_capacity` is advisory
    /// only; an overwrite never requires a split.
    Replaced { at_capacity: bool },
    /// No room for a new key; the page is unmodified and the caller must
    /// split before retrying
    Full,
}

/// Right half of a split leaf, to be adopted onto a fresh page
pub struct LeafSplit {
    /// First key of the right half; goes up to the parent and stays in
    /// the right leaf
    pub separator: i32,
    count: u16,
    next_leaf: usize,
    tuples: Vec<u8>,
}

/// Sorted fixed-width tuple page, viewed in place over a buffer-pool frame.
///
/// Tuples are packed contiguously in strictly ascending order of the INT
/// key column `key_index`. Leaves of one tree form a forward chain through
/// `next_leaf`.
pub struct LeafPage<'a> {
    bytes: &'a mut [u8],
    td: &'a TupleDesc,
    key_index: usize,
    capacity: usize,
}

impl<'a> LeafPage<'a> {
    /// Tuples per page for records of this schema
    pub fn capacity_for(td: &TupleDesc) -> usize {
        (DEFAULT_PAGE_SIZE - HEADER_LEN) / td.length()
    }

    pub fn new(bytes: &'a mut [u8], td: &'a TupleDesc, key_index: usize) -> Self {
        debug_assert_eq!(bytes.len(), DEFAULT_PAGE_SIZE);
        let capacity = Self::capacity_for(td);
        Self {
            bytes,
            td,
            key_index,
            capacity,
        }
    }

    /// Format a fresh page: no tuples, no next leaf
    pub fn init(&mut self) {
        self.set_size(0);
        self.set_next_leaf(NO_NEXT_LEAF);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&self.bytes[SIZE_OFFSET..SIZE_OFFSET + 2]);
        u16::from_le_bytes(buf) as usize
    }

    fn set_size(&mut self, size: u16) {
        self.bytes[SIZE_OFFSET..SIZE_OFFSET + 2].copy_from_slice(&size.to_le_bytes());
    }

    /// Page index of the next leaf in key order, or [`NO_NEXT_LEAF`]
    pub fn next_leaf(&self) -> usize {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(buf) as usize
    }

    pub fn set_next_leaf(&mut self, page: usize) {
        self.bytes[..8].copy_from_slice(&(page as u64).to_le_bytes());
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = HEADER_LEN + slot * self.td.length();
        start..start + self.td.length()
    }

    /// Key of the tuple in `slot`
    pub fn key_at(&self, slot: usize) -> i32 {
        let offset = HEADER_LEN + slot * self.td.length() + self.td.offset_of(self.key_index);
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[offset..offset + 4]);
        i32::from_le_bytes(buf)
    }

    /// First slot whose key is >= `key`, or `size()` when none is
    fn lower_bound(&self, key: i32) -> usize {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Insert `tuple` keeping keys strictly ascending. An equal key is
    /// overwritten in place.
    pub fn insert(&mut self, tuple: &Tuple) -> IndexResult<LeafInsert> {
        let key = match tuple.field(self.key_index) {
            Field::Int(k) => *k,
            _ => {
                return Err(IndexError::KeyNotInt(
                    self.td.field_name(self.key_index).to_string(),
                ));
            }
        };

        let size = self.size();
        let pos = self.lower_bound(key);

        if pos < size && self.key_at(pos) == key {
            let range = self.slot_range(pos);
            self.td.serialize(&mut self.bytes[range], tuple)?;
            return Ok(LeafInsert::Replaced {
                at_capacity: size == self.capacity,
            });
        }

        if size >= self.capacity {
            return Ok(LeafInsert::Full);
        }

        // Shift the suffix one slot right to open a gap at pos
        let record_len = self.td.length();
        let start = HEADER_LEN + pos * record_len;
        let end = HEADER_LEN + size * record_len;
        self.bytes.copy_within(start..end, start + record_len);

        let range = self.slot_range(pos);
        self.td.serialize(&mut self.bytes[range], tuple)?;
        self.set_size((size + 1) as u16);

        Ok(LeafInsert::Stored {
            at_capacity: size + 1 == self.capacity,
        })
    }

    /// Move the upper half of the tuples out, truncating this page to the
    /// lower half. The returned half carries this page's `next_leaf`; the
    /// caller rewires this page's `next_leaf` to the new sibling.
    pub fn split(&mut self) -> LeafSplit {
        let size = self.size();
        debug_assert!(size > 0, "split of an empty leaf");

        let mid = size / 2;
        let count = size - mid;
        let separator = self.key_at(mid);

        let record_len = self.td.length();
        let start = HEADER_LEN + mid * record_len;
        let end = HEADER_LEN + size * record_len;
        let tuples = self.bytes[start..end].to_vec();
        let next_leaf = self.next_leaf();

        self.set_size(mid as u16);

        LeafSplit {
            separator,
            count: count as u16,
            next_leaf,
            tuples,
        }
    }

    /// Install a split half on this (fresh) page
    pub fn adopt_split(&mut self, split: &LeafSplit) {
        self.set_size(split.count);
        self.set_next_leaf(split.next_leaf);
        self.bytes[HEADER_LEN..HEADER_LEN + split.tuples.len()].copy_from_slice(&split.tuples);
    }

    /// Deserialize the tuple in `slot`
    pub fn get(&self, slot: usize) -> IndexResult<Tuple> {
        let size = self.size();
        if slot >= size {
            return Err(RecordError::SlotOutOfRange {
                slot,
                capacity: size,
            }
            .into());
        }
        Ok(self.td.deserialize(&self.bytes[self.slot_range(slot)]))
    }
}
