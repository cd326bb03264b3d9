use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::disk::DiskFile;
use super::error::{FileError, FileResult};
use super::{DEFAULT_NUM_PAGES, DEFAULT_PAGE_SIZE, PageId};

/// Registered files the pool reads from and writes back to, keyed by name
pub type FileTable = HashMap<String, Arc<DiskFile>>;

/// One cached page frame
struct Frame {
    data: Vec<u8>,
    dirty: bool,
}

/// Fixed-capacity page cache with LRU eviction and write-back.
///
/// A single `LruCache` holds both the frames and the recency order; the
/// least recently used frame is the eviction victim, and a dirty victim is
/// written back through its file handle before the slot is reused.
///
/// `get_page` hands out an exclusive borrow of the frame bytes; the borrow
/// ends before the next pool call, which is what keeps references to cached
/// pages valid for exactly as long as the page is guaranteed to be resident.
/// Mutating callers must report their writes with [`BufferPool::mark_dirty`].
pub struct BufferPool {
    frames: LruCache<PageId, Frame>,
    capacity: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NUM_PAGES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            capacity,
        }
    }

    /// Get a page, reading it through its file handle on a miss.
    ///
    /// A cache hit promotes the frame to most recently used. A page beyond
    /// the persisted end of its file comes back zero-filled (short-read
    /// semantics), which is how fresh pages are materialized.
    pub fn get_page(&mut self, files: &FileTable, pid: &PageId) -> FileResult<&mut [u8]> {
        if self.frames.peek(pid).is_none() {
            self.load_page(files, pid)?;
        }

        // Present after load_page; get_mut also updates the LRU order
        Ok(&mut self.frames.get_mut(pid).unwrap().data)
    }

    /// Record that the cached copy of `pid` differs from disk. No-op when
    /// the page is not cached.
    pub fn mark_dirty(&mut self, pid: &PageId) {
        if let Some(frame) = self.frames.peek_mut(pid) {
            frame.dirty = true;
        }
    }

    pub fn is_dirty(&self, pid: &PageId) -> bool {
        self.frames.peek(pid).is_some_and(|frame| frame.dirty)
    }

    pub fn contains(&self, pid: &PageId) -> bool {
        self.frames.contains(pid)
    }

    /// Number of pages currently cached
    pub fn cached_pages(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop a frame without writing it back
    pub fn discard_page(&mut self, pid: &PageId) {
        self.frames.pop(pid);
    }

    /// Drop every cached frame of one file without writing back
    pub fn discard_file(&mut self, name: &str) {
        let pids: Vec<PageId> = self
            .frames
            .iter()
            .filter(|(pid, _)| pid.file == name)
            .map(|(pid, _)| pid.clone())
            .collect();
        for pid in pids {
            self.frames.pop(&pid);
        }
    }

    /// Write a dirty page back and clear its dirty mark. The frame stays
    /// cached and its LRU position is untouched. No-op when the page is not
    /// cached or not dirty.
    pub fn flush_page(&mut self, files: &FileTable, pid: &PageId) -> FileResult<()> {
        if let Some(frame) = self.frames.peek_mut(pid)
            && frame.dirty
        {
            let file = files
                .get(&pid.file)
                .ok_or_else(|| FileError::FileNotRegistered(pid.file.clone()))?;
            file.write_page(&frame.data, pid.page)?;
            frame.dirty = false;
        }

        Ok(())
    }

    /// Flush every dirty frame belonging to `name`
    pub fn flush_file(&mut self, files: &FileTable, name: &str) -> FileResult<()> {
        let pids: Vec<PageId> = self
            .frames
            .iter()
            .filter(|(pid, frame)| frame.dirty && pid.file == name)
            .map(|(pid, _)| pid.clone())
            .collect();

        for pid in pids {
            self.flush_page(files, &pid)?;
        }

        Ok(())
    }

    /// Flush every dirty frame of every registered file
    pub fn flush_all(&mut self, files: &FileTable) -> FileResult<()> {
        let pids: Vec<PageId> = self
            .frames
            .iter()
            .filter(|(pid, frame)| frame.dirty && files.contains_key(&pid.file))
            .map(|(pid, _)| pid.clone())
            .collect();

        for pid in pids {
            self.flush_page(files, &pid)?;
        }

        Ok(())
    }

    /// Read `pid` into a free frame, evicting as needed to make room
    fn load_page(&mut self, files: &FileTable, pid: &PageId) -> FileResult<()> {
        while self.frames.len() >= self.capacity {
            self.evict_lru(files)?;
        }

        let file = files
            .get(&pid.file)
            .ok_or_else(|| FileError::FileNotRegistered(pid.file.clone()))?;

        let mut data = vec![0u8; DEFAULT_PAGE_SIZE];
        file.read_page(&mut data, pid.page)?;

        self.frames.put(pid.clone(), Frame { data, dirty: false });
        Ok(())
    }

    /// Evict the least recently used frame, writing it back first if dirty
    fn evict_lru(&mut self, files: &FileTable) -> FileResult<()> {
        if let Some((pid, frame)) = self.frames.pop_lru() {
            if frame.dirty {
                let file = files
                    .get(&pid.file)
                    .ok_or_else(|| FileError::FileNotRegistered(pid.file.clone()))?;
                file.write_page(&frame.data, pid.page)?;
            }
        }

        Ok(())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
