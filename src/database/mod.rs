use std::sync::Arc;
use thiserror::Error;

use crate::file::{BufferPool, DiskFile, FileError, FileTable, PageId};
use crate::index::IndexError;
use crate::record::{RecordError, Tuple, TupleDesc};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type DbResult<T> = Result<T, DbError>;

/// Position of one tuple in a file: (page index, slot). Plain value; the
/// owning file interprets it. Scans compare against the file's `end()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleIter {
    pub page: usize,
    pub slot: usize,
}

impl TupleIter {
    pub fn new(page: usize, slot: usize) -> Self {
        Self { page, slot }
    }
}

/// A registered table file: schema access, tuple mutation, and the scan
/// protocol the relational operators are written against.
pub trait DbFile {
    /// Schema of the stored tuples
    fn desc(&self) -> &TupleDesc;

    /// Name the file is registered under
    fn name(&self) -> &str;

    fn insert(&self, db: &mut Database, tuple: &Tuple) -> DbResult<()>;

    fn delete(&self, db: &mut Database, it: &TupleIter) -> DbResult<()>;

    /// Tuple the iterator points at
    fn tuple_at(&self, db: &mut Database, it: &TupleIter) -> DbResult<Tuple>;

    /// Iterator at the first tuple, or `end()` for an empty file
    fn begin(&self, db: &mut Database) -> DbResult<TupleIter>;

    /// Step to the next tuple, or to `end()`
    fn advance(&self, db: &mut Database, it: &mut TupleIter) -> DbResult<()>;

    /// Iterator one past the last tuple
    fn end(&self) -> TupleIter;
}

/// The engine's root object: the registry of open files plus the buffer
/// pool all page access flows through.
///
/// There is no process-wide instance; a `Database` is created by the caller
/// and threaded through every operation.
pub struct Database {
    files: FileTable,
    pool: BufferPool,
}

impl Database {
    pub fn new() -> Self {
        Self {
            files: FileTable::new(),
            pool: BufferPool::new(),
        }
    }

    /// A database whose pool holds `capacity` frames
    pub fn with_pool_capacity(capacity: usize) -> Self {
        Self {
            files: FileTable::new(),
            pool: BufferPool::with_capacity(capacity),
        }
    }

    /// Register a file under its name, returning the shared handle.
    /// Replacing an existing entry flushes its dirty frames and drops its
    /// cached pages first, so the new registration starts from disk state.
    pub fn add(&mut self, file: DiskFile) -> DbResult<Arc<DiskFile>> {
        let name = file.name().to_string();
        if self.files.contains_key(&name) {
            self.pool.flush_file(&self.files, &name)?;
            self.pool.discard_file(&name);
        }

        let file = Arc::new(file);
        self.files.insert(name, file.clone());
        Ok(file)
    }

    /// Deregister a file, flushing its dirty frames and dropping its
    /// cached pages first
    pub fn remove(&mut self, name: &str) -> DbResult<Arc<DiskFile>> {
        if !self.files.contains_key(name) {
            return Err(FileError::FileNotRegistered(name.to_string()).into());
        }
        self.pool.flush_file(&self.files, name)?;
        self.pool.discard_file(name);

        // Present per the check above
        Ok(self.files.remove(name).unwrap())
    }

    /// Handle of a registered file
    pub fn get(&self, name: &str) -> DbResult<&Arc<DiskFile>> {
        self.files
            .get(name)
            .ok_or_else(|| FileError::FileNotRegistered(name.to_string()).into())
    }

    /// Fetch a page through the buffer pool. The borrow is exclusive and
    /// ends before the next call into the database; callers that mutate
    /// the bytes must follow up with [`Database::mark_dirty`].
    pub fn get_page(&mut self, pid: &PageId) -> DbResult<&mut [u8]> {
        Ok(self.pool.get_page(&self.files, pid)?)
    }

    pub fn mark_dirty(&mut self, pid: &PageId) {
        self.pool.mark_dirty(pid);
    }

    pub fn flush_page(&mut self, pid: &PageId) -> DbResult<()> {
        Ok(self.pool.flush_page(&self.files, pid)?)
    }

    pub fn flush_file(&mut self, name: &str) -> DbResult<()> {
        Ok(self.pool.flush_file(&self.files, name)?)
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        Ok(self.pool.flush_all(&self.files)?)
    }

    /// The buffer pool, for cache introspection
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Flush errors cannot be surfaced from a destructor
        let _ = self.pool.flush_all(&self.files);
    }
}
