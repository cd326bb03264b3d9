use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::DEFAULT_PAGE_SIZE;
use super::error::{FileError, FileResult};

/// Handle to one open paged file.
///
/// The positioned seek+transfer pair is serialized by a per-handle mutex, so
/// the handle may be shared across threads. The page count is derived from
/// the file length at open time and advanced by the owning file type
/// (`HeapFile`/`BTreeFile`) via [`DiskFile::reserve_page`]; a reserved page
/// only reaches disk when the buffer pool flushes or evicts it.
pub struct DiskFile {
    name: String,
    file: Mutex<File>,
    num_pages: AtomicUsize,
    /// Every page index read, in order, duplicates preserved
    reads: Mutex<Vec<usize>>,
    /// Every page index written, in order, duplicates preserved
    writes: Mutex<Vec<usize>>,
}

impl DiskFile {
    /// Open a paged file, creating it if it does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len() as usize;

        Ok(Self {
            name: path.display().to_string(),
            file: Mutex::new(file),
            num_pages: AtomicUsize::new(len / DEFAULT_PAGE_SIZE),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        })
    }

    /// Name this file is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current page count
    pub fn num_pages(&self) -> usize {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Claim the next page index, extending the file's logical size by one
    pub fn reserve_page(&self) -> usize {
        self.num_pages.fetch_add(1, Ordering::Relaxed)
    }

    /// Positioned read of one page into `buffer`.
    ///
    /// A read past the persisted end of the file (or into its unwritten
    /// tail) zero-fills the remainder of the buffer; not-yet-flushed pages
    /// therefore materialize as all-zero bytes.
    pub fn read_page(&self, buffer: &mut [u8], page: usize) -> FileResult<()> {
        if buffer.len() != DEFAULT_PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: DEFAULT_PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let mut file = self.file.lock().unwrap();
        self.reads.lock().unwrap().push(page);

        let offset = (page * DEFAULT_PAGE_SIZE) as u64;
        file.seek(SeekFrom::Start(offset))?;
        let bytes_read = file.read(buffer)?;
        if bytes_read < DEFAULT_PAGE_SIZE {
            buffer[bytes_read..].fill(0);
        }

        Ok(())
    }

    /// Positioned write of exactly one page from `buffer`
    pub fn write_page(&self, buffer: &[u8], page: usize) -> FileResult<()> {
        if buffer.len() != DEFAULT_PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: DEFAULT_PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let mut file = self.file.lock().unwrap();
        self.writes.lock().unwrap().push(page);

        let offset = (page * DEFAULT_PAGE_SIZE) as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buffer)?;

        Ok(())
    }

    /// Log of page indices read so far
    pub fn reads(&self) -> Vec<usize> {
        self.reads.lock().unwrap().clone()
    }

    /// Log of page indices written so far
    pub fn writes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().clone()
    }
}
