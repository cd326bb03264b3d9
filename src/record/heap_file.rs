use std::sync::Arc;

use super::error::RecordError;
use super::heap_page::HeapPage;
use super::schema::TupleDesc;
use super::tuple::Tuple;
use crate::database::{Database, DbFile, DbResult, TupleIter};
use crate::file::{DiskFile, PageId};

/// Append-growable table of heap pages with bag semantics.
///
/// Inserts fill the last page and append a fresh one when it is full;
/// deleted slots on earlier pages are not revisited.
pub struct HeapFile {
    disk: Arc<DiskFile>,
    td: TupleDesc,
}

impl HeapFile {
    /// Open (creating if absent) a heap file at `path` and register it
    /// with the database under that name
    pub fn open(db: &mut Database, path: &str, td: TupleDesc) -> DbResult<Self> {
        let disk = db.add(DiskFile::open(path)?)?;
        Ok(Self { disk, td })
    }

    fn pid(&self, page: usize) -> PageId {
        PageId::new(self.disk.name(), page)
    }

    fn check_page(&self, page: usize) -> DbResult<()> {
        let num_pages = self.disk.num_pages();
        if page >= num_pages {
            return Err(RecordError::PageOutOfRange { page, num_pages }.into());
        }
        Ok(())
    }
}

impl DbFile for HeapFile {
    fn desc(&self) -> &TupleDesc {
        &self.td
    }

    fn name(&self) -> &str {
        self.disk.name()
    }

    fn insert(&self, db: &mut Database, tuple: &Tuple) -> DbResult<()> {
        if !self.td.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(
                "tuple does not match heap file schema".to_string(),
            )
            .into());
        }

        let num_pages = self.disk.num_pages();

        // Try the last page first
        if num_pages > 0 {
            let pid = self.pid(num_pages - 1);
            let stored = {
                let bytes = db.get_page(&pid)?;
                HeapPage::new(bytes, &self.td).insert(tuple)?
            };
            if stored {
                db.mark_dirty(&pid);
                return Ok(());
            }
        }

        // Append a fresh page; the pool materializes it zero-filled
        let pid = self.pid(num_pages);
        let stored = {
            let bytes = db.get_page(&pid)?;
            HeapPage::new(bytes, &self.td).insert(tuple)?
        };
        if !stored {
            return Err(RecordError::TupleTooLarge {
                record: self.td.length(),
                page: crate::file::DEFAULT_PAGE_SIZE,
            }
            .into());
        }
        db.mark_dirty(&pid);
        self.disk.reserve_page();
        Ok(())
    }

    fn delete(&self, db: &mut Database, it: &TupleIter) -> DbResult<()> {
        self.check_page(it.page)?;
        let pid = self.pid(it.page);
        {
            let bytes = db.get_page(&pid)?;
            HeapPage::new(bytes, &self.td).delete(it.slot)?;
        }
        db.mark_dirty(&pid);
        Ok(())
    }

    fn tuple_at(&self, db: &mut Database, it: &TupleIter) -> DbResult<Tuple> {
        self.check_page(it.page)?;
        let bytes = db.get_page(&self.pid(it.page))?;
        Ok(HeapPage::new(bytes, &self.td).get(it.slot)?)
    }

    fn begin(&self, db: &mut Database) -> DbResult<TupleIter> {
        for page in 0..self.disk.num_pages() {
            let bytes = db.get_page(&self.pid(page))?;
            let view = HeapPage::new(bytes, &self.td);
            let slot = view.begin();
            if slot != view.end() {
                return Ok(TupleIter::new(page, slot));
            }
        }
        Ok(self.end())
    }

    fn advance(&self, db: &mut Database, it: &mut TupleIter) -> DbResult<()> {
        let num_pages = self.disk.num_pages();
        if it.page >= num_pages {
            *it = TupleIter::new(num_pages, 0);
            return Ok(());
        }

        // Rest of the current page
        {
            let bytes = db.get_page(&self.pid(it.page))?;
            let view = HeapPage::new(bytes, &self.td);
            let mut slot = it.slot;
            view.next(&mut slot);
            if slot != view.end() {
                it.slot = slot;
                return Ok(());
            }
        }

        // Following pages
        for page in it.page + 1..num_pages {
            let bytes = db.get_page(&self.pid(page))?;
            let view = HeapPage::new(bytes, &self.td);
            let slot = view.begin();
            if slot != view.end() {
                it.page = page;
                it.slot = slot;
                return Ok(());
            }
        }

        *it = TupleIter::new(num_pages, 0);
        Ok(())
    }

    fn end(&self) -> TupleIter {
        TupleIter::new(self.disk.num_pages(), 0)
    }
}
