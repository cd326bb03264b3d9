use std::sync::Arc;

use super::error::IndexError;
use super::index_page::{IndexInsert, IndexPage};
use super::leaf_page::{LeafInsert, LeafPage, NO_NEXT_LEAF};
use crate::database::{Database, DbError, DbFile, DbResult, TupleIter};
use crate::file::{DEFAULT_PAGE_SIZE, DiskFile, PageId};
use crate::record::{Field, FieldType, RecordError, Tuple, TupleDesc};

/// The root index page never moves
const ROOT_PAGE: usize = 0;

/// B+tree over ordered leaf pages, rooted at page 0.
///
/// Page 0 is always an index page and always the root; growing the tree
/// rewrites it in place. All leaves sit at the same depth and chain forward
/// in key order through their `next_leaf` links, which is what scans follow.
/// Inserting an existing key overwrites its tuple. Deletion is not
/// supported.
pub struct BTreeFile {
    disk: Arc<DiskFile>,
    td: TupleDesc,
    key_index: usize,
}

impl BTreeFile {
    /// Open (creating if absent) a B+tree file at `path`, keyed on the INT
    /// column `key_index`, and register it with the database under that
    /// name. An empty file is formatted with an empty root over one empty
    /// leaf, both persisted immediately.
    pub fn open(db: &mut Database, path: &str, td: TupleDesc, key_index: usize) -> DbResult<Self> {
        if key_index >= td.num_fields() {
            return Err(IndexError::KeyIndexOutOfRange {
                index: key_index,
                fields: td.num_fields(),
            }
            .into());
        }
        if td.field_type(key_index) != FieldType::Int {
            return Err(IndexError::KeyNotInt(td.field_name(key_index).to_string()).into());
        }

        let disk = db.add(DiskFile::open(path)?)?;
        let file = Self {
            disk,
            td,
            key_index,
        };

        if file.disk.num_pages() == 0 {
            file.init_file()?;
        }

        Ok(file)
    }

    /// Write the initial root (page 0) and first leaf (page 1)
    fn init_file(&self) -> DbResult<()> {
        let mut root_bytes = vec![0u8; DEFAULT_PAGE_SIZE];
        {
            let mut root = IndexPage::new(&mut root_bytes);
            root.init(false);
            root.set_child(0, 1);
        }

        let mut leaf_bytes = vec![0u8; DEFAULT_PAGE_SIZE];
        {
            let mut leaf = LeafPage::new(&mut leaf_bytes, &self.td, self.key_index);
            leaf.init();
        }

        self.disk.write_page(&root_bytes, ROOT_PAGE)?;
        self.disk.write_page(&leaf_bytes, 1)?;
        self.disk.reserve_page();
        self.disk.reserve_page();
        Ok(())
    }

    fn pid(&self, page: usize) -> PageId {
        PageId::new(self.disk.name(), page)
    }

    /// Walk from the root to the leaf owning `key`. Returns the index
    /// pages visited, root first, and the leaf's page index.
    fn descend(&self, db: &mut Database, key: i32) -> DbResult<(Vec<usize>, usize)> {
        let mut path = Vec::new();
        let mut current = ROOT_PAGE;

        loop {
            let (child, is_index) = {
                let bytes = db.get_page(&self.pid(current))?;
                let page = IndexPage::new(bytes);
                let slot = page.choose_child_slot(key);
                (page.child_at(slot), page.index_children())
            };
            path.push(current);
            if is_index {
                current = child;
            } else {
                return Ok((path, child));
            }
        }
    }

    /// Split the leaf `leaf_id`, wiring the new sibling into the chain.
    /// Returns the separator key and the new leaf's page index.
    fn split_leaf(&self, db: &mut Database, leaf_id: usize) -> DbResult<(i32, usize)> {
        let new_leaf_id = self.disk.reserve_page();

        let split = {
            let bytes = db.get_page(&self.pid(leaf_id))?;
            let mut leaf = LeafPage::new(bytes, &self.td, self.key_index);
            let split = leaf.split();
            leaf.set_next_leaf(new_leaf_id);
            split
        };
        db.mark_dirty(&self.pid(leaf_id));

        {
            let bytes = db.get_page(&self.pid(new_leaf_id))?;
            LeafPage::new(bytes, &self.td, self.key_index).adopt_split(&split);
        }
        db.mark_dirty(&self.pid(new_leaf_id));

        Ok((split.separator, new_leaf_id))
    }

    /// Split the index page `page_id`. Returns the promoted key and the
    /// new right sibling's page index.
    fn split_index(&self, db: &mut Database, page_id: usize) -> DbResult<(i32, usize)> {
        let new_page_id = self.disk.reserve_page();

        let split = {
            let bytes = db.get_page(&self.pid(page_id))?;
            IndexPage::new(bytes).split()
        };
        db.mark_dirty(&self.pid(page_id));

        {
            let bytes = db.get_page(&self.pid(new_page_id))?;
            IndexPage::new(bytes).adopt_split(&split);
        }
        db.mark_dirty(&self.pid(new_page_id));

        Ok((split.promoted, new_page_id))
    }

    /// Put `(key, right_child)` into the index page `page_id`, which has
    /// room for it
    fn index_insert(
        &self,
        db: &mut Database,
        page_id: usize,
        key: i32,
        right_child: usize,
    ) -> DbResult<()> {
        let outcome = {
            let bytes = db.get_page(&self.pid(page_id))?;
            IndexPage::new(bytes).insert(key, right_child)
        };
        if outcome == IndexInsert::Full {
            return Err(
                IndexError::Corrupted(format!("index page {page_id} full after split")).into(),
            );
        }
        db.mark_dirty(&self.pid(page_id));
        Ok(())
    }

    /// The old root just split into page 0 (left half) and `right_id`.
    /// Move the left half to a fresh page and rewrite page 0 as a new
    /// root over both halves, so the root's page index stays 0.
    fn grow_root(&self, db: &mut Database, promoted: i32, right_id: usize) -> DbResult<()> {
        let left_copy_id = self.disk.reserve_page();

        let root_bytes = db.get_page(&self.pid(ROOT_PAGE))?.to_vec();
        {
            let bytes = db.get_page(&self.pid(left_copy_id))?;
            bytes.copy_from_slice(&root_bytes);
        }
        db.mark_dirty(&self.pid(left_copy_id));

        {
            let bytes = db.get_page(&self.pid(ROOT_PAGE))?;
            let mut root = IndexPage::new(bytes);
            root.init(true);
            root.set_key(0, promoted);
            root.set_child(0, left_copy_id);
            root.set_child(1, right_id);
            root.set_size(1);
        }
        db.mark_dirty(&self.pid(ROOT_PAGE));

        Ok(())
    }

    /// Page index of the leftmost leaf
    fn first_leaf(&self, db: &mut Database) -> DbResult<usize> {
        let mut current = ROOT_PAGE;
        loop {
            let (child, is_index) = {
                let bytes = db.get_page(&self.pid(current))?;
                let page = IndexPage::new(bytes);
                (page.child_at(0), page.index_children())
            };
            if is_index {
                current = child;
            } else {
                return Ok(child);
            }
        }
    }
}

impl DbFile for BTreeFile {
    fn desc(&self) -> &TupleDesc {
        &self.td
    }

    fn name(&self) -> &str {
        self.disk.name()
    }

    fn insert(&self, db: &mut Database, tuple: &Tuple) -> DbResult<()> {
        if !self.td.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(
                "tuple does not match b+tree file schema".to_string(),
            )
            .into());
        }
        let key = match tuple.field(self.key_index) {
            Field::Int(k) => *k,
            _ => {
                return Err(
                    IndexError::KeyNotInt(self.td.field_name(self.key_index).to_string()).into(),
                );
            }
        };

        let (path, leaf_id) = self.descend(db, key)?;

        let outcome = {
            let bytes = db.get_page(&self.pid(leaf_id))?;
            LeafPage::new(bytes, &self.td, self.key_index).insert(tuple)?
        };
        match outcome {
            LeafInsert::Stored { .. } | LeafInsert::Replaced { .. } => {
                // An overwrite at capacity reports full only advisorily;
                // no split happens unless a new key finds no room.
                db.mark_dirty(&self.pid(leaf_id));
                return Ok(());
            }
            LeafInsert::Full => {}
        }

        // Split the leaf and land the tuple on the side owning its key;
        // that side cannot be full again.
        let (separator, new_leaf_id) = self.split_leaf(db, leaf_id)?;
        let target = if key < separator { leaf_id } else { new_leaf_id };
        let retry = {
            let bytes = db.get_page(&self.pid(target))?;
            LeafPage::new(bytes, &self.td, self.key_index).insert(tuple)?
        };
        if retry == LeafInsert::Full {
            return Err(
                IndexError::Corrupted(format!("leaf page {target} full after split")).into(),
            );
        }
        db.mark_dirty(&self.pid(target));

        // Push the separator up the recorded path, splitting full index
        // pages as needed. Whatever is still carried past the root means
        // the root itself split and the tree grows a level.
        let mut carry = Some((separator, new_leaf_id));
        for &parent in path.iter().rev() {
            let Some((key_up, right_id)) = carry else {
                break;
            };

            let outcome = {
                let bytes = db.get_page(&self.pid(parent))?;
                IndexPage::new(bytes).insert(key_up, right_id)
            };
            match outcome {
                IndexInsert::Stored { .. } => {
                    db.mark_dirty(&self.pid(parent));
                    carry = None;
                }
                IndexInsert::Full => {
                    let (promoted, new_index_id) = self.split_index(db, parent)?;
                    let target = if key_up < promoted { parent } else { new_index_id };
                    self.index_insert(db, target, key_up, right_id)?;
                    carry = Some((promoted, new_index_id));
                }
            }
        }

        if let Some((promoted, right_id)) = carry {
            self.grow_root(db, promoted, right_id)?;
        }

        Ok(())
    }

    fn delete(&self, _db: &mut Database, _it: &TupleIter) -> DbResult<()> {
        Err(DbError::NotImplemented("b+tree tuple deletion"))
    }

    fn tuple_at(&self, db: &mut Database, it: &TupleIter) -> DbResult<Tuple> {
        let num_pages = self.disk.num_pages();
        if it.page >= num_pages {
            return Err(RecordError::PageOutOfRange {
                page: it.page,
                num_pages,
            }
            .into());
        }
        let bytes = db.get_page(&self.pid(it.page))?;
        Ok(LeafPage::new(bytes, &self.td, self.key_index).get(it.slot)?)
    }

    fn begin(&self, db: &mut Database) -> DbResult<TupleIter> {
        let mut leaf = self.first_leaf(db)?;
        loop {
            let (size, next) = {
                let bytes = db.get_page(&self.pid(leaf))?;
                let page = LeafPage::new(bytes, &self.td, self.key_index);
                (page.size(), page.next_leaf())
            };
            if size > 0 {
                return Ok(TupleIter::new(leaf, 0));
            }
            if next == NO_NEXT_LEAF {
                return Ok(self.end());
            }
            leaf = next;
        }
    }

    fn advance(&self, db: &mut Database, it: &mut TupleIter) -> DbResult<()> {
        if *it == self.end() {
            return Ok(());
        }

        let (size, mut next) = {
            let bytes = db.get_page(&self.pid(it.page))?;
            let page = LeafPage::new(bytes, &self.td, self.key_index);
            (page.size(), page.next_leaf())
        };

        if it.slot + 1 < size {
            it.slot += 1;
            return Ok(());
        }

        // Follow the sibling chain to the next non-empty leaf
        loop {
            if next == NO_NEXT_LEAF {
                *it = self.end();
                return Ok(());
            }
            let (size, next_next) = {
                let bytes = db.get_page(&self.pid(next))?;
                let page = LeafPage::new(bytes, &self.td, self.key_index);
                (page.size(), page.next_leaf())
            };
            if size > 0 {
                it.page = next;
                it.slot = 0;
                return Ok(());
            }
            next = next_next;
        }
    }

    fn end(&self) -> TupleIter {
        TupleIter::new(usize::MAX, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_desc() -> TupleDesc {
        TupleDesc::new(vec![FieldType::Int, FieldType::Char], vec!["k", "v"]).unwrap()
    }

    fn tuple(k: i32, v: &str) -> Tuple {
        Tuple::new(vec![k.into(), v.into()])
    }

    fn setup_test_env() -> (TempDir, Database, BTreeFile) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = Database::new();
        let path = temp_dir.path().join("test.idx");
        let file = BTreeFile::open(&mut db, path.to_str().unwrap(), test_desc(), 0).unwrap();
        (temp_dir, db, file)
    }

    fn scan_keys(db: &mut Database, file: &BTreeFile) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut it = file.begin(db).unwrap();
        while it != file.end() {
            let t = file.tuple_at(db, &it).unwrap();
            match t.field(0) {
                Field::Int(k) => keys.push(*k),
                other => panic!("non-int key {other:?}"),
            }
            file.advance(db, &mut it).unwrap();
        }
        keys
    }

    /// Walk the whole tree checking structural invariants; returns the
    /// depth below `page` (0 for a leaf level).
    fn check_subtree(
        db: &mut Database,
        file: &BTreeFile,
        page: usize,
        lo: Option<i32>,
        hi: Option<i32>,
    ) -> usize {
        let (size, index_children, keys, children) = {
            let bytes = db.get_page(&file.pid(page)).unwrap();
            let view = IndexPage::new(bytes);
            let keys: Vec<i32> = (0..view.size()).map(|i| view.key_at(i)).collect();
            let children: Vec<usize> = (0..=view.size()).map(|i| view.child_at(i)).collect();
            (view.size(), view.index_children(), keys, children)
        };

        assert!(keys.windows(2).all(|w| w[0] < w[1]), "separators unsorted");

        let mut depth = None;
        for (slot, &child) in children.iter().enumerate() {
            let child_lo = if slot == 0 { lo } else { Some(keys[slot - 1]) };
            let child_hi = if slot == size { hi } else { Some(keys[slot]) };

            let child_depth = if index_children {
                check_subtree(db, file, child, child_lo, child_hi)
            } else {
                let bytes = db.get_page(&file.pid(child)).unwrap();
                let leaf = LeafPage::new(bytes, &file.td, file.key_index);
                let leaf_keys: Vec<i32> = (0..leaf.size()).map(|i| leaf.key_at(i)).collect();
                assert!(leaf_keys.windows(2).all(|w| w[0] < w[1]), "leaf unsorted");
                for &k in &leaf_keys {
                    if let Some(lo) = child_lo {
                        assert!(k >= lo, "key {k} below separator {lo}");
                    }
                    if let Some(hi) = child_hi {
                        assert!(k < hi, "key {k} not below separator {hi}");
                    }
                }
                0
            };

            match depth {
                None => depth = Some(child_depth),
                Some(d) => assert_eq!(d, child_depth, "leaves at unequal depth"),
            }
        }

        depth.unwrap() + 1
    }

    #[test]
    fn test_new_file_layout() {
        let (_temp_dir, mut db, file) = setup_test_env();

        assert_eq!(file.disk.num_pages(), 2);
        {
            let bytes = db.get_page(&file.pid(0)).unwrap();
            let root = IndexPage::new(bytes);
            assert_eq!(root.size(), 0);
            assert!(!root.index_children());
            assert_eq!(root.child_at(0), 1);
        }
        {
            let bytes = db.get_page(&file.pid(1)).unwrap();
            let leaf = LeafPage::new(bytes, &file.td, 0);
            assert_eq!(leaf.size(), 0);
            assert_eq!(leaf.next_leaf(), NO_NEXT_LEAF);
        }
        assert_eq!(file.begin(&mut db).unwrap(), file.end());
    }

    #[test]
    fn test_open_rejects_non_int_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = Database::new();
        let path = temp_dir.path().join("bad.idx");
        let result = BTreeFile::open(&mut db, path.to_str().unwrap(), test_desc(), 1);
        assert!(matches!(
            result,
            Err(DbError::Index(IndexError::KeyNotInt(_)))
        ));
    }

    #[test]
    fn test_insert_and_scan_sorted() {
        let (_temp_dir, mut db, file) = setup_test_env();

        for k in [5, 1, 9, 3, 7] {
            file.insert(&mut db, &tuple(k, "x")).unwrap();
        }
        assert_eq!(scan_keys(&mut db, &file), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_duplicate_insert_overwrites() {
        let (_temp_dir, mut db, file) = setup_test_env();

        file.insert(&mut db, &tuple(5, "a")).unwrap();
        let pages_before = file.disk.num_pages();
        file.insert(&mut db, &tuple(5, "b")).unwrap();

        assert_eq!(file.disk.num_pages(), pages_before);
        let it = file.begin(&mut db).unwrap();
        assert_eq!(file.tuple_at(&mut db, &it).unwrap(), tuple(5, "b"));
        let mut it = it;
        file.advance(&mut db, &mut it).unwrap();
        assert_eq!(it, file.end());
    }

    #[test]
    fn test_monotone_insert_splits_leaves() {
        let (_temp_dir, mut db, file) = setup_test_env();

        // Leaf capacity is 60 for this schema; 1024 inserts force many
        // leaf splits
        let n = 1024;
        for k in 1..=n {
            file.insert(&mut db, &tuple(k, "v")).unwrap();
        }

        assert_eq!(scan_keys(&mut db, &file), (1..=n).collect::<Vec<_>>());
        assert!(file.disk.num_pages() > 2 + (n as usize) / 60);
        check_subtree(&mut db, &file, ROOT_PAGE, None, None);
    }

    #[test]
    fn test_random_order_insert_scans_sorted() {
        let (_temp_dir, mut db, file) = setup_test_env();

        // Deterministic shuffle of 1..=600: i * 347 mod 601 is a bijection
        let n = 600;
        for i in 1..=n {
            let k = ((i as i64 * 347) % 601) as i32;
            file.insert(&mut db, &tuple(k, "v")).unwrap();
        }

        assert_eq!(scan_keys(&mut db, &file), (1..=n).collect::<Vec<_>>());
        check_subtree(&mut db, &file, ROOT_PAGE, None, None);
    }

    #[test]
    fn test_overwrite_full_leaf_does_not_split() {
        let (_temp_dir, mut db, file) = setup_test_env();

        let capacity = LeafPage::capacity_for(&file.td) as i32;
        for k in 0..capacity {
            file.insert(&mut db, &tuple(k, "old")).unwrap();
        }
        let pages_before = file.disk.num_pages();

        // The single leaf is exactly full; rewriting a key must not split
        file.insert(&mut db, &tuple(capacity / 2, "new")).unwrap();
        assert_eq!(file.disk.num_pages(), pages_before);

        let keys = scan_keys(&mut db, &file);
        assert_eq!(keys.len(), capacity as usize);
    }

    #[test]
    fn test_root_growth_keeps_page_zero() {
        let (_temp_dir, mut db, file) = setup_test_env();

        // Leaf capacity 60, root capacity 340. Monotone inserts split the
        // rightmost leaf every 30 tuples, so ~10.3k inserts overflow the
        // root and grow the tree a level.
        let n = 12_000;
        for k in 1..=n {
            file.insert(&mut db, &tuple(k, "v")).unwrap();
        }

        let depth = {
            let root_children = {
                let bytes = db.get_page(&file.pid(ROOT_PAGE)).unwrap();
                let root = IndexPage::new(bytes);
                assert!(root.index_children(), "root did not grow");
                root.size()
            };
            assert!(root_children >= 1);
            check_subtree(&mut db, &file, ROOT_PAGE, None, None)
        };
        assert_eq!(depth, 2, "expected index level between root and leaves");

        assert_eq!(scan_keys(&mut db, &file), (1..=n).collect::<Vec<_>>());
    }

    #[test]
    fn test_leaf_chain_is_ascending() {
        let (_temp_dir, mut db, file) = setup_test_env();

        for k in 1..=500 {
            file.insert(&mut db, &tuple(k, "v")).unwrap();
        }

        let mut leaf = file.first_leaf(&mut db).unwrap();
        let mut last_key = i32::MIN;
        while leaf != NO_NEXT_LEAF {
            let (first, last, next) = {
                let bytes = db.get_page(&file.pid(leaf)).unwrap();
                let page = LeafPage::new(bytes, &file.td, 0);
                assert!(page.size() > 0);
                (page.key_at(0), page.key_at(page.size() - 1), page.next_leaf())
            };
            assert!(first > last_key);
            last_key = last;
            leaf = next;
        }
        assert_eq!(last_key, 500);
    }

    #[test]
    fn test_delete_not_implemented() {
        let (_temp_dir, mut db, file) = setup_test_env();
        file.insert(&mut db, &tuple(1, "x")).unwrap();
        let it = file.begin(&mut db).unwrap();
        assert!(matches!(
            file.delete(&mut db, &it),
            Err(DbError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.idx");
        let path = path.to_str().unwrap();

        {
            let mut db = Database::new();
            let file = BTreeFile::open(&mut db, path, test_desc(), 0).unwrap();
            for k in 1..=200 {
                file.insert(&mut db, &tuple(k, "v")).unwrap();
            }
            db.flush_all().unwrap();
        }

        let mut db = Database::new();
        let file = BTreeFile::open(&mut db, path, test_desc(), 0).unwrap();
        assert_eq!(scan_keys(&mut db, &file), (1..=200).collect::<Vec<_>>());
    }
}
