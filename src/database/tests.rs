use super::*;
use crate::file::{DEFAULT_PAGE_SIZE, DiskFile, PageId};
use crate::index::BTreeFile;
use crate::query::{self, Aggregate, AggregateOp, JoinPredicate, PredicateOp};
use crate::record::{Field, FieldType, HeapFile, Tuple, TupleDesc};
use tempfile::TempDir;

fn scan_all(db: &mut Database, file: &dyn DbFile) -> Vec<Tuple> {
    let mut tuples = Vec::new();
    let mut it = file.begin(db).unwrap();
    while it != file.end() {
        tuples.push(file.tuple_at(db, &it).unwrap());
        file.advance(db, &mut it).unwrap();
    }
    tuples
}

fn open_disk(dir: &TempDir, name: &str) -> DiskFile {
    DiskFile::open(dir.path().join(name)).unwrap()
}

#[test]
fn test_registry_get_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let file = db.add(open_disk(&dir, "a.db")).unwrap();
    let name = file.name().to_string();

    assert!(db.get(&name).is_ok());
    assert!(db.get("nope").is_err());

    let removed = db.remove(&name).unwrap();
    assert_eq!(removed.name(), name);
    assert!(db.get(&name).is_err());
    assert!(db.remove(&name).is_err());
}

#[test]
fn test_remove_flushes_dirty_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let file = db.add(open_disk(&dir, "a.db")).unwrap();
    let name = file.name().to_string();
    let pid = PageId::new(&name, 0);

    {
        let page = db.get_page(&pid).unwrap();
        page[0] = 42;
    }
    db.mark_dirty(&pid);

    let removed = db.remove(&name).unwrap();
    let mut raw = vec![0u8; DEFAULT_PAGE_SIZE];
    removed.read_page(&mut raw, 0).unwrap();
    assert_eq!(raw[0], 42);
    assert!(!db.pool().contains(&pid));
}

#[test]
fn test_add_replacement_flushes_and_drops_stale_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let file = db.add(open_disk(&dir, "a.db")).unwrap();
    let name = file.name().to_string();
    let pid = PageId::new(&name, 0);

    {
        let page = db.get_page(&pid).unwrap();
        page[0] = 7;
    }
    db.mark_dirty(&pid);

    // Re-registering the same path must write the dirty frame out and
    // start the new handle from disk state
    db.add(open_disk(&dir, "a.db")).unwrap();
    assert!(!db.pool().contains(&pid));

    let page = db.get_page(&pid).unwrap();
    assert_eq!(page[0], 7);
}

#[test]
fn test_eviction_write_back_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::with_pool_capacity(3);

    let file = db.add(open_disk(&dir, "a.db")).unwrap();
    let name = file.name().to_string();

    // Dirty pages 0..=3 in turn; the fourth touch evicts page 0
    for page in 0..4 {
        let pid = PageId::new(&name, page);
        let bytes = db.get_page(&pid).unwrap();
        bytes[0] = 0xA0 + page as u8;
        db.mark_dirty(&pid);
    }

    let pid0 = PageId::new(&name, 0);
    assert!(!db.pool().contains(&pid0));
    assert_eq!(file.writes(), vec![0]);

    // Fetching page 0 again re-reads the persisted bytes
    let bytes = db.get_page(&pid0).unwrap();
    assert_eq!(bytes[0], 0xA0);
}

#[test]
fn test_flush_file_matches_raw_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let file = db.add(open_disk(&dir, "a.db")).unwrap();
    let name = file.name().to_string();

    let mut expected = Vec::new();
    for page in 0..5usize {
        let pid = PageId::new(&name, page);
        let bytes = db.get_page(&pid).unwrap();
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = ((page * 31 + i) % 251) as u8;
        }
        expected.push(bytes.to_vec());
        db.mark_dirty(&pid);
    }
    db.flush_file(&name).unwrap();

    let raw = open_disk(&dir, "a.db");
    for (page, want) in expected.iter().enumerate() {
        let mut got = vec![0u8; DEFAULT_PAGE_SIZE];
        raw.read_page(&mut got, page).unwrap();
        assert_eq!(&got, want, "page {page} differs after flush");
    }
}

#[test]
fn test_drop_flushes_dirty_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.db");

    {
        let mut db = Database::new();
        let file = db.add(DiskFile::open(&path).unwrap()).unwrap();
        let pid = PageId::new(file.name(), 0);
        let page = db.get_page(&pid).unwrap();
        page[0] = 88;
        db.mark_dirty(&pid);
        // db dropped here, flushing the frame
    }

    let raw = DiskFile::open(&path).unwrap();
    let mut bytes = vec![0u8; DEFAULT_PAGE_SIZE];
    raw.read_page(&mut bytes, 0).unwrap();
    assert_eq!(bytes[0], 88);
}

#[test]
fn test_heap_and_btree_share_one_pool() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::with_pool_capacity(8);

    let heap_td = TupleDesc::new(vec![FieldType::Int, FieldType::Char], vec!["id", "s"]).unwrap();
    let heap_path = dir.path().join("heap.tbl");
    let heap = HeapFile::open(&mut db, heap_path.to_str().unwrap(), heap_td.clone()).unwrap();

    let tree_path = dir.path().join("tree.idx");
    let tree = BTreeFile::open(&mut db, tree_path.to_str().unwrap(), heap_td, 0).unwrap();

    for i in 0..200 {
        let t = Tuple::new(vec![i.into(), format!("row{i}").into()]);
        heap.insert(&mut db, &t).unwrap();
        tree.insert(&mut db, &t).unwrap();
        assert!(db.pool().cached_pages() <= 8);
    }

    assert_eq!(scan_all(&mut db, &heap).len(), 200);
    let tree_rows = scan_all(&mut db, &tree);
    assert_eq!(tree_rows.len(), 200);
    assert!(
        tree_rows
            .windows(2)
            .all(|w| match (w[0].field(0), w[1].field(0)) {
                (Field::Int(a), Field::Int(b)) => a < b,
                _ => false,
            })
    );
}

#[test]
fn test_operator_pipeline_heap_to_btree() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let td = TupleDesc::new(vec![FieldType::Int, FieldType::Char], vec!["id", "name"]).unwrap();
    let src_path = dir.path().join("src.tbl");
    let src = HeapFile::open(&mut db, src_path.to_str().unwrap(), td.clone()).unwrap();

    // Insertion order is descending; the B+tree sink re-sorts by key
    for i in (0..50).rev() {
        src.insert(&mut db, &Tuple::new(vec![i.into(), format!("n{i}").into()]))
            .unwrap();
    }

    let dst_path = dir.path().join("dst.idx");
    let dst = BTreeFile::open(&mut db, dst_path.to_str().unwrap(), td, 0).unwrap();
    query::filter(
        &mut db,
        &src,
        &dst,
        &[query::FilterPredicate::new("id", PredicateOp::Ge, 10)],
    )
    .unwrap();

    let rows = scan_all(&mut db, &dst);
    let ids: Vec<i32> = rows
        .iter()
        .map(|t| match t.field(0) {
            Field::Int(v) => *v,
            other => panic!("non-int id {other:?}"),
        })
        .collect();
    assert_eq!(ids, (10..50).collect::<Vec<_>>());
}

#[test]
fn test_join_then_aggregate_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();

    let orders_td = TupleDesc::new(
        vec![FieldType::Int, FieldType::Int],
        vec!["customer", "amount"],
    )
    .unwrap();
    let orders_path = dir.path().join("orders.tbl");
    let orders = HeapFile::open(&mut db, orders_path.to_str().unwrap(), orders_td).unwrap();
    for (customer, amount) in [(1, 10), (2, 20), (1, 5), (3, 7), (2, 1)] {
        orders
            .insert(&mut db, &Tuple::new(vec![customer.into(), amount.into()]))
            .unwrap();
    }

    let customers_td = TupleDesc::new(
        vec![FieldType::Int, FieldType::Char],
        vec!["id", "name"],
    )
    .unwrap();
    let customers_path = dir.path().join("customers.tbl");
    let customers =
        HeapFile::open(&mut db, customers_path.to_str().unwrap(), customers_td).unwrap();
    for (id, name) in [(1, "ann"), (2, "bob")] {
        customers
            .insert(&mut db, &Tuple::new(vec![id.into(), name.into()]))
            .unwrap();
    }

    // orders ⋈ customers on customer = id, right key omitted
    let joined_td = TupleDesc::new(
        vec![FieldType::Int, FieldType::Int, FieldType::Char],
        vec!["customer", "amount", "name"],
    )
    .unwrap();
    let joined_path = dir.path().join("joined.tbl");
    let joined = HeapFile::open(&mut db, joined_path.to_str().unwrap(), joined_td).unwrap();
    query::join(
        &mut db,
        &orders,
        &customers,
        &joined,
        &JoinPredicate::new("customer", PredicateOp::Eq, "id"),
    )
    .unwrap();
    assert_eq!(scan_all(&mut db, &joined).len(), 4);

    // SUM(amount) grouped by customer, ascending by customer
    let sums_td = TupleDesc::new(
        vec![FieldType::Int, FieldType::Int],
        vec!["customer", "total"],
    )
    .unwrap();
    let sums_path = dir.path().join("sums.tbl");
    let sums = HeapFile::open(&mut db, sums_path.to_str().unwrap(), sums_td).unwrap();
    query::aggregate(
        &mut db,
        &joined,
        &sums,
        &Aggregate::new(AggregateOp::Sum, "amount").grouped_by("customer"),
    )
    .unwrap();

    assert_eq!(
        scan_all(&mut db, &sums),
        vec![
            Tuple::new(vec![1.into(), 15.into()]),
            Tuple::new(vec![2.into(), 21.into()]),
        ]
    );
}
