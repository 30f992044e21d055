//! # Duplicate Key Tests
//!
//! Non-unique keys collapse into one leaf slot backed by an overflow
//! chain. These tests pin down the chain's LIFO emission order, its
//! interaction with deletes, and overflow-page recycling under heavy
//! duplication.

use ridx::{Index, Key, KeyType, Rid, ScanRange};
use tempfile::tempdir;

fn rids_for(index: &Index, key: i32) -> Vec<Rid> {
    let range = ScanRange::new(Some(Key::Int(key)), Some(Key::Int(key)), true, true);
    index
        .scan(KeyType::Int, range)
        .unwrap()
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|(_, rid)| rid)
        .collect()
}

#[test]
fn two_inserts_scan_newest_first() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("lifo.ridx")).unwrap();

    index.insert(&Key::Int(7), Rid::new(1, 1)).unwrap();
    index.insert(&Key::Int(7), Rid::new(2, 2)).unwrap();

    assert_eq!(rids_for(&index, 7), vec![Rid::new(2, 2), Rid::new(1, 1)]);
}

#[test]
fn long_chain_emits_in_reverse_insert_order() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("chain.ridx")).unwrap();

    for i in 0..50u32 {
        index.insert(&Key::Int(1), Rid::new(10, i)).unwrap();
    }

    let expected: Vec<Rid> = (0..50u32).rev().map(|i| Rid::new(10, i)).collect();
    assert_eq!(rids_for(&index, 1), expected);
}

#[test]
fn duplicates_mix_with_unique_neighbors() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("mixed.ridx")).unwrap();

    index.insert(&Key::Int(1), Rid::new(1, 0)).unwrap();
    index.insert(&Key::Int(2), Rid::new(2, 0)).unwrap();
    index.insert(&Key::Int(2), Rid::new(2, 1)).unwrap();
    index.insert(&Key::Int(3), Rid::new(3, 0)).unwrap();

    let entries = index
        .scan(KeyType::Int, ScanRange::all())
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(
        entries,
        vec![
            (Key::Int(1), Rid::new(1, 0)),
            (Key::Int(2), Rid::new(2, 1)),
            (Key::Int(2), Rid::new(2, 0)),
            (Key::Int(3), Rid::new(3, 0)),
        ]
    );
}

#[test]
fn delete_one_rid_leaves_the_rest() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("partial.ridx")).unwrap();

    for i in 0..5u32 {
        index.insert(&Key::Int(9), Rid::new(9, i)).unwrap();
    }

    assert!(index.remove(&Key::Int(9), Rid::new(9, 2)).unwrap());

    let expected: Vec<Rid> = [4, 3, 1, 0].iter().map(|&i| Rid::new(9, i)).collect();
    assert_eq!(rids_for(&index, 9), expected);
}

#[test]
fn delete_restores_pre_insert_state_for_duplicates() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("restore.ridx")).unwrap();

    index.insert(&Key::Int(5), Rid::new(5, 1)).unwrap();
    index.insert(&Key::Int(5), Rid::new(5, 2)).unwrap();
    let before = rids_for(&index, 5);

    index.insert(&Key::Int(5), Rid::new(5, 3)).unwrap();
    assert!(index.remove(&Key::Int(5), Rid::new(5, 3)).unwrap());

    assert_eq!(rids_for(&index, 5), before);
    index.verify().unwrap();
}

#[test]
fn missing_rid_in_chain_is_a_miss() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("miss.ridx")).unwrap();

    index.insert(&Key::Int(3), Rid::new(1, 1)).unwrap();
    index.insert(&Key::Int(3), Rid::new(1, 2)).unwrap();

    assert!(!index.remove(&Key::Int(3), Rid::new(1, 9)).unwrap());
    assert_eq!(rids_for(&index, 3), vec![Rid::new(1, 2), Rid::new(1, 1)]);
}

#[test]
fn draining_a_chain_removes_the_key() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("drain.ridx")).unwrap();

    for i in 0..4u32 {
        index.insert(&Key::Int(6), Rid::new(6, i)).unwrap();
    }
    for i in 0..4u32 {
        assert!(index.remove(&Key::Int(6), Rid::new(6, i)).unwrap());
    }

    assert!(rids_for(&index, 6).is_empty());
    assert!(!index.remove(&Key::Int(6), Rid::new(6, 0)).unwrap());
    index.verify().unwrap();
}

#[test]
fn heavy_duplication_recycles_overflow_pages() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("recycle.ridx")).unwrap();

    // Fill several overflow pages, drain them, and fill again: the
    // second round must reuse the recycled pages instead of growing
    // the file.
    for i in 0..1000u32 {
        index.insert(&Key::Int(1), Rid::new(1, i)).unwrap();
    }
    let grown = index.page_count();

    for i in 0..1000u32 {
        assert!(index.remove(&Key::Int(1), Rid::new(1, i)).unwrap());
    }

    for i in 0..1000u32 {
        index.insert(&Key::Int(2), Rid::new(2, i)).unwrap();
    }

    assert_eq!(index.page_count(), grown);
    index.verify().unwrap();
}

#[test]
fn duplicate_chains_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.ridx");

    {
        let mut index = Index::create(&path).unwrap();
        for i in 0..10u32 {
            index.insert(&Key::Int(42), Rid::new(4, i)).unwrap();
        }
    }

    let index = Index::open(&path).unwrap();
    let expected: Vec<Rid> = (0..10u32).rev().map(|i| Rid::new(4, i)).collect();
    assert_eq!(rids_for(&index, 42), expected);
}
