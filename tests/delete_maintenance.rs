//! # Delete and Structure Maintenance Tests
//!
//! Deletes must keep the tree navigable: pages merge or rebalance when
//! they empty out, the root collapses back onto page 0, and every
//! touched page keeps its trailer invariants.

use ridx::{Index, Key, KeyType, Rid, ScanRange};
use tempfile::tempdir;

fn keys_of(index: &Index) -> Vec<i32> {
    index
        .scan(KeyType::Int, ScanRange::all())
        .unwrap()
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|(k, _)| match k {
            Key::Int(v) => v,
            other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[test]
fn delete_right_after_insert_restores_scan_output() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("restore.ridx")).unwrap();

    for k in [10, 20, 30] {
        index.insert(&Key::Int(k), Rid::new(0, k as u32)).unwrap();
    }
    let before = keys_of(&index);

    index.insert(&Key::Int(25), Rid::new(0, 25)).unwrap();
    assert!(index.remove(&Key::Int(25), Rid::new(0, 25)).unwrap());

    assert_eq!(keys_of(&index), before);
    index.verify().unwrap();
}

#[test]
fn delete_missing_key_is_not_an_error() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("miss.ridx")).unwrap();

    index.insert(&Key::Int(1), Rid::new(1, 1)).unwrap();

    assert!(!index.remove(&Key::Int(2), Rid::new(1, 1)).unwrap());
    assert!(!index.remove(&Key::Int(1), Rid::new(2, 2)).unwrap());
    assert_eq!(keys_of(&index), vec![1]);
}

#[test]
fn drain_a_multi_page_tree_to_empty() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("drain.ridx")).unwrap();

    for i in 0..800 {
        index.insert(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
    }
    assert!(index.page_count() > 1);

    for i in 0..800 {
        assert!(index.remove(&Key::Int(i), Rid::new(1, i as u32)).unwrap());
    }

    assert!(keys_of(&index).is_empty());
    index.verify().unwrap();

    // The tree still accepts inserts afterwards.
    index.insert(&Key::Int(5), Rid::new(5, 5)).unwrap();
    assert_eq!(keys_of(&index), vec![5]);
}

#[test]
fn reverse_order_drain() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("reverse.ridx")).unwrap();

    for i in 0..800 {
        index.insert(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
    }
    for i in (0..800).rev() {
        assert!(index.remove(&Key::Int(i), Rid::new(1, i as u32)).unwrap());
    }

    assert!(keys_of(&index).is_empty());
    index.verify().unwrap();
}

#[test]
fn deleting_the_middle_keeps_the_fringe() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("middle.ridx")).unwrap();

    for i in 0..900 {
        index.insert(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
    }
    for i in 300..600 {
        assert!(index.remove(&Key::Int(i), Rid::new(1, i as u32)).unwrap());
    }

    let expected: Vec<i32> = (0..300).chain(600..900).collect();
    assert_eq!(keys_of(&index), expected);
    index.verify().unwrap();
}

#[test]
fn freed_pages_are_reused_by_later_inserts() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("reuse.ridx")).unwrap();

    for i in 0..800 {
        index.insert(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
    }
    for i in 0..800 {
        index.remove(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
    }
    let drained = index.page_count();

    for i in 0..800 {
        index.insert(&Key::Int(i), Rid::new(2, i as u32)).unwrap();
    }

    assert_eq!(index.page_count(), drained);
    index.verify().unwrap();
}

#[test]
fn alternating_insert_delete_churn() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("churn.ridx")).unwrap();

    for round in 0..5 {
        for i in 0..300 {
            index
                .insert(&Key::Int(i), Rid::new(round, i as u32))
                .unwrap();
        }
        for i in 0..300 {
            assert!(index
                .remove(&Key::Int(i), Rid::new(round, i as u32))
                .unwrap());
        }
        index.verify().unwrap();
    }

    assert!(keys_of(&index).is_empty());
}

#[test]
fn wide_text_keys_merge_through_branch_levels() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(dir.path().join("widetext.ridx")).unwrap();

    // ~420-byte records build a three-level tree out of a few hundred
    // keys; draining it walks merges through the branch levels too.
    for i in 0..300 {
        index
            .insert(&Key::text(format!("{:0400}", i)), Rid::new(1, i))
            .unwrap();
    }
    for i in 0..300 {
        assert!(index
            .remove(&Key::text(format!("{:0400}", i)), Rid::new(1, i))
            .unwrap());
    }

    let leftover = index
        .scan(KeyType::Text, ScanRange::all())
        .unwrap()
        .collect_all()
        .unwrap();
    assert!(leftover.is_empty());
    index.verify().unwrap();
}

#[test]
fn state_survives_reopen_after_heavy_deletes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survivor.ridx");

    {
        let mut index = Index::create(&path).unwrap();
        for i in 0..600 {
            index.insert(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
        }
        for i in 0..550 {
            index.remove(&Key::Int(i), Rid::new(1, i as u32)).unwrap();
        }
    }

    let index = Index::open(&path).unwrap();
    let expected: Vec<i32> = (550..600).collect();
    assert_eq!(keys_of(&index), expected);
    index.verify().unwrap();
}
