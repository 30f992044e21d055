//! # Leaf Page View
//!
//! Typed access to Leaf pages. Each slot holds one key with one entry:
//!
//! ```text
//! LeafRecord:
//! +------------------+--------------------+----------+
//! | key (encoded)    | rid (8 bytes)      | dup (1B) |
//! +------------------+--------------------+----------+
//! ```
//!
//! The dup flag selects the meaning of the RID: 0 means it locates the
//! record directly (data RID), 1 means it is the head of a duplicate
//! chain in DupOverflow pages. Duplicate keys therefore collapse into a
//! single slot and the RID never participates in ordering.
//!
//! Slots are kept sorted by key. `find_key` is a binary search over the
//! directory; keys are decoded for comparison because the wire format is
//! not memcmp-ordered.
//!
//! The trailer's prev/next fields link leaves into a doubly linked chain
//! for range scans.

use eyre::{ensure, Result};
use zerocopy::IntoBytes;

use crate::encoding::{Key, Rid};
use crate::encoding::key::RID_SIZE;
use crate::storage::{Page, PageBuf, PageKind, PageMut};

/// RID plus dup flag after the key bytes.
pub const LEAF_RECORD_SUFFIX: usize = RID_SIZE + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry {
    pub rid: Rid,
    pub dup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

pub fn encode_leaf_record(key: &Key, rid: Rid, dup: bool) -> Vec<u8> {
    let mut rec = Vec::with_capacity(key.encoded_len() + LEAF_RECORD_SUFFIX);
    key.encode_into(&mut rec);
    rec.extend_from_slice(rid.as_bytes());
    rec.push(dup as u8);
    rec
}

/// Splits a raw leaf record into its key span and entry.
pub fn split_leaf_record(rec: &[u8]) -> Result<(&[u8], LeafEntry)> {
    ensure!(
        rec.len() >= 4 + LEAF_RECORD_SUFFIX,
        "leaf record too short: {} bytes",
        rec.len()
    );
    let key_end = rec.len() - LEAF_RECORD_SUFFIX;
    let rid = Rid::read_from(&rec[key_end..key_end + RID_SIZE])?;
    let dup = match rec[rec.len() - 1] {
        0 => false,
        1 => true,
        b => eyre::bail!("invalid dup flag in leaf record: {:02x}", b),
    };
    Ok((&rec[..key_end], LeafEntry { rid, dup }))
}

#[derive(Debug)]
pub struct LeafView<'a> {
    page: Page<'a>,
}

pub struct LeafViewMut<'a> {
    page: PageMut<'a>,
}

impl<'a> LeafView<'a> {
    pub fn from_page(data: &'a PageBuf) -> Result<Self> {
        let page = Page::new(data);
        ensure!(
            page.kind() == PageKind::Leaf,
            "expected Leaf page, got {:?}",
            page.kind()
        );
        Ok(Self { page })
    }

    pub fn slot_count(&self) -> usize {
        self.page.slot_count() as usize
    }

    pub fn free_space(&self) -> usize {
        self.page.free_space()
    }

    pub fn used_space(&self) -> usize {
        self.page.used_space()
    }

    pub fn prev_page(&self) -> u32 {
        self.page.prev_page()
    }

    pub fn next_page(&self) -> u32 {
        self.page.next_page()
    }

    pub fn record(&self, index: usize) -> Result<&'a [u8]> {
        self.page.slot_bytes(index)
    }

    pub fn key_bytes(&self, index: usize) -> Result<&'a [u8]> {
        let rec = self.record(index)?;
        let (key, _) = split_leaf_record(rec)?;
        Ok(key)
    }

    pub fn entry(&self, index: usize) -> Result<LeafEntry> {
        let rec = self.record(index)?;
        let (_, entry) = split_leaf_record(rec)?;
        Ok(entry)
    }

    /// Binary search over the slot directory by key alone.
    pub fn find_key(&self, key: &Key) -> Result<SearchResult> {
        let mut lo = 0;
        let mut hi = self.slot_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match key.cmp_encoded(self.key_bytes(mid)?)? {
                std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        Ok(SearchResult::NotFound(lo))
    }
}

impl<'a> LeafViewMut<'a> {
    pub fn from_page(data: &'a mut PageBuf) -> Result<Self> {
        let page = PageMut::new(data);
        ensure!(
            page.kind() == PageKind::Leaf,
            "expected Leaf page, got {:?}",
            page.kind()
        );
        Ok(Self { page })
    }

    pub fn init(data: &'a mut PageBuf) -> Self {
        let mut page = PageMut::new(data);
        page.init(PageKind::Leaf);
        Self { page }
    }

    pub fn slot_count(&self) -> usize {
        self.page.slot_count() as usize
    }

    pub fn free_space(&self) -> usize {
        self.page.free_space()
    }

    pub fn used_space(&self) -> usize {
        self.page.used_space()
    }

    pub fn prev_page(&self) -> u32 {
        self.page.prev_page()
    }

    pub fn set_prev_page(&mut self, page_no: u32) {
        self.page.set_prev_page(page_no);
    }

    pub fn next_page(&self) -> u32 {
        self.page.next_page()
    }

    pub fn set_next_page(&mut self, page_no: u32) {
        self.page.set_next_page(page_no);
    }

    pub fn record(&self, index: usize) -> Result<&[u8]> {
        self.page.slot_bytes(index)
    }

    pub fn key_bytes(&self, index: usize) -> Result<&[u8]> {
        let rec = self.page.slot_bytes(index)?;
        let (key, _) = split_leaf_record(rec)?;
        Ok(key)
    }

    pub fn entry(&self, index: usize) -> Result<LeafEntry> {
        let rec = self.page.slot_bytes(index)?;
        let (_, entry) = split_leaf_record(rec)?;
        Ok(entry)
    }

    pub fn find_key(&self, key: &Key) -> Result<SearchResult> {
        let mut lo = 0;
        let mut hi = self.slot_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match key.cmp_encoded(self.key_bytes(mid)?)? {
                std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        Ok(SearchResult::NotFound(lo))
    }

    pub fn insert_record(&mut self, pos: usize, key: &Key, rid: Rid, dup: bool) -> Result<()> {
        let rec = encode_leaf_record(key, rid, dup);
        self.page.insert_slot_at(pos, &rec)
    }

    /// Inserts an already-encoded record, used when redistributing whole
    /// slots during splits and merges.
    pub fn insert_raw(&mut self, pos: usize, rec: &[u8]) -> Result<()> {
        self.page.insert_slot_at(pos, rec)
    }

    pub fn remove_record(&mut self, pos: usize) -> Result<()> {
        self.page.remove_slot_at(pos)
    }

    /// Rewrites a slot's RID and dup flag in place, leaving the key
    /// untouched. Record length never changes.
    pub fn set_entry(&mut self, index: usize, rid: Rid, dup: bool) -> Result<()> {
        let rec = self.page.slot_bytes_mut(index)?;
        ensure!(
            rec.len() >= 4 + LEAF_RECORD_SUFFIX,
            "leaf record too short: {} bytes",
            rec.len()
        );
        let key_end = rec.len() - LEAF_RECORD_SUFFIX;
        rec[key_end..key_end + RID_SIZE].copy_from_slice(rid.as_bytes());
        let last = rec.len() - 1;
        rec[last] = dup as u8;
        Ok(())
    }

    pub fn as_view(&self) -> LeafView<'_> {
        LeafView {
            page: self.page.as_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;

    fn make_page() -> PageBuf {
        [0u8; PAGE_SIZE]
    }

    #[test]
    fn record_round_trips() {
        let rec = encode_leaf_record(&Key::Int(42), Rid::new(3, 9), false);
        assert_eq!(rec.len(), 13);

        let (key, entry) = split_leaf_record(&rec).unwrap();
        assert_eq!(Key::decode(crate::encoding::KeyType::Int, key).unwrap(), Key::Int(42));
        assert_eq!(entry.rid, Rid::new(3, 9));
        assert!(!entry.dup);
    }

    #[test]
    fn record_rejects_bad_dup_flag() {
        let mut rec = encode_leaf_record(&Key::Int(1), Rid::new(0, 0), true);
        *rec.last_mut().unwrap() = 9;
        assert!(split_leaf_record(&rec).is_err());
    }

    #[test]
    fn from_page_validates_kind() {
        let mut buf = make_page();
        PageMut::new(&mut buf).init(PageKind::Branch);

        let result = LeafView::from_page(&buf);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("expected Leaf"));
    }

    #[test]
    fn insert_keeps_records_addressable() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        leaf.insert_record(0, &Key::Int(20), Rid::new(1, 1), false).unwrap();
        leaf.insert_record(0, &Key::Int(10), Rid::new(1, 0), false).unwrap();
        leaf.insert_record(2, &Key::Int(30), Rid::new(1, 2), false).unwrap();

        assert_eq!(leaf.slot_count(), 3);
        assert_eq!(leaf.entry(0).unwrap().rid, Rid::new(1, 0));
        assert_eq!(leaf.entry(1).unwrap().rid, Rid::new(1, 1));
        assert_eq!(leaf.entry(2).unwrap().rid, Rid::new(1, 2));
    }

    #[test]
    fn find_key_binary_search() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        for (i, k) in [10, 20, 30, 40].iter().enumerate() {
            leaf.insert_record(i, &Key::Int(*k), Rid::new(0, i as u32), false)
                .unwrap();
        }

        assert_eq!(leaf.find_key(&Key::Int(10)).unwrap(), SearchResult::Found(0));
        assert_eq!(leaf.find_key(&Key::Int(40)).unwrap(), SearchResult::Found(3));
        assert_eq!(leaf.find_key(&Key::Int(5)).unwrap(), SearchResult::NotFound(0));
        assert_eq!(leaf.find_key(&Key::Int(25)).unwrap(), SearchResult::NotFound(2));
        assert_eq!(leaf.find_key(&Key::Int(99)).unwrap(), SearchResult::NotFound(4));
    }

    #[test]
    fn find_key_negative_ints_sort_numerically() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        leaf.insert_record(0, &Key::Int(-5), Rid::new(0, 0), false).unwrap();
        leaf.insert_record(1, &Key::Int(3), Rid::new(0, 1), false).unwrap();

        assert_eq!(leaf.find_key(&Key::Int(-5)).unwrap(), SearchResult::Found(0));
        assert_eq!(leaf.find_key(&Key::Int(0)).unwrap(), SearchResult::NotFound(1));
    }

    #[test]
    fn find_key_text() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        for (i, k) in ["bravo", "delta", "tango"].iter().enumerate() {
            leaf.insert_record(i, &Key::text(k), Rid::new(0, i as u32), false)
                .unwrap();
        }

        assert_eq!(
            leaf.find_key(&Key::text("delta")).unwrap(),
            SearchResult::Found(1)
        );
        assert_eq!(
            leaf.find_key(&Key::text("alpha")).unwrap(),
            SearchResult::NotFound(0)
        );
        assert_eq!(
            leaf.find_key(&Key::text("zulu")).unwrap(),
            SearchResult::NotFound(3)
        );
    }

    #[test]
    fn set_entry_flips_dup_flag_in_place() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        leaf.insert_record(0, &Key::Int(7), Rid::new(2, 5), false).unwrap();
        leaf.set_entry(0, Rid::new(9, 1), true).unwrap();

        let entry = leaf.entry(0).unwrap();
        assert_eq!(entry.rid, Rid::new(9, 1));
        assert!(entry.dup);
        assert_eq!(
            leaf.key_bytes(0).unwrap(),
            Key::Int(7).encode().as_slice()
        );
    }

    #[test]
    fn chain_links_live_in_the_trailer() {
        let mut buf = make_page();
        let mut leaf = LeafViewMut::init(&mut buf);

        leaf.set_prev_page(11);
        leaf.set_next_page(12);

        assert_eq!(leaf.prev_page(), 11);
        assert_eq!(leaf.next_page(), 12);
    }
}
