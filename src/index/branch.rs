//! # Branch Page View
//!
//! Typed access to Branch (non-leaf) pages. A branch page stores one
//! leading child pointer in the trailer's prev field plus one record per
//! slot:
//!
//! ```text
//! BranchRecord:
//! +------------------+-----------------------+
//! | separator key    | right child (4B, LE)  |
//! +------------------+-----------------------+
//! ```
//!
//! N separators imply N+1 children. Child index c maps to the leftmost
//! pointer when c is 0 and to slot c-1's right child otherwise, so
//! separator slot j always sits between child j and child j+1.
//!
//! ## Routing
//!
//! A separator routes equal keys right: `find_child` returns the first
//! child whose subtree may contain the key, which is the number of
//! separators less than or equal to it. All routing is binary search
//! over decoded keys.

use eyre::{ensure, Result};

use crate::encoding::Key;
use crate::storage::{Page, PageBuf, PageKind, PageMut};

/// Right-child page number after the key bytes.
pub const BRANCH_RECORD_SUFFIX: usize = 4;

pub fn encode_branch_record(key_bytes: &[u8], right_child: u32) -> Vec<u8> {
    let mut rec = Vec::with_capacity(key_bytes.len() + BRANCH_RECORD_SUFFIX);
    rec.extend_from_slice(key_bytes);
    rec.extend_from_slice(&right_child.to_le_bytes());
    rec
}

/// Splits a raw branch record into its key span and right child.
pub fn split_branch_record(rec: &[u8]) -> Result<(&[u8], u32)> {
    ensure!(
        rec.len() >= 4 + BRANCH_RECORD_SUFFIX,
        "branch record too short: {} bytes",
        rec.len()
    );
    let key_end = rec.len() - BRANCH_RECORD_SUFFIX;
    let child = u32::from_le_bytes(rec[key_end..].try_into().unwrap());
    Ok((&rec[..key_end], child))
}

#[derive(Debug)]
pub struct BranchView<'a> {
    page: Page<'a>,
}

pub struct BranchViewMut<'a> {
    page: PageMut<'a>,
}

impl<'a> BranchView<'a> {
    pub fn from_page(data: &'a PageBuf) -> Result<Self> {
        let page = Page::new(data);
        ensure!(
            page.kind() == PageKind::Branch,
            "expected Branch page, got {:?}",
            page.kind()
        );
        Ok(Self { page })
    }

    pub fn separator_count(&self) -> usize {
        self.page.slot_count() as usize
    }

    pub fn free_space(&self) -> usize {
        self.page.free_space()
    }

    pub fn used_space(&self) -> usize {
        self.page.used_space()
    }

    pub fn leftmost_child(&self) -> u32 {
        self.page.prev_page()
    }

    pub fn record(&self, index: usize) -> Result<&'a [u8]> {
        self.page.slot_bytes(index)
    }

    pub fn key_bytes(&self, index: usize) -> Result<&'a [u8]> {
        let rec = self.record(index)?;
        let (key, _) = split_branch_record(rec)?;
        Ok(key)
    }

    pub fn right_child(&self, index: usize) -> Result<u32> {
        let rec = self.record(index)?;
        let (_, child) = split_branch_record(rec)?;
        Ok(child)
    }

    /// Page number of child index c, for c in 0..=separator_count.
    pub fn child_at(&self, index: usize) -> Result<u32> {
        if index == 0 {
            Ok(self.leftmost_child())
        } else {
            self.right_child(index - 1)
        }
    }

    /// Returns (child page, child index) for the subtree that may hold
    /// the key. Equal keys route right.
    pub fn find_child(&self, key: &Key) -> Result<(u32, usize)> {
        let index = self.child_index(key)?;
        Ok((self.child_at(index)?, index))
    }

    /// Number of separators less than or equal to the key, which is the
    /// index of the child to descend into.
    pub fn child_index(&self, key: &Key) -> Result<usize> {
        let mut lo = 0;
        let mut hi = self.separator_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match key.cmp_encoded(self.key_bytes(mid)?)? {
                std::cmp::Ordering::Less => hi = mid,
                _ => lo = mid + 1,
            }
        }
        Ok(lo)
    }
}

impl<'a> BranchViewMut<'a> {
    pub fn from_page(data: &'a mut PageBuf) -> Result<Self> {
        let page = PageMut::new(data);
        ensure!(
            page.kind() == PageKind::Branch,
            "expected Branch page, got {:?}",
            page.kind()
        );
        Ok(Self { page })
    }

    pub fn init(data: &'a mut PageBuf, leftmost_child: u32) -> Self {
        let mut page = PageMut::new(data);
        page.init(PageKind::Branch);
        page.set_prev_page(leftmost_child);
        Self { page }
    }

    pub fn separator_count(&self) -> usize {
        self.page.slot_count() as usize
    }

    pub fn free_space(&self) -> usize {
        self.page.free_space()
    }

    pub fn used_space(&self) -> usize {
        self.page.used_space()
    }

    pub fn leftmost_child(&self) -> u32 {
        self.page.prev_page()
    }

    pub fn set_leftmost_child(&mut self, page_no: u32) {
        self.page.set_prev_page(page_no);
    }

    pub fn record(&self, index: usize) -> Result<&[u8]> {
        self.page.slot_bytes(index)
    }

    pub fn key_bytes(&self, index: usize) -> Result<&[u8]> {
        let rec = self.page.slot_bytes(index)?;
        let (key, _) = split_branch_record(rec)?;
        Ok(key)
    }

    pub fn right_child(&self, index: usize) -> Result<u32> {
        let rec = self.page.slot_bytes(index)?;
        let (_, child) = split_branch_record(rec)?;
        Ok(child)
    }

    pub fn child_at(&self, index: usize) -> Result<u32> {
        if index == 0 {
            Ok(self.leftmost_child())
        } else {
            self.right_child(index - 1)
        }
    }

    /// Inserts a separator with its right child at slot position `pos`.
    /// The caller derives `pos` from the child index the split happened
    /// under, which keeps all earlier children reachable unchanged.
    pub fn insert_separator(&mut self, pos: usize, key_bytes: &[u8], right_child: u32) -> Result<()> {
        let rec = encode_branch_record(key_bytes, right_child);
        self.page.insert_slot_at(pos, &rec)
    }

    pub fn insert_raw(&mut self, pos: usize, rec: &[u8]) -> Result<()> {
        self.page.insert_slot_at(pos, rec)
    }

    pub fn remove_separator(&mut self, pos: usize) -> Result<()> {
        self.page.remove_slot_at(pos)
    }

    pub fn as_view(&self) -> BranchView<'_> {
        BranchView {
            page: self.page.as_page(),
        }
    }
}
