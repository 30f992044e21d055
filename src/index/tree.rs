//! # Tree Engine
//!
//! Descent, insert, and delete over the paged B+tree. All entries live
//! in leaf pages; branch pages route by separator. Page 0 is permanently
//! the root, so growing and shrinking the tree rewrites page 0 in place
//! instead of moving a root pointer.
//!
//! ## Descent
//!
//! Descent is iterative with an explicit path stack of (page, child
//! index) pairs, so split propagation and rebalancing can mutate
//! ancestors without re-reading them mid-descent. The stack lives in a
//! `SmallVec` sized for 16 levels, far deeper than a 4KB-page tree gets
//! in practice.
//!
//! ## Insert
//!
//! A key already present delegates to the duplicate chain: the first
//! duplication converts the slot's direct RID into a 2-node chain, later
//! ones push a new head. A missing key is placed at its sorted position;
//! a full leaf splits around a size-balanced midpoint, splices the new
//! sibling into the leaf chain, and publishes the right sibling's first
//! key as the separator. Branch splits promote (move) the median
//! separator. Split scratch space comes from a per-operation `bumpalo`
//! arena: every record is copied in once, redistributed, and the whole
//! arena is dropped at function end.
//!
//! ## Delete
//!
//! Deleting the last RID of a key removes the slot. A non-root page that
//! falls below the minimum occupancy threshold merges with the adjacent
//! sibling under the same parent when the combined payload fits, or
//! moves one boundary entry from the fuller sibling and rewrites the
//! parent separator. Branch merges pull the intervening parent separator
//! down between the halves. Underflow propagates upward; a root branch
//! left with a single child copies that child onto page 0.
//!
//! The one-entry rebalance rewrites a parent separator, which can change
//! its length. When the parent lacks room for the longer separator the
//! move is skipped and the page simply stays underfull; routing
//! correctness never depends on occupancy.

use bumpalo::collections::CollectIn;
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use eyre::{bail, ensure, Result};
use smallvec::SmallVec;
use tracing::debug;

use super::branch::{
    encode_branch_record, split_branch_record, BranchView, BranchViewMut, BRANCH_RECORD_SUFFIX,
};
use super::leaf::{
    encode_leaf_record, split_leaf_record, LeafView, LeafViewMut, SearchResult, LEAF_RECORD_SUFFIX,
};
use super::space::{read_node, SpaceManager};
use super::{MAX_TREE_DEPTH, MIN_OCCUPANCY_DIVISOR};
use crate::encoding::{Key, Rid};
use crate::storage::{
    Page, PageBuf, PageIo, PageKind, NO_PAGE, PAGE_CAPACITY, PAGE_SIZE, SLOT_ENTRY_SIZE,
};

pub const ROOT_PAGE: u32 = 0;

type PathStack = SmallVec<[(u32, usize); MAX_TREE_DEPTH]>;

/// One tree operation's view of the index: the pager it reads and writes
/// through and the space manager it allocates from. Constructed per call
/// by the owning `Index`.
pub struct Tree<'a, P: PageIo> {
    pager: &'a mut P,
    space: &'a mut SpaceManager,
}

impl<'a, P: PageIo> Tree<'a, P> {
    pub fn new(pager: &'a mut P, space: &'a mut SpaceManager) -> Self {
        Self { pager, space }
    }

    /// Walks from the root to the leaf that covers `key`, recording the
    /// (page, child index) path taken.
    fn descend(&self, key: &Key) -> Result<(u32, PathStack)> {
        let mut path: PathStack = SmallVec::new();
        let mut current = ROOT_PAGE;
        let mut buf = [0u8; PAGE_SIZE];

        loop {
            self.pager.read_page(current, &mut buf)?;
            match Page::new(&buf).kind() {
                PageKind::Leaf => return Ok((current, path)),
                PageKind::Branch => {
                    let branch = BranchView::from_page(&buf)?;
                    let (child, child_idx) = branch.find_child(key)?;
                    path.push((current, child_idx));
                    current = child;
                }
                kind => bail!(
                    "unexpected {:?} page during descent at page {}",
                    kind,
                    current
                ),
            }
        }
    }

    pub fn insert(&mut self, key: &Key, rid: Rid) -> Result<()> {
        let rec_len = key.encoded_len() + LEAF_RECORD_SUFFIX;
        ensure!(
            rec_len + SLOT_ENTRY_SIZE <= PAGE_CAPACITY,
            "key too large for one page: {} encoded bytes",
            key.encoded_len()
        );

        let (leaf_no, path) = self.descend(key)?;
        let mut buf = [0u8; PAGE_SIZE];
        self.pager.read_page(leaf_no, &mut buf)?;

        let leaf = LeafView::from_page(&buf)?;
        match leaf.find_key(key)? {
            SearchResult::Found(slot) => {
                let entry = leaf.entry(slot)?;
                let new_head = if entry.dup {
                    self.space.insert_dup_record(self.pager, entry.rid, rid)?
                } else {
                    // First duplication: chain the resident RID, then the
                    // new one on top of it.
                    let tail = self
                        .space
                        .insert_dup_record(self.pager, Rid::end(), entry.rid)?;
                    self.space.insert_dup_record(self.pager, tail, rid)?
                };
                let mut leaf = LeafViewMut::from_page(&mut buf)?;
                leaf.set_entry(slot, new_head, true)?;
                self.pager.write_page(leaf_no, &buf)?;
                Ok(())
            }
            SearchResult::NotFound(pos) => {
                {
                    let mut leaf = LeafViewMut::from_page(&mut buf)?;
                    if leaf.free_space() >= rec_len + SLOT_ENTRY_SIZE {
                        leaf.insert_record(pos, key, rid, false)?;
                        self.pager.write_page(leaf_no, &buf)?;
                        return Ok(());
                    }
                }
                if let Some((separator, new_page)) = self.split_leaf(leaf_no, &buf, pos, key, rid)?
                {
                    self.propagate_split(path, separator, new_page)?;
                }
                Ok(())
            }
        }
    }

    /// Splits a full leaf around a size-balanced midpoint. The root leaf
    /// is rewritten in place as a 2-child branch; any other leaf gains a
    /// right sibling and returns the separator to publish.
    fn split_leaf(
        &mut self,
        page_no: u32,
        buf: &PageBuf,
        insert_pos: usize,
        key: &Key,
        rid: Rid,
    ) -> Result<Option<(Vec<u8>, u32)>> {
        let arena = Bump::new();
        let leaf = LeafView::from_page(buf)?;

        let mut records: BumpVec<&[u8]> = BumpVec::new_in(&arena);
        for i in 0..leaf.slot_count() {
            records.push(arena.alloc_slice_copy(leaf.record(i)?));
        }
        let new_rec = encode_leaf_record(key, rid, false);
        records.insert(insert_pos, arena.alloc_slice_copy(&new_rec));

        let mid = split_point(&arena, &records);
        let (separator, _) = split_leaf_record(records[mid])?;

        let old_prev = leaf.prev_page();
        let old_next = leaf.next_page();

        if page_no == ROOT_PAGE {
            // The root stays at page 0: both halves move to fresh pages
            // and page 0 becomes a 2-child branch over them.
            let left_no = self.space.acquire_empty(self.pager)?;
            let right_no = self.space.acquire_empty(self.pager)?;

            let mut left_buf = [0u8; PAGE_SIZE];
            let mut left = LeafViewMut::init(&mut left_buf);
            for (i, rec) in records[..mid].iter().enumerate() {
                left.insert_raw(i, rec)?;
            }
            left.set_next_page(right_no);
            self.pager.write_page(left_no, &left_buf)?;

            let mut right_buf = [0u8; PAGE_SIZE];
            let mut right = LeafViewMut::init(&mut right_buf);
            for (i, rec) in records[mid..].iter().enumerate() {
                right.insert_raw(i, rec)?;
            }
            right.set_prev_page(left_no);
            self.pager.write_page(right_no, &right_buf)?;

            let mut root_buf = [0u8; PAGE_SIZE];
            let mut root = BranchViewMut::init(&mut root_buf, left_no);
            root.insert_separator(0, separator, right_no)?;
            self.pager.write_page(ROOT_PAGE, &root_buf)?;

            debug!(left = left_no, right = right_no, "root leaf split");
            Ok(None)
        } else {
            let new_no = self.space.acquire_empty(self.pager)?;

            let mut right_buf = [0u8; PAGE_SIZE];
            let mut right = LeafViewMut::init(&mut right_buf);
            for (i, rec) in records[mid..].iter().enumerate() {
                right.insert_raw(i, rec)?;
            }
            right.set_prev_page(page_no);
            right.set_next_page(old_next);
            self.pager.write_page(new_no, &right_buf)?;

            let mut left_buf = [0u8; PAGE_SIZE];
            let mut left = LeafViewMut::init(&mut left_buf);
            for (i, rec) in records[..mid].iter().enumerate() {
                left.insert_raw(i, rec)?;
            }
            left.set_prev_page(old_prev);
            left.set_next_page(new_no);
            self.pager.write_page(page_no, &left_buf)?;

            if old_next != NO_PAGE {
                let mut next_buf = [0u8; PAGE_SIZE];
                self.pager.read_page(old_next, &mut next_buf)?;
                let mut next = LeafViewMut::from_page(&mut next_buf)?;
                next.set_prev_page(new_no);
                self.pager.write_page(old_next, &next_buf)?;
            }

            debug!(page = page_no, sibling = new_no, "leaf split");
            Ok(Some((separator.to_vec(), new_no)))
        }
    }

    /// Carries a separator up the recorded path, splitting full branch
    /// pages along the way. The new separator lands at the slot position
    /// matching the child index it rose from, which keeps every earlier
    /// child reachable unchanged.
    fn propagate_split(
        &mut self,
        mut path: PathStack,
        separator: Vec<u8>,
        right_page: u32,
    ) -> Result<()> {
        let mut separator = separator;
        let mut right_page = right_page;

        while let Some((parent_no, child_idx)) = path.pop() {
            let mut buf = [0u8; PAGE_SIZE];
            self.pager.read_page(parent_no, &mut buf)?;

            let rec_len = separator.len() + BRANCH_RECORD_SUFFIX;
            {
                let mut branch = BranchViewMut::from_page(&mut buf)?;
                if branch.free_space() >= rec_len + SLOT_ENTRY_SIZE {
                    branch.insert_separator(child_idx, &separator, right_page)?;
                    self.pager.write_page(parent_no, &buf)?;
                    return Ok(());
                }
            }

            if parent_no == ROOT_PAGE {
                return self.split_branch_root(&buf, child_idx, &separator, right_page);
            }

            let (promoted, new_page) =
                self.split_branch(parent_no, &buf, child_idx, &separator, right_page)?;
            separator = promoted;
            right_page = new_page;
        }

        bail!("split propagation escaped the root")
    }

    /// Splits a full non-root branch, promoting the median separator.
    fn split_branch(
        &mut self,
        page_no: u32,
        buf: &PageBuf,
        insert_idx: usize,
        separator: &[u8],
        right_page: u32,
    ) -> Result<(Vec<u8>, u32)> {
        let arena = Bump::new();
        let branch = BranchView::from_page(buf)?;

        let mut records: BumpVec<&[u8]> = BumpVec::new_in(&arena);
        for i in 0..branch.separator_count() {
            records.push(arena.alloc_slice_copy(branch.record(i)?));
        }
        let new_rec = encode_branch_record(separator, right_page);
        records.insert(insert_idx, arena.alloc_slice_copy(&new_rec));

        let mid = split_point(&arena, &records);
        let (promoted_key, promoted_child) = split_branch_record(records[mid])?;
        let promoted = promoted_key.to_vec();

        let new_no = self.space.acquire_empty(self.pager)?;

        let mut right_buf = [0u8; PAGE_SIZE];
        let mut right = BranchViewMut::init(&mut right_buf, promoted_child);
        for (i, rec) in records[mid + 1..].iter().enumerate() {
            right.insert_raw(i, rec)?;
        }
        self.pager.write_page(new_no, &right_buf)?;

        let mut left_buf = [0u8; PAGE_SIZE];
        let mut left = BranchViewMut::init(&mut left_buf, branch.leftmost_child());
        for (i, rec) in records[..mid].iter().enumerate() {
            left.insert_raw(i, rec)?;
        }
        self.pager.write_page(page_no, &left_buf)?;

        debug!(page = page_no, sibling = new_no, "branch split");
        Ok((promoted, new_no))
    }

    /// Splits the full root branch in place: both halves move to fresh
    /// pages and page 0 keeps only the promoted median.
    fn split_branch_root(
        &mut self,
        buf: &PageBuf,
        insert_idx: usize,
        separator: &[u8],
        right_page: u32,
    ) -> Result<()> {
        let arena = Bump::new();
        let branch = BranchView::from_page(buf)?;

        let mut records: BumpVec<&[u8]> = BumpVec::new_in(&arena);
        for i in 0..branch.separator_count() {
            records.push(arena.alloc_slice_copy(branch.record(i)?));
        }
        let new_rec = encode_branch_record(separator, right_page);
        records.insert(insert_idx, arena.alloc_slice_copy(&new_rec));

        let mid = split_point(&arena, &records);
        let (promoted_key, promoted_child) = split_branch_record(records[mid])?;

        let left_no = self.space.acquire_empty(self.pager)?;
        let right_no = self.space.acquire_empty(self.pager)?;

        let mut left_buf = [0u8; PAGE_SIZE];
        let mut left = BranchViewMut::init(&mut left_buf, branch.leftmost_child());
        for (i, rec) in records[..mid].iter().enumerate() {
            left.insert_raw(i, rec)?;
        }
        self.pager.write_page(left_no, &left_buf)?;

        let mut right_buf = [0u8; PAGE_SIZE];
        let mut right = BranchViewMut::init(&mut right_buf, promoted_child);
        for (i, rec) in records[mid + 1..].iter().enumerate() {
            right.insert_raw(i, rec)?;
        }
        self.pager.write_page(right_no, &right_buf)?;

        let mut root_buf = [0u8; PAGE_SIZE];
        let mut root = BranchViewMut::init(&mut root_buf, left_no);
        root.insert_separator(0, promoted_key, right_no)?;
        self.pager.write_page(ROOT_PAGE, &root_buf)?;

        debug!(left = left_no, right = right_no, "root branch split");
        Ok(())
    }

    pub fn remove(&mut self, key: &Key, rid: Rid) -> Result<bool> {
        let (leaf_no, path) = self.descend(key)?;
        let mut buf = [0u8; PAGE_SIZE];
        self.pager.read_page(leaf_no, &mut buf)?;

        let leaf = LeafView::from_page(&buf)?;
        let slot = match leaf.find_key(key)? {
            SearchResult::Found(slot) => slot,
            SearchResult::NotFound(_) => return Ok(false),
        };
        let entry = leaf.entry(slot)?;

        if entry.dup {
            let mut head = entry.rid;
            if !self.space.delete_dup_record(self.pager, &mut head, rid)? {
                return Ok(false);
            }

            if head.is_end() {
                // Chain fully drained; the slot goes like a direct one.
                let mut leaf = LeafViewMut::from_page(&mut buf)?;
                leaf.remove_record(slot)?;
                self.pager.write_page(leaf_no, &buf)?;
                self.rebalance_upward(leaf_no, path)?;
                return Ok(true);
            }

            let head_node = read_node(&*self.pager, head)?;
            let mut leaf = LeafViewMut::from_page(&mut buf)?;
            if head_node.next.is_end() {
                // One RID left: demote back to a direct entry.
                self.space.release_node(self.pager, head)?;
                leaf.set_entry(slot, head_node.data, false)?;
            } else {
                leaf.set_entry(slot, head, true)?;
            }
            self.pager.write_page(leaf_no, &buf)?;
            Ok(true)
        } else {
            if entry.rid != rid {
                return Ok(false);
            }
            let mut leaf = LeafViewMut::from_page(&mut buf)?;
            leaf.remove_record(slot)?;
            self.pager.write_page(leaf_no, &buf)?;
            self.rebalance_upward(leaf_no, path)?;
            Ok(true)
        }
    }

    /// Walks back up the descent path fixing occupancy, then gives the
    /// root its collapse check.
    fn rebalance_upward(&mut self, mut page_no: u32, mut path: PathStack) -> Result<()> {
        loop {
            if page_no == ROOT_PAGE {
                return self.collapse_root();
            }

            let mut buf = [0u8; PAGE_SIZE];
            self.pager.read_page(page_no, &mut buf)?;
            if Page::new(&buf).used_space() * MIN_OCCUPANCY_DIVISOR >= PAGE_CAPACITY {
                return Ok(());
            }

            let (parent_no, child_idx) = match path.pop() {
                Some(frame) => frame,
                None => bail!("non-root page {} reached with an empty descent path", page_no),
            };

            self.fix_underflow(parent_no, child_idx)?;
            page_no = parent_no;
        }
    }

    /// Merges or rebalances the underfull child at `child_idx` with an
    /// adjacent sibling under the same parent.
    fn fix_underflow(&mut self, parent_no: u32, child_idx: usize) -> Result<()> {
        let mut parent_buf = [0u8; PAGE_SIZE];
        self.pager.read_page(parent_no, &mut parent_buf)?;
        let parent = BranchView::from_page(&parent_buf)?;

        if parent.separator_count() == 0 {
            // Single child: nothing to merge with here, the collapse
            // check will deal with the parent.
            return Ok(());
        }

        let (left_idx, right_idx) = if child_idx > 0 {
            (child_idx - 1, child_idx)
        } else {
            (0, 1)
        };
        let sep_idx = left_idx;
        let left_no = parent.child_at(left_idx)?;
        let right_no = parent.child_at(right_idx)?;

        let mut left_buf = [0u8; PAGE_SIZE];
        let mut right_buf = [0u8; PAGE_SIZE];
        self.pager.read_page(left_no, &mut left_buf)?;
        self.pager.read_page(right_no, &mut right_buf)?;

        let left_kind = Page::new(&left_buf).kind();
        let right_kind = Page::new(&right_buf).kind();
        ensure!(
            left_kind == right_kind,
            "sibling kind mismatch under page {}: {:?} vs {:?}",
            parent_no,
            left_kind,
            right_kind
        );

        match left_kind {
            PageKind::Leaf => self.fix_leaf_underflow(
                parent_no, parent_buf, sep_idx, left_no, left_buf, right_no, right_buf,
            ),
            PageKind::Branch => self.fix_branch_underflow(
                parent_no, parent_buf, sep_idx, left_no, left_buf, right_no, right_buf,
            ),
            kind => bail!(
                "unexpected {:?} page under branch page {}",
                kind,
                parent_no
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fix_leaf_underflow(
        &mut self,
        parent_no: u32,
        mut parent_buf: PageBuf,
        sep_idx: usize,
        left_no: u32,
        left_buf: PageBuf,
        right_no: u32,
        right_buf: PageBuf,
    ) -> Result<()> {
        let left = LeafView::from_page(&left_buf)?;
        let right = LeafView::from_page(&right_buf)?;

        if left.used_space() + right.used_space() <= PAGE_CAPACITY {
            // Merge right into left: concatenate slots, relink the leaf
            // chain, drop the separator, recycle the emptied page.
            let right_next = right.next_page();

            let mut merged_buf = [0u8; PAGE_SIZE];
            let mut merged = LeafViewMut::init(&mut merged_buf);
            let mut out = 0;
            for i in 0..left.slot_count() {
                merged.insert_raw(out, left.record(i)?)?;
                out += 1;
            }
            for i in 0..right.slot_count() {
                merged.insert_raw(out, right.record(i)?)?;
                out += 1;
            }
            merged.set_prev_page(left.prev_page());
            merged.set_next_page(right_next);
            self.pager.write_page(left_no, &merged_buf)?;

            if right_next != NO_PAGE {
                let mut next_buf = [0u8; PAGE_SIZE];
                self.pager.read_page(right_next, &mut next_buf)?;
                let mut next = LeafViewMut::from_page(&mut next_buf)?;
                next.set_prev_page(left_no);
                self.pager.write_page(right_next, &next_buf)?;
            }

            let mut parent = BranchViewMut::from_page(&mut parent_buf)?;
            parent.remove_separator(sep_idx)?;
            self.pager.write_page(parent_no, &parent_buf)?;

            self.space.release_page(self.pager, right_no)?;
            debug!(left = left_no, right = right_no, "merged leaves");
            return Ok(());
        }

        // Rebalance: move one boundary record out of the fuller sibling
        // and republish the right page's first key as the separator.
        let donor_is_left = left.used_space() >= right.used_space();
        let donor_count = if donor_is_left {
            left.slot_count()
        } else {
            right.slot_count()
        };
        if donor_count < 2 {
            debug!(left = left_no, right = right_no, "rebalance skipped");
            return Ok(());
        }

        let (moved, new_first_key) = if donor_is_left {
            let last = left.slot_count() - 1;
            let moved = left.record(last)?.to_vec();
            let (key, _) = split_leaf_record(&moved)?;
            let key = key.to_vec();
            (moved, key)
        } else {
            (right.record(0)?.to_vec(), right.key_bytes(1)?.to_vec())
        };

        let receiver_free = if donor_is_left {
            right.free_space()
        } else {
            left.free_space()
        };
        let new_sep_rec = encode_branch_record(&new_first_key, right_no);
        let parent = BranchView::from_page(&parent_buf)?;
        let old_sep_len = parent.record(sep_idx)?.len();
        let parent_fits = parent.free_space() + old_sep_len >= new_sep_rec.len();

        if receiver_free < moved.len() + SLOT_ENTRY_SIZE || !parent_fits {
            // Leaving the page underfull is always valid; a failed move
            // must not corrupt routing.
            debug!(left = left_no, right = right_no, "rebalance skipped");
            return Ok(());
        }

        let mut left_buf = left_buf;
        let mut right_buf = right_buf;
        if donor_is_left {
            let mut left = LeafViewMut::from_page(&mut left_buf)?;
            let last = left.slot_count() - 1;
            left.remove_record(last)?;
            let mut right = LeafViewMut::from_page(&mut right_buf)?;
            right.insert_raw(0, &moved)?;
        } else {
            let mut right = LeafViewMut::from_page(&mut right_buf)?;
            right.remove_record(0)?;
            let mut left = LeafViewMut::from_page(&mut left_buf)?;
            left.insert_raw(left.slot_count(), &moved)?;
        }
        self.pager.write_page(left_no, &left_buf)?;
        self.pager.write_page(right_no, &right_buf)?;

        let mut parent = BranchViewMut::from_page(&mut parent_buf)?;
        parent.remove_separator(sep_idx)?;
        parent.insert_raw(sep_idx, &new_sep_rec)?;
        self.pager.write_page(parent_no, &parent_buf)?;

        debug!(left = left_no, right = right_no, "rebalanced leaves");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn fix_branch_underflow(
        &mut self,
        parent_no: u32,
        mut parent_buf: PageBuf,
        sep_idx: usize,
        left_no: u32,
        left_buf: PageBuf,
        right_no: u32,
        right_buf: PageBuf,
    ) -> Result<()> {
        let left = BranchView::from_page(&left_buf)?;
        let right = BranchView::from_page(&right_buf)?;
        let parent = BranchView::from_page(&parent_buf)?;

        let sep_key = parent.key_bytes(sep_idx)?.to_vec();
        let pulled_len = sep_key.len() + BRANCH_RECORD_SUFFIX + SLOT_ENTRY_SIZE;

        if left.used_space() + right.used_space() + pulled_len <= PAGE_CAPACITY {
            // Merge: left entries, the pulled-down parent separator over
            // the right half's leftmost child, then the right entries.
            let mut merged_buf = [0u8; PAGE_SIZE];
            let mut merged = BranchViewMut::init(&mut merged_buf, left.leftmost_child());
            let mut out = 0;
            for i in 0..left.separator_count() {
                merged.insert_raw(out, left.record(i)?)?;
                out += 1;
            }
            merged.insert_separator(out, &sep_key, right.leftmost_child())?;
            out += 1;
            for i in 0..right.separator_count() {
                merged.insert_raw(out, right.record(i)?)?;
                out += 1;
            }
            self.pager.write_page(left_no, &merged_buf)?;

            let mut parent = BranchViewMut::from_page(&mut parent_buf)?;
            parent.remove_separator(sep_idx)?;
            self.pager.write_page(parent_no, &parent_buf)?;

            self.space.release_page(self.pager, right_no)?;
            debug!(left = left_no, right = right_no, "merged branches");
            return Ok(());
        }

        // Rotate one boundary entry through the parent separator.
        let donor_is_left = left.used_space() >= right.used_space();
        let donor_count = if donor_is_left {
            left.separator_count()
        } else {
            right.separator_count()
        };
        if donor_count == 0 {
            debug!(left = left_no, right = right_no, "rotation skipped");
            return Ok(());
        }

        let new_sep_key = if donor_is_left {
            let last = left.separator_count() - 1;
            let (key, _) = split_branch_record(left.record(last)?)?;
            key.to_vec()
        } else {
            let (key, _) = split_branch_record(right.record(0)?)?;
            key.to_vec()
        };
        let receiver_needs = sep_key.len() + BRANCH_RECORD_SUFFIX + SLOT_ENTRY_SIZE;

        let receiver_free = if donor_is_left {
            right.free_space()
        } else {
            left.free_space()
        };
        let new_sep_rec = encode_branch_record(&new_sep_key, right_no);
        let old_sep_len = parent.record(sep_idx)?.len();
        let parent_fits = parent.free_space() + old_sep_len >= new_sep_rec.len();

        if receiver_free < receiver_needs || !parent_fits {
            debug!(left = left_no, right = right_no, "rotation skipped");
            return Ok(());
        }

        let mut left_buf = left_buf;
        let mut right_buf = right_buf;
        if donor_is_left {
            // Left's last child moves over: it becomes the right page's
            // leftmost, and the old parent separator routes to the old
            // leftmost.
            let last = left.separator_count() - 1;
            let (_, moved_child) = split_branch_record(left.record(last)?)?;
            let old_leftmost = right.leftmost_child();

            let mut right = BranchViewMut::from_page(&mut right_buf)?;
            right.set_leftmost_child(moved_child);
            right.insert_separator(0, &sep_key, old_leftmost)?;
            let mut left = BranchViewMut::from_page(&mut left_buf)?;
            left.remove_separator(last)?;
        } else {
            // Right's leftmost child moves over under the old parent
            // separator; right's first entry becomes its new leftmost.
            let (_, new_leftmost) = split_branch_record(right.record(0)?)?;
            let old_leftmost = right.leftmost_child();

            let mut left = BranchViewMut::from_page(&mut left_buf)?;
            let at = left.separator_count();
            left.insert_separator(at, &sep_key, old_leftmost)?;
            let mut right = BranchViewMut::from_page(&mut right_buf)?;
            right.set_leftmost_child(new_leftmost);
            right.remove_separator(0)?;
        }
        self.pager.write_page(left_no, &left_buf)?;
        self.pager.write_page(right_no, &right_buf)?;

        let mut parent = BranchViewMut::from_page(&mut parent_buf)?;
        parent.remove_separator(sep_idx)?;
        parent.insert_raw(sep_idx, &new_sep_rec)?;
        self.pager.write_page(parent_no, &parent_buf)?;

        debug!(left = left_no, right = right_no, "rotated branch entry");
        Ok(())
    }

    /// Copies a single remaining child onto page 0, repeating until the
    /// root is a leaf or routes through at least one separator.
    fn collapse_root(&mut self) -> Result<()> {
        loop {
            let mut buf = [0u8; PAGE_SIZE];
            self.pager.read_page(ROOT_PAGE, &mut buf)?;
            let page = Page::new(&buf);
            if page.kind() != PageKind::Branch || page.slot_count() > 0 {
                return Ok(());
            }

            let child_no = page.prev_page();
            ensure!(
                child_no != NO_PAGE,
                "root branch has no separators and no leftmost child"
            );

            let mut child_buf = [0u8; PAGE_SIZE];
            self.pager.read_page(child_no, &mut child_buf)?;
            self.pager.write_page(ROOT_PAGE, &child_buf)?;
            self.space.release_page(self.pager, child_no)?;
            debug!(child = child_no, "collapsed root onto its single child");
        }
    }
}

/// Picks a size-balanced split index: start at the middle, push right
/// until the upper half fits a page, then pull left until the lower half
/// does too, staying inside [1, len-1].
fn split_point(arena: &Bump, records: &BumpVec<&[u8]>) -> usize {
    let sizes: BumpVec<usize> = records
        .iter()
        .map(|r| r.len() + SLOT_ENTRY_SIZE)
        .collect_in(arena);

    let mut mid = records.len() / 2;
    loop {
        let right_size: usize = sizes[mid..].iter().sum();
        if right_size <= PAGE_CAPACITY || mid >= records.len() - 1 {
            break;
        }
        mid += 1;
    }
    while mid > 1 {
        let left_size: usize = sizes[..mid].iter().sum();
        if left_size <= PAGE_CAPACITY {
            break;
        }
        mid -= 1;
    }

    mid.clamp(1, records.len() - 1)
}
