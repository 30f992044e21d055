//! # Space Manager
//!
//! Per-file page recycling and duplicate-chain maintenance. The space
//! manager keeps two in-memory pools, rebuilt by a full page scan every
//! time a file is opened and never persisted:
//!
//! - `empty_pages`: pages with zero live slots, any kind, fully
//!   reclaimable (page 0 excluded, it is permanently the root)
//! - `dup_candidates`: DupOverflow pages known to hold at least one free
//!   chain-node slot, tombstoned or unallocated
//!
//! ## Allocation Strategy
//!
//! Both acquire paths are pool-first with a bounded retry loop: a pool
//! entry that turns out stale on disk (wrong kind, no space left) is
//! discarded and the next candidate tried, up to `ALLOC_RETRY_LIMIT`
//! attempts. On pool exhaustion `acquire_empty` appends a zeroed page
//! and `acquire_dup_page` promotes a fresh empty page to DupOverflow.
//!
//! ## Duplicate Chains
//!
//! One key with many RIDs stores a single leaf slot pointing at a singly
//! linked chain of fixed 16-byte nodes in DupOverflow pages:
//!
//! ```text
//! DupChainNode (16 bytes):
//! +----------------------+----------------------+
//! | next rid (8 bytes)   | data rid (8 bytes)   |
//! +----------------------+----------------------+
//! ```
//!
//! A node's own (page, slot) position doubles as its RID. Chains are
//! LIFO: `insert_dup_record` writes `{next: old_head, data}` and returns
//! the new node's RID for the leaf slot, so scans visit the most
//! recently inserted RID first. This is a deliberate simplification, not
//! an ordering guarantee for duplicate-heavy workloads.
//!
//! ## Unlink and Reclamation
//!
//! `delete_dup_record` splices a node out of its chain and tombstones
//! the vacated slot (next = tombstone sentinel) rather than compacting,
//! so sibling nodes keep their RIDs stable. A trailing live slot is
//! instead dropped outright, together with any trailing run of
//! tombstones behind it. A page left fully empty returns to
//! `empty_pages`; one left under capacity is enrolled in
//! `dup_candidates`. Recycling half-empty overflow pages bounds file
//! growth for heavily duplicated keys without a global compaction pass.

use eyre::{bail, ensure, Result};
use hashbrown::HashSet;
use tracing::{debug, trace};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::encoding::Rid;
use crate::index::ALLOC_RETRY_LIMIT;
use crate::storage::{
    validate_page, Page, PageIo, PageKind, PageMut, PAGE_SIZE, SLOT_ENTRY_SIZE,
};

pub const DUP_NODE_SIZE: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct DupNode {
    pub next: Rid,
    pub data: Rid,
}

const _: () = assert!(size_of::<DupNode>() == DUP_NODE_SIZE);

/// Reads one chain node by its RID. Shared by the space manager and the
/// scan iterator, which walks chains without mutating them.
pub fn read_node<P: PageIo>(pager: &P, rid: Rid) -> Result<DupNode> {
    let mut buf = [0u8; PAGE_SIZE];
    pager.read_page(rid.page_no(), &mut buf)?;
    let page = Page::new(&buf);
    ensure!(
        page.kind() == PageKind::DupOverflow,
        "chain rid ({}, {}) points at a {:?} page",
        rid.page_no(),
        rid.slot_no(),
        page.kind()
    );
    let node = parse_node(page.slot_bytes(rid.slot_no() as usize)?)?;
    ensure!(
        !node.next.is_tombstone(),
        "chain rid ({}, {}) points at a tombstoned node",
        rid.page_no(),
        rid.slot_no()
    );
    Ok(node)
}

fn parse_node(bytes: &[u8]) -> Result<DupNode> {
    let node = DupNode::ref_from_bytes(bytes)
        .map_err(|e| eyre::eyre!("malformed chain node: {:?}", e))?;
    Ok(*node)
}

/// True when the page can host one more chain node, either in a
/// tombstoned slot or in fresh space.
fn has_free_node_slot(page: &Page<'_>) -> Result<bool> {
    if page.free_space() >= DUP_NODE_SIZE + SLOT_ENTRY_SIZE {
        return Ok(true);
    }
    for i in 0..page.slot_count() as usize {
        if parse_node(page.slot_bytes(i)?)?.next.is_tombstone() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Debug, Default)]
pub struct SpaceManager {
    empty_pages: HashSet<u32>,
    dup_candidates: HashSet<u32>,
}

impl SpaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds both pools with a full page scan. Every page is also run
    /// through the structural validator, so a corrupt file fails at open
    /// rather than mid-operation.
    pub fn scan_pools<P: PageIo>(pager: &P) -> Result<Self> {
        let mut pools = Self::new();
        let mut buf = [0u8; PAGE_SIZE];

        for page_no in 0..pager.page_count() {
            pager.read_page(page_no, &mut buf)?;
            validate_page(&buf)?;
            let page = Page::new(&buf);

            if page_no != 0 && page.slot_count() == 0 {
                pools.empty_pages.insert(page_no);
            } else if page.kind() == PageKind::DupOverflow && has_free_node_slot(&page)? {
                pools.dup_candidates.insert(page_no);
            }
        }

        debug!(
            empty = pools.empty_pages.len(),
            dup_candidates = pools.dup_candidates.len(),
            "rebuilt space pools"
        );
        Ok(pools)
    }

    pub fn empty_count(&self) -> usize {
        self.empty_pages.len()
    }

    pub fn dup_candidate_count(&self) -> usize {
        self.dup_candidates.len()
    }

    /// Hands out a fully empty page, pool-first, appending a zeroed page
    /// when the pool runs dry. The returned page keeps whatever kind it
    /// had; callers re-init it.
    pub fn acquire_empty<P: PageIo>(&mut self, pager: &mut P) -> Result<u32> {
        let mut buf = [0u8; PAGE_SIZE];

        for _ in 0..ALLOC_RETRY_LIMIT {
            let candidate = match self.empty_pages.iter().next() {
                Some(&p) => p,
                None => break,
            };
            self.empty_pages.remove(&candidate);
            self.dup_candidates.remove(&candidate);

            pager.read_page(candidate, &mut buf)?;
            if Page::new(&buf).slot_count() == 0 {
                trace!(page = candidate, "reused empty page");
                return Ok(candidate);
            }
            // Stale pool entry; the page grew slots behind our back.
            trace!(page = candidate, "dropped stale empty-pool entry");
        }

        if !self.empty_pages.is_empty() {
            bail!(
                "empty-page pool still inconsistent after {} attempts",
                ALLOC_RETRY_LIMIT
            );
        }

        let page_no = pager.append_page(&[0u8; PAGE_SIZE])?;
        trace!(page = page_no, "appended fresh page");
        Ok(page_no)
    }

    /// Returns a page to the empty pool, zeroing it on disk first.
    pub fn release_page<P: PageIo>(&mut self, pager: &mut P, page_no: u32) -> Result<()> {
        ensure!(page_no != 0, "the root page is never recycled");
        pager.write_page(page_no, &[0u8; PAGE_SIZE])?;
        self.dup_candidates.remove(&page_no);
        self.empty_pages.insert(page_no);
        trace!(page = page_no, "released page to empty pool");
        Ok(())
    }

    /// Finds a DupOverflow page with room for one more node, promoting a
    /// fresh empty page when no candidate survives verification.
    fn acquire_dup_page<P: PageIo>(&mut self, pager: &mut P) -> Result<u32> {
        let mut buf = [0u8; PAGE_SIZE];

        for _ in 0..ALLOC_RETRY_LIMIT {
            let candidate = match self.dup_candidates.iter().next() {
                Some(&p) => p,
                None => break,
            };

            pager.read_page(candidate, &mut buf)?;
            let page = Page::new(&buf);
            if page.kind() == PageKind::DupOverflow && has_free_node_slot(&page)? {
                return Ok(candidate);
            }
            self.dup_candidates.remove(&candidate);
            trace!(page = candidate, "dropped stale dup-candidate entry");
        }

        if !self.dup_candidates.is_empty() {
            bail!(
                "dup-candidate pool still inconsistent after {} attempts",
                ALLOC_RETRY_LIMIT
            );
        }

        let page_no = self.acquire_empty(pager)?;
        pager.read_page(page_no, &mut buf)?;
        PageMut::new(&mut buf).init(PageKind::DupOverflow);
        pager.write_page(page_no, &buf)?;
        self.dup_candidates.insert(page_no);
        debug!(page = page_no, "promoted page to dup overflow");
        Ok(page_no)
    }

    /// Allocates a chain node holding `{next: head, data}` and returns
    /// its RID, the new head of the chain.
    pub fn insert_dup_record<P: PageIo>(
        &mut self,
        pager: &mut P,
        head: Rid,
        data: Rid,
    ) -> Result<Rid> {
        let page_no = self.acquire_dup_page(pager)?;

        let mut buf = [0u8; PAGE_SIZE];
        pager.read_page(page_no, &mut buf)?;
        let mut page = PageMut::new(&mut buf);

        let node = DupNode { next: head, data };

        let mut slot_no = None;
        for i in 0..page.slot_count() as usize {
            if parse_node(page.slot_bytes(i)?)?.next.is_tombstone() {
                slot_no = Some(i);
                break;
            }
        }

        let slot_no = match slot_no {
            Some(i) => {
                page.overwrite_slot(i, node.as_bytes())?;
                i
            }
            None => {
                let i = page.slot_count() as usize;
                page.insert_slot_at(i, node.as_bytes())?;
                i
            }
        };

        if !has_free_node_slot(&page.as_page())? {
            self.dup_candidates.remove(&page_no);
        }

        pager.write_page(page_no, &buf)?;
        trace!(page = page_no, slot = slot_no, "linked chain node");
        Ok(Rid::new(page_no, slot_no as u32))
    }

    /// Unlinks the chain node holding `data`, rewriting `head` when the
    /// match is the head itself. Returns false when `data` is not on the
    /// chain.
    pub fn delete_dup_record<P: PageIo>(
        &mut self,
        pager: &mut P,
        head: &mut Rid,
        data: Rid,
    ) -> Result<bool> {
        let mut prev: Option<Rid> = None;
        let mut current = *head;

        while !current.is_end() {
            let node = read_node(pager, current)?;

            if node.data == data {
                match prev {
                    None => *head = node.next,
                    Some(prev_rid) => {
                        let mut predecessor = read_node(pager, prev_rid)?;
                        predecessor.next = node.next;
                        self.write_node(pager, prev_rid, predecessor)?;
                    }
                }
                self.release_node(pager, current)?;
                return Ok(true);
            }

            prev = Some(current);
            current = node.next;
        }

        Ok(false)
    }

    fn write_node<P: PageIo>(&mut self, pager: &mut P, rid: Rid, node: DupNode) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        pager.read_page(rid.page_no(), &mut buf)?;
        let mut page = PageMut::new(&mut buf);
        ensure!(
            page.kind() == PageKind::DupOverflow,
            "chain rid ({}, {}) points at a {:?} page",
            rid.page_no(),
            rid.slot_no(),
            page.kind()
        );
        page.overwrite_slot(rid.slot_no() as usize, node.as_bytes())?;
        pager.write_page(rid.page_no(), &buf)
    }

    /// Frees one chain node: tombstones it in place, or drops it from
    /// the directory when it is the trailing live slot, reclaiming any
    /// trailing run of tombstones with it.
    pub fn release_node<P: PageIo>(&mut self, pager: &mut P, rid: Rid) -> Result<()> {
        let page_no = rid.page_no();
        let slot = rid.slot_no() as usize;

        let mut buf = [0u8; PAGE_SIZE];
        pager.read_page(page_no, &mut buf)?;
        let mut page = PageMut::new(&mut buf);
        ensure!(
            page.kind() == PageKind::DupOverflow,
            "chain rid ({}, {}) points at a {:?} page",
            page_no,
            rid.slot_no(),
            page.kind()
        );
        let count = page.slot_count() as usize;
        ensure!(
            slot < count,
            "chain slot {} out of bounds (slot_count={})",
            slot,
            count
        );

        if slot == count - 1 {
            page.remove_slot_at(slot)?;
            while page.slot_count() > 0 {
                let last = page.slot_count() as usize - 1;
                if parse_node(page.slot_bytes(last)?)?.next.is_tombstone() {
                    page.remove_slot_at(last)?;
                } else {
                    break;
                }
            }
        } else {
            let tombstoned = DupNode {
                next: Rid::tombstone(),
                data: Rid::end(),
            };
            page.overwrite_slot(slot, tombstoned.as_bytes())?;
        }

        if page.slot_count() == 0 {
            self.release_page(pager, page_no)?;
            debug!(page = page_no, "dup page drained, recycled");
        } else {
            pager.write_page(page_no, &buf)?;
            self.dup_candidates.insert(page_no);
            trace!(page = page_no, slot, "freed chain node");
        }

        Ok(())
    }
}
