//! # Scan Iterator
//!
//! Ordered, bounded traversal across the leaf chain and duplicate
//! chains. A scan descends once to the leaf covering its lower bound,
//! then walks forward slot by slot, crossing leaves through their next
//! links and draining each duplicate chain before moving on.
//!
//! ## Bounds
//!
//! Both bounds are optional and independently inclusive or exclusive.
//! Because duplicate keys collapse into one slot, an exclusive lower
//! bound skips exactly one slot when the bound key is present; the
//! upper bound is checked against each slot's key before anything under
//! that slot is emitted.
//!
//! ## Duplicate Emission
//!
//! A slot whose entry is a chain head emits the chain node by node, all
//! under the same key, in chain order. Chains are LIFO, so the most
//! recently inserted RID comes out first.
//!
//! ## Lifecycle
//!
//! Forward-only, single pass, not restartable; a new scan is an
//! independent pass. The iterator owns its staged page buffer, so
//! dropping it releases everything it holds.

use eyre::{bail, ensure, Result};

use super::branch::BranchView;
use super::leaf::{LeafView, SearchResult};
use super::space::read_node;
use super::tree::ROOT_PAGE;
use crate::encoding::{Key, KeyType, Rid};
use crate::storage::{Page, PageIo, PageKind, NO_PAGE, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct ScanRange {
    pub low: Option<Key>,
    pub high: Option<Key>,
    pub low_inclusive: bool,
    pub high_inclusive: bool,
}

impl ScanRange {
    /// Unbounded scan over the whole index.
    pub fn all() -> Self {
        Self {
            low: None,
            high: None,
            low_inclusive: true,
            high_inclusive: true,
        }
    }

    pub fn new(
        low: Option<Key>,
        high: Option<Key>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Self {
        Self {
            low,
            high,
            low_inclusive,
            high_inclusive,
        }
    }
}

struct StagedChain {
    key: Key,
    next: Rid,
}

pub struct Scan<'a, P: PageIo> {
    pager: &'a P,
    key_type: KeyType,
    high: Option<Key>,
    high_inclusive: bool,
    buf: [u8; PAGE_SIZE],
    slot: usize,
    staged: Option<StagedChain>,
    exhausted: bool,
}

impl<'a, P: PageIo> Scan<'a, P> {
    pub(crate) fn open(pager: &'a P, key_type: KeyType, range: ScanRange) -> Result<Self> {
        if let Some(low) = &range.low {
            ensure!(
                low.key_type() == key_type,
                "lower bound type {:?} does not match scan type {:?}",
                low.key_type(),
                key_type
            );
        }
        if let Some(high) = &range.high {
            ensure!(
                high.key_type() == key_type,
                "upper bound type {:?} does not match scan type {:?}",
                high.key_type(),
                key_type
            );
        }

        let mut scan = Self {
            pager,
            key_type,
            high: range.high,
            high_inclusive: range.high_inclusive,
            buf: [0u8; PAGE_SIZE],
            slot: 0,
            staged: None,
            exhausted: false,
        };

        // Descend to the leaf that would hold the lower bound, or the
        // leftmost leaf when unbounded.
        let mut current = ROOT_PAGE;
        loop {
            scan.pager.read_page(current, &mut scan.buf)?;
            match Page::new(&scan.buf).kind() {
                PageKind::Leaf => break,
                PageKind::Branch => {
                    let branch = BranchView::from_page(&scan.buf)?;
                    current = match &range.low {
                        Some(low) => branch.find_child(low)?.0,
                        None => branch.child_at(0)?,
                    };
                }
                kind => bail!(
                    "unexpected {:?} page during scan descent at page {}",
                    kind,
                    current
                ),
            }
        }

        let leaf = LeafView::from_page(&scan.buf)?;
        scan.slot = match &range.low {
            None => 0,
            Some(low) => match leaf.find_key(low)? {
                SearchResult::Found(i) => {
                    if range.low_inclusive {
                        i
                    } else {
                        i + 1
                    }
                }
                SearchResult::NotFound(pos) => pos,
            },
        };

        Ok(scan)
    }

    /// Emits the next (key, rid) pair, or `None` once the leaf chain
    /// ends or a key fails the upper bound.
    pub fn next(&mut self) -> Result<Option<(Key, Rid)>> {
        if self.exhausted {
            return Ok(None);
        }

        if let Some(staged) = self.staged.take() {
            let node = read_node(self.pager, staged.next)?;
            if !node.next.is_end() {
                self.staged = Some(StagedChain {
                    key: staged.key.clone(),
                    next: node.next,
                });
            }
            return Ok(Some((staged.key, node.data)));
        }

        loop {
            let leaf = LeafView::from_page(&self.buf)?;
            if self.slot >= leaf.slot_count() {
                let next_page = leaf.next_page();
                if next_page == NO_PAGE {
                    self.exhausted = true;
                    return Ok(None);
                }
                self.pager.read_page(next_page, &mut self.buf)?;
                self.slot = 0;
                continue;
            }

            let key = Key::decode(self.key_type, leaf.key_bytes(self.slot)?)?;
            if let Some(high) = &self.high {
                let ord = key.compare(high)?;
                let beyond = ord == std::cmp::Ordering::Greater
                    || (ord == std::cmp::Ordering::Equal && !self.high_inclusive);
                if beyond {
                    self.exhausted = true;
                    return Ok(None);
                }
            }

            let entry = leaf.entry(self.slot)?;
            self.slot += 1;

            if entry.dup {
                let head = read_node(self.pager, entry.rid)?;
                if !head.next.is_end() {
                    self.staged = Some(StagedChain {
                        key: key.clone(),
                        next: head.next,
                    });
                }
                return Ok(Some((key, head.data)));
            }
            return Ok(Some((key, entry.rid)));
        }
    }

    /// Drains the scan into a vector. Test and small-result helper.
    pub fn collect_all(mut self) -> Result<Vec<(Key, Rid)>> {
        let mut out = Vec::new();
        while let Some(pair) = self.next()? {
            out.push(pair);
        }
        Ok(out)
    }
}
