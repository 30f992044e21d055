//! # Index Handle
//!
//! The public surface of the engine. An `Index` owns one pager and the
//! space manager for that file; there is no process-wide state, so two
//! open indexes never interfere. Dropping the handle syncs and closes
//! the file.
//!
//! ## Typical Use
//!
//! ```ignore
//! use ridx::{Index, Key, KeyType, Rid, ScanRange};
//!
//! let mut index = Index::create("users_age.ridx")?;
//! index.insert(&Key::Int(34), Rid::new(7, 2))?;
//!
//! let mut scan = index.scan(KeyType::Int, ScanRange::all())?;
//! while let Some((key, rid)) = scan.next()? {
//!     // ...
//! }
//! ```
//!
//! The engine is single-threaded and synchronous: every call runs to
//! completion or returns a definitive error, and no state is held
//! across calls beyond an open scan's cursor.

use std::path::Path;

use eyre::{ensure, Result};
use tracing::debug;

use super::scan::{Scan, ScanRange};
use super::space::SpaceManager;
use super::tree::Tree;
use crate::encoding::{Key, KeyType, Rid};
use crate::storage::{FilePager, Page, PageIo, PageKind, PageMut, PAGE_SIZE};

pub struct Index<P: PageIo = FilePager> {
    pager: P,
    space: SpaceManager,
}

impl Index<FilePager> {
    /// Creates a new index file with page 0 as its empty root leaf.
    pub fn create<Q: AsRef<Path>>(path: Q) -> Result<Self> {
        Self::create_on(FilePager::create(path)?)
    }

    /// Opens an existing index, rebuilding the space pools with a full
    /// page scan.
    pub fn open<Q: AsRef<Path>>(path: Q) -> Result<Self> {
        Self::attach(FilePager::open(path)?)
    }

    /// Removes the index file.
    pub fn destroy<Q: AsRef<Path>>(path: Q) -> Result<()> {
        FilePager::destroy(path)
    }
}

impl<P: PageIo> Index<P> {
    /// Writes the root page into an empty pager. Backend-agnostic
    /// sibling of `create`.
    pub fn create_on(mut pager: P) -> Result<Self> {
        ensure!(
            pager.page_count() == 0,
            "refusing to initialize a non-empty file ({} pages)",
            pager.page_count()
        );
        let mut buf = [0u8; PAGE_SIZE];
        PageMut::new(&mut buf).init(PageKind::Leaf);
        pager.append_page(&buf)?;
        debug!("initialized index root");
        Ok(Self {
            pager,
            space: SpaceManager::new(),
        })
    }

    /// Attaches to an already-populated pager. Backend-agnostic sibling
    /// of `open`.
    pub fn attach(pager: P) -> Result<Self> {
        ensure!(pager.page_count() >= 1, "index file has no root page");

        let mut buf = [0u8; PAGE_SIZE];
        pager.read_page(0, &mut buf)?;
        let kind = Page::new(&buf).kind();
        ensure!(
            kind == PageKind::Leaf || kind == PageKind::Branch,
            "root page has kind {:?}",
            kind
        );

        let space = SpaceManager::scan_pools(&pager)?;
        Ok(Self { pager, space })
    }

    /// Adds one (key, rid) entry. Duplicate keys are welcome; the same
    /// (key, rid) pair inserted twice will simply be present twice.
    pub fn insert(&mut self, key: &Key, rid: Rid) -> Result<()> {
        Tree::new(&mut self.pager, &mut self.space).insert(key, rid)
    }

    /// Removes one (key, rid) entry. Returns false when the key is
    /// absent or carries no such rid; that is a normal miss, not an
    /// error.
    pub fn remove(&mut self, key: &Key, rid: Rid) -> Result<bool> {
        Tree::new(&mut self.pager, &mut self.space).remove(key, rid)
    }

    /// Opens a bounded forward scan. The scan borrows the index; insert
    /// and remove wait until it is dropped.
    pub fn scan(&self, key_type: KeyType, range: ScanRange) -> Result<Scan<'_, P>> {
        Scan::open(&self.pager, key_type, range)
    }

    pub fn sync(&self) -> Result<()> {
        self.pager.sync()
    }

    pub fn page_count(&self) -> u32 {
        self.pager.page_count()
    }

    /// Runs the structural validator over every page: trailer bounds,
    /// directory consistency, non-negative free space.
    pub fn verify(&self) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        for page_no in 0..self.pager.page_count() {
            self.pager.read_page(page_no, &mut buf)?;
            crate::storage::validate_page(&buf)?;
        }
        Ok(())
    }
}

impl<P: PageIo> Drop for Index<P> {
    fn drop(&mut self) {
        let _ = self.pager.sync();
    }
}
