//! # Storage Module
//!
//! Foundational storage layer for the index engine: the fixed-size page
//! unit, the byte-level page codec, and the paged-file I/O collaborator.
//!
//! ## Page Unit
//!
//! All storage uses 4KB (4096 byte) pages. A database file is simply a
//! concatenation of pages:
//!
//! ```text
//! Offset 0:       Page 0 (4KB)   <- always the tree root
//! Offset 4096:    Page 1 (4KB)
//! Offset 8192:    Page 2 (4KB)
//! ...
//! ```
//!
//! Page 0 is written as an empty leaf at file creation and remains the
//! root for the lifetime of the file; there is no separate file header.
//!
//! ## Copy-Based I/O
//!
//! The `PageIo` trait uses copy semantics: callers read a page into an
//! owned `PageBuf`, mutate the buffer, and write the whole page back.
//! Because every edit is staged in memory and flushed with one write per
//! touched page, a failed operation never leaves a page partially
//! written: the buffer is simply discarded.
//!
//! ## Module Organization
//!
//! - `pager`: the `PageIo` trait plus `FilePager` (on-disk) and
//!   `MemPager` (in-memory, for tests)
//! - `page`: trailer layout, slot directory, and heap accessors for one
//!   page buffer

mod page;
mod pager;

pub use page::{validate_page, Page, PageKind, PageMut, SlotEntry};
pub use pager::{FilePager, MemPager, PageIo};

pub const PAGE_SIZE: usize = 4096;
pub const TRAILER_SIZE: usize = 13;
pub const TRAILER_OFFSET: usize = PAGE_SIZE - TRAILER_SIZE;
pub const SLOT_ENTRY_SIZE: usize = 4;

/// Free space available on a freshly initialized page.
pub const PAGE_CAPACITY: usize = TRAILER_OFFSET;

/// Sentinel meaning "no page" in prev/next links. Safe because page 0 is
/// permanently the root and never appears as a sibling or chain target.
pub const NO_PAGE: u32 = 0;

/// One fixed-size page staged in memory.
pub type PageBuf = [u8; PAGE_SIZE];
