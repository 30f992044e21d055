//! # ridx - Embedded Secondary-Index Engine
//!
//! ridx maps typed attribute values to record locators (RIDs) for a
//! record store: a B+tree over a fixed-size paged binary file, with
//! non-unique keys, ordered range retrieval, and page recycling. It is
//! an in-process library with no network or command-line surface.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ridx::{Index, Key, KeyType, Rid, ScanRange};
//!
//! let mut index = Index::create("./users_age.ridx")?;
//!
//! index.insert(&Key::Int(34), Rid::new(7, 2))?;
//! index.insert(&Key::Int(34), Rid::new(7, 5))?;   // duplicate keys are fine
//!
//! let range = ScanRange::new(Some(Key::Int(18)), Some(Key::Int(65)), true, true);
//! let mut scan = index.scan(KeyType::Int, range)?;
//! while let Some((key, rid)) = scan.next()? {
//!     // rids come back in ascending key order
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------+
//! |        Public API (Index)           |
//! +-------------------------------------+
//! |  Tree Engine  |  Scan Iterator      |
//! +-------------------------------------+
//! |  Leaf/Branch Views | Space Manager  |
//! +-------------------------------------+
//! |     Page Codec (trailer + slots)    |
//! +-------------------------------------+
//! |     Paged File I/O (4KB units)      |
//! +-------------------------------------+
//! ```
//!
//! ## On-Disk Shape
//!
//! An index is a bare concatenation of 4KB pages. Page 0 is written as
//! an empty leaf at creation and is permanently the root; the tree
//! grows and shrinks by rewriting page 0 in place. Duplicate keys
//! collapse into one leaf slot pointing at a LIFO chain of 16-byte
//! nodes in overflow pages, which are recycled while partially empty.
//!
//! ## Scope
//!
//! Single-threaded, synchronous, blocking page I/O. No transactions,
//! no write-ahead logging, no multi-process coordination; callers that
//! share a file must serialize externally. Every operation touches a
//! bounded number of pages and either completes or returns a definitive
//! error, with edits staged in memory so a failed call never leaves a
//! page half-written.
//!
//! ## Module Overview
//!
//! - [`storage`]: the page unit, trailer/slot codec, and file I/O
//! - [`encoding`]: the key/RID wire format shared with the record layer
//! - [`index`]: leaf/branch views, space manager, tree engine, scans

pub mod encoding;
pub mod index;
pub mod storage;

pub use encoding::{Key, KeyType, Rid};
pub use index::{Index, Scan, ScanRange};
