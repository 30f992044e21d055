//! # Paged-File I/O
//!
//! This module provides the `PageIo` trait, the copy-based abstraction
//! over the paged binary file that backs an index, together with two
//! implementations: `FilePager` for real files and `MemPager` for tests.
//!
//! ## Copy-Based Interface
//!
//! ```text
//! fn read_page(&self, page_no: u32, buf: &mut PageBuf) -> Result<()>;
//! fn write_page(&mut self, page_no: u32, buf: &PageBuf) -> Result<()>;
//! fn append_page(&mut self, buf: &PageBuf) -> Result<u32>;
//! ```
//!
//! The engine stages every edit in an owned `PageBuf` and writes whole
//! pages back. This keeps the failure model simple (a failed call
//! discards its buffer, the file is untouched) and keeps backends free
//! to buffer or cache behind the interface; correctness only requires
//! that a written page is durable before the backend forgets it.
//!
//! ## File Format
//!
//! A `FilePager` file is a bare concatenation of 4KB pages with no file
//! header. `open` validates that the file is non-empty and its size is a
//! multiple of the page size; anything else is treated as a foreign or
//! truncated file.
//!
//! ## Ownership
//!
//! A pager owns its file descriptor and closes it on drop. There is no
//! shared handle or reference counting; one engine owns one pager.
//!
//! ## Thread Safety
//!
//! Positioned reads and writes (`read_exact_at`/`write_all_at`) never
//! touch a shared cursor, but the engine is single-threaded by design
//! and the trait requires no synchronization from implementations.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use tracing::debug;

use super::{PageBuf, PAGE_SIZE};

pub trait PageIo {
    /// Reads a page into the provided buffer.
    fn read_page(&self, page_no: u32, buf: &mut PageBuf) -> Result<()>;

    /// Writes a page from the provided buffer.
    fn write_page(&mut self, page_no: u32, buf: &PageBuf) -> Result<()>;

    /// Appends a new page at the end of the file and returns its number.
    fn append_page(&mut self, buf: &PageBuf) -> Result<u32>;

    /// Number of pages currently in the file.
    fn page_count(&self) -> u32;

    /// Flushes buffered writes to durable storage.
    fn sync(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct FilePager {
    path: PathBuf,
    file: File,
    page_count: u32,
}

impl FilePager {
    /// Creates a new, empty paged file, truncating any previous content.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create index file '{}'", path.display()))?;

        debug!(path = %path.display(), "created index file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            page_count: 0,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open index file '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?;

        let file_size = metadata.len();

        ensure!(
            file_size > 0,
            "cannot open empty index file '{}'",
            path.display()
        );

        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            "index file '{}' size {} is not a multiple of page size {}",
            path.display(),
            file_size,
            PAGE_SIZE
        );

        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        debug!(path = %path.display(), page_count, "opened index file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            page_count,
        })
    }

    /// Removes the backing file. Any open pager for it keeps its
    /// descriptor until dropped.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::remove_file(path)
            .wrap_err_with(|| format!("failed to destroy index file '{}'", path.display()))?;
        debug!(path = %path.display(), "destroyed index file");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageIo for FilePager {
    fn read_page(&self, page_no: u32, buf: &mut PageBuf) -> Result<()> {
        ensure!(
            page_no < self.page_count,
            "page {} out of bounds (page_count={})",
            page_no,
            self.page_count
        );

        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file
            .read_exact_at(buf, offset)
            .wrap_err_with(|| format!("failed to read page {} of '{}'", page_no, self.path.display()))
    }

    fn write_page(&mut self, page_no: u32, buf: &PageBuf) -> Result<()> {
        ensure!(
            page_no < self.page_count,
            "page {} out of bounds (page_count={})",
            page_no,
            self.page_count
        );

        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file
            .write_all_at(buf, offset)
            .wrap_err_with(|| format!("failed to write page {} of '{}'", page_no, self.path.display()))
    }

    fn append_page(&mut self, buf: &PageBuf) -> Result<u32> {
        let page_no = self.page_count;
        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file
            .write_all_at(buf, offset)
            .wrap_err_with(|| format!("failed to append page {} to '{}'", page_no, self.path.display()))?;
        self.page_count += 1;
        Ok(page_no)
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

/// Vec-backed pager for unit tests. Same contract as `FilePager` with no
/// filesystem behind it.
#[derive(Debug, Default)]
pub struct MemPager {
    pages: Vec<PageBuf>,
}

impl MemPager {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }
}

impl PageIo for MemPager {
    fn read_page(&self, page_no: u32, buf: &mut PageBuf) -> Result<()> {
        ensure!(
            (page_no as usize) < self.pages.len(),
            "page {} out of bounds (page_count={})",
            page_no,
            self.pages.len()
        );
        buf.copy_from_slice(&self.pages[page_no as usize]);
        Ok(())
    }

    fn write_page(&mut self, page_no: u32, buf: &PageBuf) -> Result<()> {
        ensure!(
            (page_no as usize) < self.pages.len(),
            "page {} out of bounds (page_count={})",
            page_no,
            self.pages.len()
        );
        self.pages[page_no as usize].copy_from_slice(buf);
        Ok(())
    }

    fn append_page(&mut self, buf: &PageBuf) -> Result<u32> {
        self.pages.push(*buf);
        Ok(self.pages.len() as u32 - 1)
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
