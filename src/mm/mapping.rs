//! File-Backed Memory Mappings
//!
//! A [`Mapping`] describes a lazily populated range of user pages backed by
//! a file. Explicit `mmap` regions and executable segments share this one
//! representation; they differ only in how the backed and zero-filled parts
//! of the range are laid out.
//!
//! # Page Layout
//! ```text
//! base                                   boundary
//!  │ full │ full │ ... │ full │ partial▒▒│ zero │ zero │
//!  └──────────── page_count ─────────────┘             │
//!  └──────────────── total_pages ──────────────────────┘
//! ```
//! - Full pages are read from and written back to the file whole
//! - The partial page carries `tail_bytes` of file data; the rest is zeroed
//!   in memory and never written back
//! - Zero pages (segments only) never touch the file
//!
//! The boundary address `base + backed_bytes` decides which of the three a
//! page falls in.

use alloc::vec::Vec;

use log::{trace, warn};

use super::address::{pages_for, VirtAddr, PAGE_MASK, PAGE_SIZE};
use super::frame::Frame;
use super::paging::MappingError;
use crate::fs::{FileBox, FilesysLock};

/// Result value reported to user mode when `mmap`/`munmap` fail.
pub const MAP_FAILED: i32 = -1;

/// Identifier of a mapping, unique within its process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct MapId(i32);

impl MapId {
    /// Create a mapping id from its raw value.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw id as reported to user mode.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

/// How a mapping came to exist.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MappingKind {
    /// Created by the `mmap` system call.
    File,
    /// Executable code or data installed by the loader.
    Segment,
}

/// Where the contents of one page of a mapping come from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PageSource {
    /// A whole page of file data at `offset`.
    Full { offset: u32 },
    /// `len` bytes of file data at `offset`, then zeros.
    Partial { offset: u32, len: usize },
    /// No file data.
    ZeroFill,
}

/// A lazily populated, file-backed range of user pages.
pub struct Mapping {
    id: MapId,
    base: VirtAddr,
    /// Pages holding file data, including a partial final page.
    page_count: usize,
    /// `page_count` plus the pure zero-fill pages after it.
    total_pages: usize,
    /// Bytes of file data in the final backed page, 0 if it is full.
    tail_bytes: usize,
    writable: bool,
    kind: MappingKind,
    file_offset: u32,
    file: FileBox,
}

impl Mapping {
    /// Map the whole of `file` (already reopened) at `base`.
    pub fn for_file(id: MapId, base: VirtAddr, file: FileBox, length: u32) -> Self {
        let backed = length as usize;
        let page_count = pages_for(backed);
        Self {
            id,
            base,
            page_count,
            total_pages: page_count,
            tail_bytes: backed & PAGE_MASK,
            writable: true,
            kind: MappingKind::File,
            file_offset: 0,
            file,
        }
    }

    /// Map an executable segment: `read_bytes` from `file` at `offset`,
    /// followed by zero fill up to `read_bytes + zero_bytes`.
    ///
    /// `read_bytes + zero_bytes` must be a whole number of pages and the
    /// file range must end below 4 GiB.
    pub fn for_segment(
        id: MapId,
        base: VirtAddr,
        file: FileBox,
        offset: u32,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
    ) -> Result<Self, (MappingError, FileBox)> {
        if offset.checked_add(read_bytes).is_none() {
            return Err((MappingError::FileRange, file));
        }
        let read_bytes = read_bytes as usize;
        let total = match read_bytes.checked_add(zero_bytes as usize) {
            Some(total) if total & PAGE_MASK == 0 => total,
            _ => return Err((MappingError::MisalignedAddress, file)),
        };
        Ok(Self {
            id,
            base,
            page_count: pages_for(read_bytes),
            total_pages: total / PAGE_SIZE,
            tail_bytes: read_bytes & PAGE_MASK,
            writable,
            kind: MappingKind::Segment,
            file_offset: offset,
            file,
        })
    }

    #[inline]
    pub fn id(&self) -> MapId {
        self.id
    }

    #[inline]
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[inline]
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    #[inline]
    pub fn tail_bytes(&self) -> usize {
        self.tail_bytes
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    #[inline]
    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    #[inline]
    pub fn is_segment(&self) -> bool {
        self.kind == MappingKind::Segment
    }

    #[inline]
    pub fn file_offset(&self) -> u32 {
        self.file_offset
    }

    /// Start address of every page in the mapping, zero fill included.
    pub fn pages(&self) -> impl Iterator<Item = VirtAddr> + '_ {
        (0..self.total_pages).map(move |i| VirtAddr::new(self.base.as_usize() + i * PAGE_SIZE))
    }

    /// Check if `addr` falls inside the mapping.
    pub fn contains(&self, addr: VirtAddr) -> bool {
        let start = self.base.as_usize();
        let end = start + self.total_pages * PAGE_SIZE;
        (start..end).contains(&addr.as_usize())
    }

    /// Bytes of the mapping backed by the file.
    fn backed_bytes(&self) -> usize {
        if self.tail_bytes == 0 {
            self.page_count * PAGE_SIZE
        } else {
            (self.page_count - 1) * PAGE_SIZE + self.tail_bytes
        }
    }

    /// First address past the file-backed part of the mapping.
    fn boundary(&self) -> usize {
        self.base.as_usize() + self.backed_bytes()
    }

    fn source_of(&self, upage: VirtAddr) -> PageSource {
        let start = upage.as_usize();
        let boundary = self.boundary();
        // Backed pages end within the range checked at construction
        let offset = || self.file_offset + upage.offset_from(self.base) as u32;
        if start + PAGE_SIZE <= boundary {
            PageSource::Full { offset: offset() }
        } else if start < boundary {
            PageSource::Partial {
                offset: offset(),
                len: boundary - start,
            }
        } else {
            PageSource::ZeroFill
        }
    }

    /// Fill `frame` with the contents of the page at `upage`.
    ///
    /// Returns the number of bytes read from the file; the rest of the frame
    /// is zero.
    pub fn fill(&mut self, fs: &FilesysLock, upage: VirtAddr, frame: &mut Frame) -> usize {
        debug_assert!(upage.is_aligned() && self.contains(upage));
        let bytes = frame.as_bytes_mut();
        let (read, wanted) = match self.source_of(upage) {
            PageSource::Full { offset } => (fs.read_at(self.file.as_mut(), bytes, offset), PAGE_SIZE),
            PageSource::Partial { offset, len } => {
                let read = fs.read_at(self.file.as_mut(), &mut bytes[..len], offset);
                (read, len)
            }
            PageSource::ZeroFill => (0, 0),
        };
        bytes[read..].fill(0);
        if read < wanted {
            warn!("[MMAP] map {}: short fill at {} ({}/{} bytes)", self.id.0, upage, read, wanted);
        }
        trace!("[MMAP] map {}: filled {} with {} file bytes", self.id.0, upage, read);
        read
    }

    /// Persist the file-backed bytes of the page at `upage`.
    ///
    /// A no-op for read-only mappings and zero-fill pages. Returns the
    /// number of bytes written.
    pub fn write_back(&mut self, fs: &FilesysLock, upage: VirtAddr, frame: &Frame) -> usize {
        debug_assert!(upage.is_aligned() && self.contains(upage));
        if !self.writable {
            return 0;
        }
        let bytes = frame.as_bytes();
        let written = match self.source_of(upage) {
            PageSource::Full { offset } => fs.write_at(self.file.as_mut(), bytes, offset),
            PageSource::Partial { offset, len } => fs.write_at(self.file.as_mut(), &bytes[..len], offset),
            PageSource::ZeroFill => 0,
        };
        trace!("[MMAP] map {}: wrote back {} bytes of {}", self.id.0, written, upage);
        written
    }

    /// Give up the backing file so it can be closed under the lock.
    pub fn into_file(self) -> FileBox {
        self.file
    }
}

impl core::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mapping")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("page_count", &self.page_count)
            .field("total_pages", &self.total_pages)
            .field("tail_bytes", &self.tail_bytes)
            .field("writable", &self.writable)
            .field("kind", &self.kind)
            .field("file_offset", &self.file_offset)
            .finish()
    }
}

/// The ordered list of a process's mappings.
#[derive(Debug)]
pub struct MappingList {
    mappings: Vec<Mapping>,
    next_id: i32,
}

impl MappingList {
    /// First id handed out in a fresh process.
    pub const FIRST_ID: i32 = 1;

    pub const fn new() -> Self {
        Self {
            mappings: Vec::new(),
            next_id: Self::FIRST_ID,
        }
    }

    /// The id the next mapping will receive.
    #[inline]
    pub fn next_id(&self) -> MapId {
        MapId(self.next_id)
    }

    /// Append a mapping built with [`MappingList::next_id`].
    pub fn push(&mut self, mapping: Mapping) {
        debug_assert_eq!(mapping.id, self.next_id());
        self.next_id += 1;
        self.mappings.push(mapping);
    }

    pub fn find(&self, id: MapId) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    pub fn find_mut(&mut self, id: MapId) -> Option<&mut Mapping> {
        self.mappings.iter_mut().find(|m| m.id == id)
    }

    pub(crate) fn position(&self, id: MapId) -> Option<usize> {
        self.mappings.iter().position(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Mapping {
        &mut self.mappings[index]
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Mapping {
        self.mappings.remove(index)
    }

    /// Ids of every mapping, in creation order.
    pub fn ids(&self) -> Vec<MapId> {
        self.mappings.iter().map(|m| m.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for MappingList {
    fn default() -> Self {
        Self::new()
    }
}
