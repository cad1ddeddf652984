//! Per-Process Page Table
//!
//! Tracks every user page a process may touch: either resident (backed by a
//! kernel frame) or lazy (reserved for a file mapping that fills it on the
//! first fault).
//!
//! # Entry States
//! - Resident: `frame` present, `mapping` records the owning mapping, if any
//! - Lazy: no frame yet, `mapping` names the mapping that can fill it
//!
//! # Security Properties
//! - Writability is recorded per page and checked on every validated access
//! - The dirty bit is set only through kernel-mediated writes, so write-back
//!   never persists a page that was not modified

use alloc::collections::BTreeMap;

use bitflags::bitflags;

use super::address::VirtAddr;
use super::frame::Frame;
use super::mapping::MapId;

bitflags! {
    /// Software page table entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        /// User mode may write the page.
        const WRITABLE = 1 << 0;
        /// Page contents were modified since they were filled.
        const DIRTY = 1 << 1;
        /// Page was touched since it became resident.
        const ACCESSED = 1 << 2;
    }
}

/// A single page table entry.
#[derive(Debug)]
pub struct PageTableEntry {
    frame: Option<Frame>,
    mapping: Option<MapId>,
    flags: PteFlags,
}

impl PageTableEntry {
    /// A resident page with no backing mapping (stack, eagerly loaded data).
    pub fn anonymous(frame: Frame, writable: bool) -> Self {
        Self {
            frame: Some(frame),
            mapping: None,
            flags: writable_flag(writable),
        }
    }

    /// A not-yet-resident page owned by `mapping`.
    pub fn lazy(mapping: MapId, writable: bool) -> Self {
        Self {
            frame: None,
            mapping: Some(mapping),
            flags: writable_flag(writable),
        }
    }

    /// Check if the page is resident.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.frame.is_some()
    }

    /// Check if user mode may write the page.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PteFlags::WRITABLE)
    }

    /// Check if the page was modified since it was filled.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }

    /// The mapping this page belongs to, if any.
    #[inline]
    pub fn mapping(&self) -> Option<MapId> {
        self.mapping
    }

    /// Borrow the resident frame.
    #[inline]
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Borrow the resident frame for a write, marking the page dirty.
    pub fn frame_for_write(&mut self) -> Option<&mut Frame> {
        let frame = self.frame.as_mut()?;
        self.flags.insert(PteFlags::DIRTY | PteFlags::ACCESSED);
        Some(frame)
    }

    /// Mark the page accessed.
    #[inline]
    pub fn touch(&mut self) {
        self.flags.insert(PteFlags::ACCESSED);
    }

    /// Make a lazy page resident with freshly filled contents.
    pub fn make_resident(&mut self, frame: Frame) {
        self.frame = Some(frame);
        self.flags.remove(PteFlags::DIRTY);
        self.flags.insert(PteFlags::ACCESSED);
    }
}

fn writable_flag(writable: bool) -> PteFlags {
    if writable {
        PteFlags::WRITABLE
    } else {
        PteFlags::empty()
    }
}

/// Error type for page table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// The address is null or outside user space.
    NotUserAddress,
    /// The backing file could not be reopened or is empty.
    BadFile,
    /// No mapping with the requested id exists.
    UnknownMapping,
    /// The backed file range does not fit in a 32-bit offset.
    FileRange,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::NotUserAddress => write!(f, "address outside user space"),
            Self::BadFile => write!(f, "backing file unusable"),
            Self::UnknownMapping => write!(f, "no such mapping"),
            Self::FileRange => write!(f, "file range past 4 GiB"),
        }
    }
}

/// The page table of one process, keyed by virtual page number.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: BTreeMap<usize, PageTableEntry>,
}

impl PageTable {
    /// Create a new empty page table.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Look up the entry for the page containing `addr`.
    #[inline]
    pub fn lookup(&self, addr: VirtAddr) -> Option<&PageTableEntry> {
        self.entries.get(&addr.page_number())
    }

    /// Look up the entry for the page containing `addr` mutably.
    #[inline]
    pub fn lookup_mut(&mut self, addr: VirtAddr) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&addr.page_number())
    }

    /// Check if the page containing `addr` has no entry at all.
    #[inline]
    pub fn is_free(&self, addr: VirtAddr) -> bool {
        !self.entries.contains_key(&addr.page_number())
    }

    /// Install `entry` for the page at `upage`.
    ///
    /// Fails without touching the table if the page is already populated.
    pub fn install(&mut self, upage: VirtAddr, entry: PageTableEntry) -> Result<(), MappingError> {
        if !upage.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if !upage.is_user() {
            return Err(MappingError::NotUserAddress);
        }
        match self.entries.entry(upage.page_number()) {
            alloc::collections::btree_map::Entry::Occupied(_) => Err(MappingError::AlreadyMapped),
            alloc::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Reserve `upage` for lazy filling by `mapping`.
    #[inline]
    pub fn install_lazy(
        &mut self,
        upage: VirtAddr,
        mapping: MapId,
        writable: bool,
    ) -> Result<(), MappingError> {
        self.install(upage, PageTableEntry::lazy(mapping, writable))
    }

    /// Remove the entry for the page at `upage`, returning it.
    #[inline]
    pub fn unmap(&mut self, upage: VirtAddr) -> Option<PageTableEntry> {
        self.entries.remove(&upage.page_number())
    }

    /// Number of populated entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no page is populated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
