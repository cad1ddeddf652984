//! Memory management for user processes
//!
//! Provides:
//! - User virtual address types and page geometry
//! - Per-process page tables with resident and lazy entries
//! - File-backed mappings (`mmap` regions and executable segments)
//! - The page fault path used by the user memory validator
//!
//! # Security Principles
//! - Every user page is zeroed before user mode can see it
//! - Mappings never overlap each other or already populated pages
//! - Only file-backed bytes of writable mappings are ever persisted

pub mod address;
pub mod fault;
pub mod frame;
pub mod mapping;
pub mod paging;
pub mod space;

pub use address::{VirtAddr, PAGE_SIZE, USER_TOP};
pub use fault::{FaultContext, FaultPath, DEMAND_PAGING};
pub use mapping::{MapId, Mapping, MappingKind, MAP_FAILED};
pub use paging::{MappingError, PageTable, PageTableEntry, PteFlags};
pub use space::AddressSpace;
