//! Page Fault Resolution
//!
//! What happens when validated access reaches a page that is not resident
//! is a build-time capability: with the `vm` feature, lazy pages are filled
//! from their mapping on demand; without it, every non-resident page is a
//! hard failure. Both strategies implement [`FaultPath`] and [`Active`]
//! names the one this kernel was built with.

use log::trace;

use super::address::VirtAddr;
use super::space::AddressSpace;
use crate::fs::FilesysLock;

/// Whether this build fills lazy pages on fault.
pub const DEMAND_PAGING: bool = cfg!(feature = "vm");

/// A page fault as seen by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct FaultContext {
    /// Faulting user address.
    pub addr: VirtAddr,
    /// The access was a write.
    pub write: bool,
    /// User stack pointer saved by the faulting trap.
    pub user_sp: VirtAddr,
}

/// Strategy for resolving a fault on a non-resident page.
pub trait FaultPath {
    /// Try to make the faulting page resident. Returns false if the access
    /// cannot be satisfied.
    fn resolve(space: &mut AddressSpace, fs: &FilesysLock, fault: FaultContext) -> bool;
}

/// Fill lazy pages from their backing mapping.
pub struct LazyFill;

impl FaultPath for LazyFill {
    fn resolve(space: &mut AddressSpace, fs: &FilesysLock, fault: FaultContext) -> bool {
        trace!(
            "[FAULT] {} access at {} (sp {})",
            if fault.write { "write" } else { "read" },
            fault.addr,
            fault.user_sp
        );
        space.fill_lazy(fs, fault.addr, fault.write)
    }
}

/// No demand paging: anything not resident is unreachable.
pub struct NoPaging;

impl FaultPath for NoPaging {
    fn resolve(_space: &mut AddressSpace, _fs: &FilesysLock, fault: FaultContext) -> bool {
        trace!("[FAULT] {} not resident, demand paging disabled", fault.addr);
        false
    }
}

/// The fault path selected at build time.
#[cfg(feature = "vm")]
pub type Active = LazyFill;

/// The fault path selected at build time.
#[cfg(not(feature = "vm"))]
pub type Active = NoPaging;
