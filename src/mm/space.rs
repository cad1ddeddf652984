//! User Address Space
//!
//! Couples a process's page table with its list of file mappings and
//! implements the mapping manager on top of them: creating mappings
//! (explicit `mmap` and executable segments), filling lazy pages on fault,
//! and tearing mappings down with write-back.
//!
//! # Teardown Ordering
//! - A dirty, writable, resident page is written back before it is dropped
//! - A mapping leaves the list only after every page in its range has been
//!   processed; a page that fails to unmap does not stop the others

use alloc::vec::Vec;

use log::{debug, warn};

use super::address::{VirtAddr, PAGE_SIZE, USER_TOP};
use super::fault::DEMAND_PAGING;
use super::frame::Frame;
use super::mapping::{MapId, Mapping, MappingList};
use super::paging::{MappingError, PageTable, PageTableEntry};
use crate::fs::{File, FileBox, FilesysLock};

/// The user half of a process's memory.
#[derive(Debug, Default)]
pub struct AddressSpace {
    table: PageTable,
    mappings: MappingList,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            table: PageTable::new(),
            mappings: MappingList::new(),
        }
    }

    #[inline]
    pub fn page_table(&self) -> &PageTable {
        &self.table
    }

    #[inline]
    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.table
    }

    #[inline]
    pub fn mappings(&self) -> &MappingList {
        &self.mappings
    }

    /// Install a zeroed resident page not backed by any file (stack, data
    /// the loader populated itself).
    pub fn map_anonymous(&mut self, upage: VirtAddr, writable: bool) -> Result<(), MappingError> {
        self.table
            .install(upage, PageTableEntry::anonymous(Frame::alloc_zeroed(), writable))
    }

    /// Check that `pages` pages from `base` lie in user space and are all
    /// unpopulated.
    pub fn range_is_free(&self, base: VirtAddr, pages: usize) -> bool {
        self.check_range(base, pages).is_ok()
    }

    fn check_range(&self, base: VirtAddr, pages: usize) -> Result<(), MappingError> {
        match base.checked_add_pages(pages) {
            Some(end) if base.is_user() && end.as_usize() <= USER_TOP => {}
            _ => return Err(MappingError::NotUserAddress),
        }
        let occupied = (0..pages).any(|i| !self.table.is_free(VirtAddr::new(base.as_usize() + i * PAGE_SIZE)));
        if occupied {
            return Err(MappingError::AlreadyMapped);
        }
        Ok(())
    }

    /// Map the whole of `file` at `addr`.
    ///
    /// The file is reopened so the mapping survives the descriptor being
    /// closed. On any failure nothing is left installed.
    pub fn mmap(&mut self, fs: &FilesysLock, file: &dyn File, addr: VirtAddr) -> Result<MapId, MappingError> {
        if addr.is_null() || !addr.is_user() {
            return Err(MappingError::NotUserAddress);
        }
        if !addr.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        let file = fs.reopen(file).ok_or(MappingError::BadFile)?;
        let length = fs.length(file.as_ref());
        if length == 0 {
            fs.close(file);
            return Err(MappingError::BadFile);
        }
        let mapping = Mapping::for_file(self.mappings.next_id(), addr, file, length);
        self.install_mapping(fs, mapping)
    }

    /// Map an executable segment lazily.
    ///
    /// `read_bytes` bytes come from `file` at `offset`; the following
    /// `zero_bytes` are zero fill. The mapping takes ownership of `file`.
    /// Without demand paging every page is filled immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn load_segment(
        &mut self,
        fs: &FilesysLock,
        file: FileBox,
        offset: u32,
        upage: VirtAddr,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
    ) -> Result<MapId, MappingError> {
        if !upage.is_aligned() {
            fs.close(file);
            return Err(MappingError::MisalignedAddress);
        }
        let id = self.mappings.next_id();
        let mapping = match Mapping::for_segment(id, upage, file, offset, read_bytes, zero_bytes, writable) {
            Ok(mapping) => mapping,
            Err((err, file)) => {
                fs.close(file);
                return Err(err);
            }
        };
        let id = self.install_mapping(fs, mapping)?;
        if !DEMAND_PAGING {
            self.populate(fs, id)?;
        }
        Ok(id)
    }

    /// Reserve every page of `mapping` and append it to the list.
    fn install_mapping(&mut self, fs: &FilesysLock, mapping: Mapping) -> Result<MapId, MappingError> {
        if let Err(err) = self.check_range(mapping.base(), mapping.total_pages()) {
            debug!("[MMAP] range at {} ({} pages) rejected: {}", mapping.base(), mapping.total_pages(), err);
            fs.close(mapping.into_file());
            return Err(err);
        }

        let id = mapping.id();
        let writable = mapping.is_writable();
        let pages: Vec<VirtAddr> = mapping.pages().collect();
        let mut installed = Vec::with_capacity(pages.len());
        for upage in pages {
            if let Err(err) = self.table.install_lazy(upage, id, writable) {
                for page in installed {
                    self.table.unmap(page);
                }
                fs.close(mapping.into_file());
                return Err(err);
            }
            installed.push(upage);
        }

        debug!(
            "[MMAP] map {}: {} pages at {} ({} backed, tail {})",
            id.as_i32(),
            mapping.total_pages(),
            mapping.base(),
            mapping.page_count(),
            mapping.tail_bytes()
        );
        self.mappings.push(mapping);
        Ok(id)
    }

    /// Fault in every page of mapping `id`. On failure the whole mapping
    /// is removed again.
    fn populate(&mut self, fs: &FilesysLock, id: MapId) -> Result<(), MappingError> {
        let pages: Vec<VirtAddr> = match self.mappings.find(id) {
            Some(mapping) => mapping.pages().collect(),
            None => return Err(MappingError::UnknownMapping),
        };
        for upage in pages {
            if !self.fill_lazy(fs, upage, false) {
                if let Err(err) = self.munmap(fs, id) {
                    debug!("[MMAP] map {}: partial load released: {}", id.as_i32(), err);
                }
                return Err(MappingError::NotMapped);
            }
        }
        Ok(())
    }

    /// Make the lazy page containing `addr` resident.
    ///
    /// Fails if no mapping covers the page or a write is attempted on a
    /// read-only page. A page that is already resident only gets the
    /// permission check.
    pub fn fill_lazy(&mut self, fs: &FilesysLock, addr: VirtAddr, write: bool) -> bool {
        let entry = match self.table.lookup_mut(addr) {
            Some(entry) => entry,
            None => return false,
        };
        if write && !entry.is_writable() {
            return false;
        }
        if entry.is_present() {
            return true;
        }
        let mapping = match entry.mapping().and_then(|id| self.mappings.find_mut(id)) {
            Some(mapping) => mapping,
            None => return false,
        };

        let upage = addr.align_down();
        let mut frame = Frame::alloc_zeroed();
        mapping.fill(fs, upage, &mut frame);
        entry.make_resident(frame);
        true
    }

    /// Remove mapping `id`, writing back dirty pages.
    ///
    /// Every page is processed even if one fails; the first failure is
    /// reported after the mapping has been released.
    pub fn munmap(&mut self, fs: &FilesysLock, id: MapId) -> Result<(), MappingError> {
        let index = self.mappings.position(id).ok_or(MappingError::UnknownMapping)?;
        let mapping = self.mappings.get_mut(index);
        let pages: Vec<VirtAddr> = mapping.pages().collect();

        let mut first_error = None;
        for upage in pages {
            if let Err(err) = release_page(&mut self.table, mapping, fs, upage) {
                warn!("[MMAP] map {}: unmap of {} failed: {}", id.as_i32(), upage, err);
                first_error.get_or_insert(err);
            }
        }

        let mapping = self.mappings.remove_at(index);
        fs.close(mapping.into_file());
        debug!("[MMAP] map {}: released", id.as_i32());
        first_error.map_or(Ok(()), Err)
    }

    /// Tear down the whole address space: every mapping with write-back,
    /// then every remaining page.
    pub fn release(&mut self, fs: &FilesysLock) -> Result<(), MappingError> {
        let mut first_error = None;
        for id in self.mappings.ids() {
            if let Err(err) = self.munmap(fs, id) {
                first_error.get_or_insert(err);
            }
        }
        self.table = PageTable::new();
        first_error.map_or(Ok(()), Err)
    }

    /// Read one byte of resident user memory.
    pub fn read_byte(&mut self, addr: VirtAddr) -> Option<u8> {
        let entry = self.table.lookup_mut(addr)?;
        entry.touch();
        entry.frame().map(|frame| frame.as_bytes()[addr.page_offset()])
    }

    /// Copy resident user memory at `addr` into `buf`.
    pub fn copy_from_user(&mut self, addr: VirtAddr, buf: &mut [u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < buf.len() {
            let cur = addr.checked_add(done).ok_or(MappingError::NotUserAddress)?;
            let entry = self.table.lookup_mut(cur).ok_or(MappingError::NotMapped)?;
            entry.touch();
            let frame = entry.frame().ok_or(MappingError::NotMapped)?;
            let start = cur.page_offset();
            let n = (PAGE_SIZE - start).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&frame.as_bytes()[start..start + n]);
            done += n;
        }
        Ok(())
    }

    /// Copy `data` into resident, writable user memory at `addr`, marking
    /// each touched page dirty.
    pub fn copy_to_user(&mut self, addr: VirtAddr, data: &[u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < data.len() {
            let cur = addr.checked_add(done).ok_or(MappingError::NotUserAddress)?;
            let entry = self.table.lookup_mut(cur).ok_or(MappingError::NotMapped)?;
            if !entry.is_writable() {
                return Err(MappingError::NotMapped);
            }
            let frame = entry.frame_for_write().ok_or(MappingError::NotMapped)?;
            let start = cur.page_offset();
            let n = (PAGE_SIZE - start).min(data.len() - done);
            frame.as_bytes_mut()[start..start + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }
}

/// Drop one page of `mapping`, writing it back first if needed.
fn release_page(
    table: &mut PageTable,
    mapping: &mut Mapping,
    fs: &FilesysLock,
    upage: VirtAddr,
) -> Result<(), MappingError> {
    match table.lookup(upage) {
        Some(entry) if entry.mapping() == Some(mapping.id()) => {}
        _ => return Err(MappingError::NotMapped),
    }
    let entry = table.unmap(upage).ok_or(MappingError::NotMapped)?;
    if entry.is_dirty() && entry.is_writable() {
        if let Some(frame) = entry.frame() {
            mapping.write_back(fs, upage, frame);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemFs;
    use alloc::boxed::Box;
    use alloc::vec;

    const BASE: usize = 0x1000_0000;

    fn setup(name: &str, contents: &[u8]) -> (MemFs, FilesysLock, FileBox) {
        let fs = MemFs::new();
        fs.insert(name, contents);
        let lock = FilesysLock::new(Box::new(fs.clone()));
        let file = lock.open(name).unwrap();
        (fs, lock, file)
    }

    #[test]
    fn test_mmap_installs_lazy_pages() {
        let (_fs, lock, file) = setup("f", &[1u8; 2 * PAGE_SIZE + 1]);
        let mut space = AddressSpace::new();
        let id = space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)).unwrap();

        assert_eq!(space.mappings().len(), 1);
        assert_eq!(space.page_table().len(), 3);
        for i in 0..3 {
            let entry = space.page_table().lookup(VirtAddr::new(BASE + i * PAGE_SIZE)).unwrap();
            assert!(!entry.is_present());
            assert_eq!(entry.mapping(), Some(id));
        }
        assert!(space.page_table().is_free(VirtAddr::new(BASE + 3 * PAGE_SIZE)));
    }

    #[test]
    fn test_mmap_rejects_misaligned_and_null() {
        let (_fs, lock, file) = setup("f", b"data");
        let mut space = AddressSpace::new();
        assert_eq!(
            space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE + 1)),
            Err(MappingError::MisalignedAddress)
        );
        assert_eq!(
            space.mmap(&lock, file.as_ref(), VirtAddr::NULL),
            Err(MappingError::NotUserAddress)
        );
        assert!(space.page_table().is_empty());
        assert!(space.mappings().is_empty());
    }

    #[test]
    fn test_mmap_rejects_empty_file() {
        let (_fs, lock, file) = setup("empty", b"");
        let mut space = AddressSpace::new();
        assert_eq!(
            space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)),
            Err(MappingError::BadFile)
        );
    }

    #[test]
    fn test_mmap_overlap_leaves_existing_untouched() {
        let (_fs, lock, file) = setup("f", &[3u8; 2 * PAGE_SIZE]);
        let mut space = AddressSpace::new();
        let first = space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)).unwrap();
        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE), false));

        assert_eq!(
            space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE + PAGE_SIZE)),
            Err(MappingError::AlreadyMapped)
        );
        assert_eq!(space.mappings().ids(), vec![first]);
        assert_eq!(space.page_table().len(), 2);
        assert!(space.page_table().lookup(VirtAddr::new(BASE)).unwrap().is_present());
        assert!(space.page_table().is_free(VirtAddr::new(BASE + 2 * PAGE_SIZE)));
    }

    #[test]
    fn test_mmap_rejects_range_crossing_user_top() {
        let (_fs, lock, file) = setup("f", &[0u8; 2 * PAGE_SIZE]);
        let mut space = AddressSpace::new();
        let addr = VirtAddr::new(USER_TOP - PAGE_SIZE);
        assert_eq!(
            space.mmap(&lock, file.as_ref(), addr),
            Err(MappingError::NotUserAddress)
        );
        assert!(space.page_table().is_empty());
    }

    #[test]
    fn test_round_trip_write_back() {
        let (fs, lock, file) = setup("f", b"hello world");
        let mut space = AddressSpace::new();
        let id = space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)).unwrap();
        lock.close(file);

        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE), true));
        space.copy_to_user(VirtAddr::new(BASE), b"J").unwrap();
        space.copy_to_user(VirtAddr::new(BASE + 100), b"beyond").unwrap();
        space.munmap(&lock, id).unwrap();

        assert_eq!(fs.contents("f").unwrap(), b"Jello world");
        assert!(space.page_table().is_empty());
        assert!(space.mappings().is_empty());
    }

    #[test]
    fn test_clean_pages_not_written_back() {
        let (fs, lock, file) = setup("f", b"abc");
        let mut space = AddressSpace::new();
        let id = space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)).unwrap();
        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE), false));
        fs.insert("f", b"xyz");
        space.munmap(&lock, id).unwrap();
        assert_eq!(fs.contents("f").unwrap(), b"xyz");
    }

    #[test]
    fn test_munmap_unknown_id() {
        let (_fs, lock, _file) = setup("f", b"abc");
        let mut space = AddressSpace::new();
        assert_eq!(space.munmap(&lock, MapId::new(7)), Err(MappingError::UnknownMapping));
    }

    #[test]
    fn test_munmap_continues_after_missing_page() {
        let (fs, lock, file) = setup("f", &[0u8; 3 * PAGE_SIZE]);
        let mut space = AddressSpace::new();
        let id = space.mmap(&lock, file.as_ref(), VirtAddr::new(BASE)).unwrap();

        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE + 2 * PAGE_SIZE), true));
        space.copy_to_user(VirtAddr::new(BASE + 2 * PAGE_SIZE), b"Z").unwrap();
        space.page_table_mut().unmap(VirtAddr::new(BASE));

        assert_eq!(space.munmap(&lock, id), Err(MappingError::NotMapped));
        assert!(space.mappings().is_empty());
        assert!(space.page_table().is_empty());
        assert_eq!(fs.contents("f").unwrap()[2 * PAGE_SIZE], b'Z');
    }

    #[test]
    fn test_segment_write_fault_on_read_only() {
        let (_fs, lock, file) = setup("prog", &[0x90u8; PAGE_SIZE]);
        let mut space = AddressSpace::new();
        space
            .load_segment(&lock, file, 0, VirtAddr::new(BASE), 100, (PAGE_SIZE - 100) as u32, false)
            .unwrap();
        assert!(!space.fill_lazy(&lock, VirtAddr::new(BASE), true));
        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE), false));
        assert_eq!(space.read_byte(VirtAddr::new(BASE + 99)), Some(0x90));
        assert_eq!(space.read_byte(VirtAddr::new(BASE + 100)), Some(0));
        assert!(space.copy_to_user(VirtAddr::new(BASE), b"x").is_err());
    }

    #[test]
    fn test_failed_populate_leaves_nothing() {
        let (_fs, lock, file) = setup("prog", &[0x90u8; 2 * PAGE_SIZE]);
        let mut space = AddressSpace::new();
        let id = space
            .load_segment(&lock, file, 0, VirtAddr::new(BASE), 2 * PAGE_SIZE as u32, 0, true)
            .unwrap();
        space.page_table_mut().unmap(VirtAddr::new(BASE + PAGE_SIZE));

        assert_eq!(space.populate(&lock, id), Err(MappingError::NotMapped));
        assert!(space.mappings().is_empty());
        assert!(space.page_table().is_empty());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_release_writes_back_all_mappings() {
        let fs = MemFs::new();
        fs.insert("a", b"aaaa");
        fs.insert("b", b"bbbb");
        let lock = FilesysLock::new(Box::new(fs.clone()));
        let a = lock.open("a").unwrap();
        let b = lock.open("b").unwrap();

        let mut space = AddressSpace::new();
        space.map_anonymous(VirtAddr::new(0xBFFF_F000), true).unwrap();
        space.mmap(&lock, a.as_ref(), VirtAddr::new(BASE)).unwrap();
        space.mmap(&lock, b.as_ref(), VirtAddr::new(BASE + PAGE_SIZE)).unwrap();
        assert!(space.fill_lazy(&lock, VirtAddr::new(BASE + PAGE_SIZE), true));
        space.copy_to_user(VirtAddr::new(BASE + PAGE_SIZE + 3), b"!").unwrap();

        space.release(&lock).unwrap();
        assert!(space.page_table().is_empty());
        assert!(space.mappings().is_empty());
        assert_eq!(fs.contents("a").unwrap(), b"aaaa");
        assert_eq!(fs.contents("b").unwrap(), b"bbb!");
    }

    #[test]
    fn test_copy_across_pages() {
        let mut space = AddressSpace::new();
        space.map_anonymous(VirtAddr::new(BASE), true).unwrap();
        space.map_anonymous(VirtAddr::new(BASE + PAGE_SIZE), true).unwrap();
        let addr = VirtAddr::new(BASE + PAGE_SIZE - 2);
        space.copy_to_user(addr, b"abcd").unwrap();
        let mut out = [0u8; 4];
        space.copy_from_user(addr, &mut out).unwrap();
        assert_eq!(&out, b"abcd");
        assert!(space.copy_from_user(VirtAddr::new(BASE + 2 * PAGE_SIZE - 1), &mut out).is_err());
    }
}
