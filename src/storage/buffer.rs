use super::disk::FileManager;
use super::page::{Page, PageType};
use super::replacer::{FrameId, LruReplacer};
use super::{PageId, StorageError, INVALID_PAGE_ID, PAGE_HEADER_SIZE, PAGE_ID_OF_METADATA};
use itertools::Itertools;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::convert::TryInto;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

pub type PageRef = Rc<RefCell<Page>>;

pub const DEFAULT_POOL_SIZE: usize = 64;

///
/// Metadata page (id 1) body layout, after the common page header:
///
/// ```text
/// | freelist_head | next_table_id | next_index_id |
/// | catalog_tables_root | catalog_columns_root | catalog_indexes_root |
/// ```
///
/// Freed pages are threaded into a singly linked list: each free page
/// stores the id of the next free page in its body, the metadata page
/// holds the head.
///
const FREELIST_HEAD: Range<usize> = PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 4;
const NEXT_TABLE_ID: Range<usize> = PAGE_HEADER_SIZE + 4..PAGE_HEADER_SIZE + 8;
const NEXT_INDEX_ID: Range<usize> = PAGE_HEADER_SIZE + 8..PAGE_HEADER_SIZE + 12;
const CATALOG_TABLES_ROOT: Range<usize> = PAGE_HEADER_SIZE + 12..PAGE_HEADER_SIZE + 16;
const CATALOG_COLUMNS_ROOT: Range<usize> = PAGE_HEADER_SIZE + 16..PAGE_HEADER_SIZE + 20;
const CATALOG_INDEXES_ROOT: Range<usize> = PAGE_HEADER_SIZE + 20..PAGE_HEADER_SIZE + 24;
const FREE_PAGE_NEXT: Range<usize> = PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 4;

pub struct PageManager {
    disk: FileManager,
    replacer: LruReplacer,
    frames: Vec<PageRef>,
    page_table: HashMap<PageId, FrameId>,
}

pub type PageManagerRef = Rc<RefCell<PageManager>>;

impl Drop for PageManager {
    fn drop(&mut self) {
        for (&page_id, &frame_id) in self.page_table.iter() {
            let page = self.frames[frame_id].borrow();
            if page.is_dirty {
                let _ = self.disk.write_page(page_id, &page.buffer);
            }
        }
    }
}

/// A pinned page. The pin is released when the guard goes out of scope,
/// on every exit path.
pub struct PageGuard {
    pm: PageManagerRef,
    page: PageRef,
    page_id: PageId,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
    pub fn borrow(&self) -> Ref<Page> {
        self.page.borrow()
    }
    pub fn borrow_mut(&self) -> RefMut<Page> {
        self.page.borrow_mut()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let _ = self.pm.borrow_mut().unpin(self.page_id);
    }
}

impl PageManager {
    pub fn open(
        path: impl AsRef<Path>,
        create_if_missing: bool,
        capacity: usize,
    ) -> Result<Self, StorageError> {
        let disk = FileManager::open(path, create_if_missing)?;
        let frames = (0..capacity)
            .map(|_| Rc::new(RefCell::new(Page::new())))
            .collect_vec();
        let mut pm = Self {
            disk,
            replacer: LruReplacer::new(capacity),
            frames,
            page_table: HashMap::new(),
        };
        pm.bootstrap_metadata()?;
        Ok(pm)
    }
    pub fn open_shared(
        path: impl AsRef<Path>,
        create_if_missing: bool,
        capacity: usize,
    ) -> Result<PageManagerRef, StorageError> {
        Ok(Rc::new(RefCell::new(Self::open(
            path,
            create_if_missing,
            capacity,
        )?)))
    }
    fn bootstrap_metadata(&mut self) -> Result<(), StorageError> {
        if self.disk.page_count() > 0 {
            return Ok(());
        }
        let page_id = self.disk.allocate_page()?;
        debug_assert_eq!(page_id, PAGE_ID_OF_METADATA);
        let page = self.fetch_page(page_id)?;
        {
            let mut page = page.borrow_mut();
            page.init(PageType::Metadata, page_id);
            page.buffer[NEXT_TABLE_ID].copy_from_slice(&1u32.to_le_bytes());
            page.buffer[NEXT_INDEX_ID].copy_from_slice(&1u32.to_le_bytes());
        }
        self.unpin(page_id)
    }

    pub fn page_count(&self) -> PageId {
        self.disk.page_count()
    }
    pub fn path(&self) -> &Path {
        self.disk.path()
    }

    /// pick a frame for a new resident page, writing back the evicted one
    fn take_frame(&mut self) -> Result<FrameId, StorageError> {
        let frame_id = self.replacer.victim()?;
        let evicted = self.frames[frame_id].borrow().page_id;
        if let Some(evicted_id) = evicted {
            if self.frames[frame_id].borrow().is_dirty {
                let page = self.frames[frame_id].borrow();
                self.disk.write_page(evicted_id, &page.buffer)?;
            }
            self.page_table.remove(&evicted_id);
        }
        Ok(frame_id)
    }

    fn fetch_page(&mut self, page_id: PageId) -> Result<PageRef, StorageError> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page = self.frames[frame_id].clone();
            self.replacer.pin(frame_id);
            page.borrow_mut().pin_count += 1;
            return Ok(page);
        }
        if page_id == INVALID_PAGE_ID || page_id > self.disk.page_count() {
            return Err(StorageError::PageIdOutOfBound(page_id));
        }
        let frame_id = self.take_frame()?;
        let page = self.frames[frame_id].clone();
        {
            let mut page = page.borrow_mut();
            page.page_id = Some(page_id);
            page.pin_count = 1;
            page.is_dirty = false;
            self.disk.read_page(page_id, &mut page.buffer)?;
        }
        self.replacer.pin(frame_id);
        self.page_table.insert(page_id, frame_id);
        Ok(page)
    }

    pub fn unpin(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or_else(|| StorageError::Internal(format!("unpin of non-resident page {}", page_id)))?;
        let page = self.frames[frame_id].clone();
        let mut page = page.borrow_mut();
        if page.pin_count == 0 {
            return Err(StorageError::Internal(format!(
                "unpin of unpinned page {}",
                page_id
            )));
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// pop a page off the freelist or grow the file, then re-initialize
    /// its header for `page_type`
    fn new_page_raw(&mut self, page_type: PageType) -> Result<PageRef, StorageError> {
        if let Some(free_id) = self.freelist_head()? {
            let page = self.fetch_page(free_id)?;
            let next = {
                let page = page.borrow();
                u32::from_le_bytes(page.buffer[FREE_PAGE_NEXT].try_into().unwrap())
            };
            self.set_freelist_head(next)?;
            page.borrow_mut().init(page_type, free_id);
            return Ok(page);
        }
        let page_id = self.disk.allocate_page()?;
        let frame_id = self.take_frame()?;
        let page = self.frames[frame_id].clone();
        {
            let mut page = page.borrow_mut();
            page.page_id = Some(page_id);
            page.pin_count = 1;
            page.buffer.fill(0);
            page.init(page_type, page_id);
        }
        self.replacer.pin(frame_id);
        self.page_table.insert(page_id, frame_id);
        Ok(page)
    }

    /// return the freed page to the freelist; its body is left as-is
    /// until reuse
    pub fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let page = self.fetch_page(page_id)?;
        if page.borrow().pin_count != 1 {
            self.unpin(page_id)?;
            return Err(StorageError::Internal(format!(
                "freeing pinned page {}",
                page_id
            )));
        }
        let head = self.freelist_head()?.unwrap_or(INVALID_PAGE_ID);
        {
            let mut page = page.borrow_mut();
            page.set_page_type(PageType::Invalid);
            page.buffer[FREE_PAGE_NEXT].copy_from_slice(&head.to_le_bytes());
            page.is_dirty = true;
        }
        self.unpin(page_id)?;
        self.set_freelist_head(page_id)
    }

    pub fn flush_all(&mut self) -> Result<(), StorageError> {
        for (&page_id, &frame_id) in self.page_table.iter() {
            let mut page = self.frames[frame_id].borrow_mut();
            if page.is_dirty && page.pin_count == 0 {
                self.disk.write_page(page_id, &page.buffer)?;
                page.is_dirty = false;
            }
        }
        Ok(())
    }

    // metadata page accessors

    fn read_meta(&mut self, field: Range<usize>) -> Result<u32, StorageError> {
        let page = self.fetch_page(PAGE_ID_OF_METADATA)?;
        let value = u32::from_le_bytes(page.borrow().buffer[field].try_into().unwrap());
        self.unpin(PAGE_ID_OF_METADATA)?;
        Ok(value)
    }
    fn write_meta(&mut self, field: Range<usize>, value: u32) -> Result<(), StorageError> {
        let page = self.fetch_page(PAGE_ID_OF_METADATA)?;
        {
            let mut page = page.borrow_mut();
            page.buffer[field].copy_from_slice(&value.to_le_bytes());
            page.is_dirty = true;
        }
        self.unpin(PAGE_ID_OF_METADATA)
    }

    fn freelist_head(&mut self) -> Result<Option<PageId>, StorageError> {
        match self.read_meta(FREELIST_HEAD)? {
            INVALID_PAGE_ID => Ok(None),
            head => Ok(Some(head)),
        }
    }
    fn set_freelist_head(&mut self, head: PageId) -> Result<(), StorageError> {
        self.write_meta(FREELIST_HEAD, head)
    }
    pub fn take_next_table_id(&mut self) -> Result<u32, StorageError> {
        let id = self.read_meta(NEXT_TABLE_ID)?;
        self.write_meta(NEXT_TABLE_ID, id + 1)?;
        Ok(id)
    }
    pub fn take_next_index_id(&mut self) -> Result<u32, StorageError> {
        let id = self.read_meta(NEXT_INDEX_ID)?;
        self.write_meta(NEXT_INDEX_ID, id + 1)?;
        Ok(id)
    }
    pub fn catalog_tables_root(&mut self) -> Result<PageId, StorageError> {
        self.read_meta(CATALOG_TABLES_ROOT)
    }
    pub fn set_catalog_tables_root(&mut self, page_id: PageId) -> Result<(), StorageError> {
        self.write_meta(CATALOG_TABLES_ROOT, page_id)
    }
    pub fn catalog_columns_root(&mut self) -> Result<PageId, StorageError> {
        self.read_meta(CATALOG_COLUMNS_ROOT)
    }
    pub fn set_catalog_columns_root(&mut self, page_id: PageId) -> Result<(), StorageError> {
        self.write_meta(CATALOG_COLUMNS_ROOT, page_id)
    }
    pub fn catalog_indexes_root(&mut self) -> Result<PageId, StorageError> {
        self.read_meta(CATALOG_INDEXES_ROOT)
    }
    pub fn set_catalog_indexes_root(&mut self, page_id: PageId) -> Result<(), StorageError> {
        self.write_meta(CATALOG_INDEXES_ROOT, page_id)
    }

    // guarded entry points

    pub fn fetch(pm: &PageManagerRef, page_id: PageId) -> Result<PageGuard, StorageError> {
        let page = pm.borrow_mut().fetch_page(page_id)?;
        Ok(PageGuard {
            pm: pm.clone(),
            page,
            page_id,
        })
    }
    pub fn new_page(pm: &PageManagerRef, page_type: PageType) -> Result<PageGuard, StorageError> {
        let page = pm.borrow_mut().new_page_raw(page_type)?;
        let page_id = page
            .borrow()
            .page_id
            .ok_or_else(|| StorageError::Internal("allocated page without id".to_string()))?;
        Ok(PageGuard {
            pm: pm.clone(),
            page,
            page_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;
    use rand::Rng;
    use std::fs::remove_file;

    fn open_temp(capacity: usize) -> (PageManagerRef, std::path::PathBuf) {
        let path = crate::test_util::temp_path("pm");
        let pm = PageManager::open_shared(&path, true, capacity).unwrap();
        (pm, path)
    }

    #[test]
    fn new_page_write_read_back() {
        let (pm, path) = open_temp(4);
        let mut contents = vec![];
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let guard = PageManager::new_page(&pm, PageType::Data).unwrap();
            let mut bytes = vec![0u8; 64];
            rng.fill(&mut bytes[..]);
            guard.borrow_mut().insert(&bytes).unwrap();
            contents.push((guard.page_id(), bytes));
        }
        // far more pages than frames, so reads go through eviction
        for (page_id, bytes) in contents {
            let guard = PageManager::fetch(&pm, page_id).unwrap();
            assert_eq!(guard.borrow().read(0).unwrap(), bytes);
        }
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn all_pinned_fails() {
        let (pm, path) = open_temp(2);
        let _g1 = PageManager::new_page(&pm, PageType::Data).unwrap();
        let _g2 = PageManager::new_page(&pm, PageType::Data).unwrap();
        assert!(PageManager::new_page(&pm, PageType::Data).is_err());
        drop(_g1);
        drop(_g2);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn free_pages_are_reused() {
        let (pm, path) = open_temp(8);
        let mut ids = vec![];
        for _ in 0..10 {
            let guard = PageManager::new_page(&pm, PageType::Data).unwrap();
            ids.push(guard.page_id());
        }
        let count_before = pm.borrow().page_count();
        for &id in &ids {
            pm.borrow_mut().free_page(id).unwrap();
        }
        for _ in 0..10 {
            let _ = PageManager::new_page(&pm, PageType::Data).unwrap();
        }
        assert_eq!(pm.borrow().page_count(), count_before);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn metadata_counters_persist() {
        let path = {
            let (pm, path) = open_temp(4);
            assert_eq!(pm.borrow_mut().take_next_table_id().unwrap(), 1);
            assert_eq!(pm.borrow_mut().take_next_table_id().unwrap(), 2);
            assert_eq!(pm.borrow_mut().take_next_index_id().unwrap(), 1);
            pm.borrow_mut().set_catalog_tables_root(7).unwrap();
            path
        };
        let pm = PageManager::open_shared(&path, false, 4).unwrap();
        assert_eq!(pm.borrow_mut().take_next_table_id().unwrap(), 3);
        assert_eq!(pm.borrow_mut().catalog_tables_root().unwrap(), 7);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn guard_releases_pin() {
        let (pm, path) = open_temp(1);
        {
            let _guard = PageManager::new_page(&pm, PageType::Data).unwrap();
        }
        // the single frame is reusable again
        let guard = PageManager::new_page(&pm, PageType::Data).unwrap();
        assert!(guard.borrow().buffer.len() == PAGE_SIZE);
        drop(guard);
        drop(pm);
        remove_file(path).unwrap();
    }
}
