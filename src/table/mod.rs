use crate::record::RecordError;
use crate::storage::{
    PageGuard, PageId, PageManager, PageManagerRef, PageType, RowLocation, StorageError,
    INVALID_PAGE_ID, PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_SIZE,
};
use thiserror::Error;

mod migration;

pub use migration::{free_chain, rewrite, ColumnSpec};

/// A table heap is a doubly linked chain of DATA pages identified by its
/// root page. Inserts go to the cached tail and spill into freshly
/// allocated pages linked at the end of the chain.
pub struct TableHeap {
    pm: PageManagerRef,
    root_page_id: PageId,
    tail_page_id: PageId,
}

const MAX_PAYLOAD: usize = PAGE_SIZE - PAGE_HEADER_SIZE - SLOT_SIZE;

impl TableHeap {
    pub fn create(pm: PageManagerRef) -> Result<Self, TableError> {
        let guard = PageManager::new_page(&pm, PageType::Data)?;
        let root_page_id = guard.page_id();
        drop(guard);
        Ok(Self {
            pm,
            root_page_id,
            tail_page_id: root_page_id,
        })
    }
    pub fn open(pm: PageManagerRef, root_page_id: PageId) -> Self {
        Self {
            pm,
            root_page_id,
            tail_page_id: root_page_id,
        }
    }
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn insert(&mut self, payload: &[u8]) -> Result<RowLocation, TableError> {
        if payload.len() > u16::MAX as usize || payload.len() > MAX_PAYLOAD {
            return Err(TableError::Storage(StorageError::RecordTooLarge(
                payload.len(),
            )));
        }
        let mut page_id = self.tail_page_id;
        loop {
            let guard = PageManager::fetch(&self.pm, page_id)?;
            let inserted = guard.borrow_mut().insert(payload);
            match inserted {
                Ok(slot_id) => {
                    self.tail_page_id = page_id;
                    return Ok(RowLocation { page_id, slot_id });
                }
                Err(StorageError::PageFull(_)) => {
                    let next = guard.borrow().next_page_id();
                    if next != INVALID_PAGE_ID {
                        page_id = next;
                        continue;
                    }
                    let new_guard = PageManager::new_page(&self.pm, PageType::Data)?;
                    let new_page_id = new_guard.page_id();
                    guard.borrow_mut().set_next_page_id(new_page_id);
                    new_guard.borrow_mut().set_prev_page_id(page_id);
                    let slot_id = new_guard.borrow_mut().insert(payload)?;
                    self.tail_page_id = new_page_id;
                    return Ok(RowLocation {
                        page_id: new_page_id,
                        slot_id,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn read(&self, loc: RowLocation) -> Result<Vec<u8>, TableError> {
        let guard = PageManager::fetch(&self.pm, loc.page_id)?;
        let payload = guard.borrow().read(loc.slot_id)?;
        Ok(payload)
    }

    pub fn erase(&mut self, loc: RowLocation) -> Result<(), TableError> {
        let guard = PageManager::fetch(&self.pm, loc.page_id)?;
        let erased = guard.borrow_mut().erase(loc.slot_id);
        Ok(erased?)
    }

    /// In-place when the payload fits the slot; otherwise the row is
    /// relocated and the returned location differs from `loc`. Callers
    /// must propagate a relocation to every index.
    pub fn update(&mut self, loc: RowLocation, payload: &[u8]) -> Result<RowLocation, TableError> {
        {
            let guard = PageManager::fetch(&self.pm, loc.page_id)?;
            let updated = guard.borrow_mut().update(loc.slot_id, payload)?;
            if updated {
                return Ok(loc);
            }
        }
        self.erase(loc)?;
        self.insert(payload)
    }

    /// Reset the root page and free the rest of the chain.
    pub fn truncate(&mut self) -> Result<(), TableError> {
        let mut chain = vec![];
        {
            let guard = PageManager::fetch(&self.pm, self.root_page_id)?;
            let mut page_id = guard.borrow().next_page_id();
            let mut root = guard.borrow_mut();
            root.reset_slots();
            root.set_prev_page_id(INVALID_PAGE_ID);
            root.set_next_page_id(INVALID_PAGE_ID);
            drop(root);
            while page_id != INVALID_PAGE_ID {
                let guard = PageManager::fetch(&self.pm, page_id)?;
                chain.push(page_id);
                page_id = guard.borrow().next_page_id();
            }
        }
        for page_id in chain {
            self.pm.borrow_mut().free_page(page_id)?;
        }
        self.tail_page_id = self.root_page_id;
        Ok(())
    }

    pub fn iter(&self) -> TableHeapIter {
        TableHeapIter {
            pm: self.pm.clone(),
            next_page_id: self.root_page_id,
            current: None,
            slot_id: 0,
        }
    }
}

/// Walks chain pages in order, yielding every non-tombstoned record.
/// The single-threaded model forbids mutating the heap mid-iteration.
pub struct TableHeapIter {
    pm: PageManagerRef,
    next_page_id: PageId,
    current: Option<PageGuard>,
    slot_id: u16,
}

impl Iterator for TableHeapIter {
    type Item = Result<(RowLocation, Vec<u8>), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                if self.next_page_id == INVALID_PAGE_ID {
                    return None;
                }
                match PageManager::fetch(&self.pm, self.next_page_id) {
                    Ok(guard) => {
                        self.next_page_id = guard.borrow().next_page_id();
                        self.current = Some(guard);
                        self.slot_id = 0;
                    }
                    Err(e) => {
                        self.next_page_id = INVALID_PAGE_ID;
                        return Some(Err(e.into()));
                    }
                }
            }
            let guard = self.current.as_ref().unwrap();
            let page = guard.borrow();
            while self.slot_id < page.slot_count() {
                let slot_id = self.slot_id;
                self.slot_id += 1;
                if page.is_live(slot_id) {
                    let loc = RowLocation {
                        page_id: guard.page_id(),
                        slot_id,
                    };
                    let payload = match page.read(slot_id) {
                        Ok(payload) => payload,
                        Err(e) => return Some(Err(e.into())),
                    };
                    return Some(Ok((loc, payload)));
                }
            }
            drop(page);
            self.current = None;
        }
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),
    #[error("RecordError: {0}")]
    Record(#[from] RecordError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageManager;
    use itertools::Itertools;
    use std::fs::remove_file;

    fn open_heap(capacity: usize) -> (TableHeap, PageManagerRef, std::path::PathBuf) {
        let path = crate::test_util::temp_path("heap");
        let pm = PageManager::open_shared(&path, true, capacity).unwrap();
        let heap = TableHeap::create(pm.clone()).unwrap();
        (heap, pm, path)
    }

    #[test]
    fn insert_read_erase() {
        let (mut heap, pm, path) = open_heap(8);
        let loc = heap.insert(b"alpha").unwrap();
        assert_eq!(heap.read(loc).unwrap(), b"alpha");
        heap.erase(loc).unwrap();
        assert!(heap.read(loc).is_err());
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn spills_across_pages() {
        let (mut heap, pm, path) = open_heap(8);
        let payload = vec![9u8; 512];
        let mut locs = vec![];
        for _ in 0..64 {
            locs.push(heap.insert(&payload).unwrap());
        }
        assert!(locs.iter().map(|loc| loc.page_id).unique().count() > 1);
        for loc in &locs {
            assert_eq!(heap.read(*loc).unwrap(), payload);
        }
        let scanned = heap.iter().map(|r| r.unwrap()).collect_vec();
        assert_eq!(scanned.len(), 64);
        assert_eq!(scanned.iter().map(|(loc, _)| *loc).collect_vec(), locs);
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn update_in_place_keeps_location() {
        let (mut heap, pm, path) = open_heap(8);
        let loc = heap.insert(b"abcdef").unwrap();
        let same = heap.update(loc, b"ab").unwrap();
        assert_eq!(same, loc);
        assert_eq!(heap.read(loc).unwrap(), b"ab");
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn update_relocates_when_grown() {
        let (mut heap, pm, path) = open_heap(8);
        let loc = heap.insert(b"ab").unwrap();
        let moved = heap.update(loc, b"abcdefghij").unwrap();
        assert_ne!(moved, loc);
        assert!(heap.read(loc).is_err());
        assert_eq!(heap.read(moved).unwrap(), b"abcdefghij");
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn truncate_resets_chain() {
        let (mut heap, pm, path) = open_heap(8);
        let payload = vec![1u8; 900];
        for _ in 0..32 {
            heap.insert(&payload).unwrap();
        }
        let pages_before = pm.borrow().page_count();
        heap.truncate().unwrap();
        assert_eq!(heap.iter().count(), 0);
        // the root is immediately reusable and freed pages get recycled
        for _ in 0..32 {
            heap.insert(&payload).unwrap();
        }
        assert_eq!(pm.borrow().page_count(), pages_before);
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn oversized_payload_rejected() {
        let (mut heap, pm, path) = open_heap(8);
        let payload = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            heap.insert(&payload),
            Err(TableError::Storage(StorageError::RecordTooLarge(_)))
        ));
        drop(heap);
        drop(pm);
        remove_file(path).unwrap();
    }
}
