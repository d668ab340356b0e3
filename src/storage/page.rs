use super::{PageId, SlotId, StorageError, INVALID_PAGE_ID, PAGE_SIZE};
use std::convert::TryInto;
use std::ops::Range;

///
/// Page Format:
///
/// ```text
/// | Header | Slot[0] | Slot[1] | ...
///                    ... | Data[1] | Data[0] |
/// ```
///
/// Header Format:
///
/// ```text
/// | page_type | page_id | slot_count | record_count |
/// | free_space_offset | prev_page_id | next_page_id |
/// ```
///
/// Slot Format:
///
/// ```text
/// | offset | length | flags |
/// ```
///
/// The slot directory grows forward from the header, record payloads grow
/// backward from the page tail. `free_space_offset` marks the end of the
/// slot directory. Erased slots keep their payload bytes and are marked
/// with a tombstone flag; space is reclaimed only by a page rewrite.
///

pub const PAGE_HEADER_SIZE: usize = 20;
pub const SLOT_SIZE: usize = 6;

const TOMBSTONE_FLAG: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Invalid,
    Metadata,
    Data,
    Index,
}

impl PageType {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Metadata => 1,
            Self::Data => 2,
            Self::Index => 3,
        }
    }
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Self::Metadata,
            2 => Self::Data,
            3 => Self::Index,
            _ => Self::Invalid,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Metadata => "METADATA",
            Self::Data => "DATA",
            Self::Index => "INDEX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowLocation {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

#[derive(Clone)]
pub struct Page {
    pub page_id: Option<PageId>,
    pub is_dirty: bool,
    pub pin_count: usize,
    pub buffer: [u8; PAGE_SIZE],
}

impl Page {
    const PAGE_TYPE: usize = 0;
    const PAGE_ID: Range<usize> = 2..6;
    const SLOT_COUNT: Range<usize> = 6..8;
    const RECORD_COUNT: Range<usize> = 8..10;
    const FREE_SPACE_OFFSET: Range<usize> = 10..12;
    const PREV_PAGE_ID: Range<usize> = 12..16;
    const NEXT_PAGE_ID: Range<usize> = 16..20;

    pub fn new() -> Self {
        Self {
            page_id: None,
            is_dirty: false,
            pin_count: 0,
            buffer: [0u8; PAGE_SIZE],
        }
    }
    /// reset the header for a freshly allocated or reused page
    pub fn init(&mut self, page_type: PageType, page_id: PageId) {
        self.buffer[..PAGE_HEADER_SIZE].fill(0);
        self.buffer[Self::PAGE_TYPE] = page_type.as_u8();
        self.buffer[Self::PAGE_ID].copy_from_slice(&page_id.to_le_bytes());
        self.set_free_space_offset(PAGE_HEADER_SIZE as u16);
        self.set_prev_page_id(INVALID_PAGE_ID);
        self.set_next_page_id(INVALID_PAGE_ID);
        self.is_dirty = true;
    }

    fn read_u16(&self, range: Range<usize>) -> u16 {
        u16::from_le_bytes(self.buffer[range].try_into().unwrap())
    }
    fn write_u16(&mut self, range: Range<usize>, value: u16) {
        self.buffer[range].copy_from_slice(&value.to_le_bytes());
    }
    fn read_u32(&self, range: Range<usize>) -> u32 {
        u32::from_le_bytes(self.buffer[range].try_into().unwrap())
    }
    fn write_u32(&mut self, range: Range<usize>, value: u32) {
        self.buffer[range].copy_from_slice(&value.to_le_bytes());
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.buffer[Self::PAGE_TYPE])
    }
    pub fn set_page_type(&mut self, page_type: PageType) {
        self.buffer[Self::PAGE_TYPE] = page_type.as_u8();
        self.is_dirty = true;
    }
    pub fn header_page_id(&self) -> PageId {
        self.read_u32(Self::PAGE_ID)
    }
    pub fn slot_count(&self) -> u16 {
        self.read_u16(Self::SLOT_COUNT)
    }
    pub fn record_count(&self) -> u16 {
        self.read_u16(Self::RECORD_COUNT)
    }
    pub fn free_space_offset(&self) -> u16 {
        self.read_u16(Self::FREE_SPACE_OFFSET)
    }
    fn set_slot_count(&mut self, count: u16) {
        self.write_u16(Self::SLOT_COUNT, count);
    }
    fn set_record_count(&mut self, count: u16) {
        self.write_u16(Self::RECORD_COUNT, count);
    }
    fn set_free_space_offset(&mut self, offset: u16) {
        self.write_u16(Self::FREE_SPACE_OFFSET, offset);
    }
    pub fn prev_page_id(&self) -> PageId {
        self.read_u32(Self::PREV_PAGE_ID)
    }
    pub fn next_page_id(&self) -> PageId {
        self.read_u32(Self::NEXT_PAGE_ID)
    }
    pub fn set_prev_page_id(&mut self, page_id: PageId) {
        self.write_u32(Self::PREV_PAGE_ID, page_id);
        self.is_dirty = true;
    }
    pub fn set_next_page_id(&mut self, page_id: PageId) {
        self.write_u32(Self::NEXT_PAGE_ID, page_id);
        self.is_dirty = true;
    }

    fn slot_range(slot_id: SlotId) -> Range<usize> {
        let start = PAGE_HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        start..start + SLOT_SIZE
    }
    fn slot_at(&self, slot_id: SlotId) -> (u16, u16, u16) {
        let range = Self::slot_range(slot_id);
        let offset = u16::from_le_bytes(self.buffer[range.start..range.start + 2].try_into().unwrap());
        let length = u16::from_le_bytes(
            self.buffer[range.start + 2..range.start + 4].try_into().unwrap(),
        );
        let flags = u16::from_le_bytes(
            self.buffer[range.start + 4..range.start + 6].try_into().unwrap(),
        );
        (offset, length, flags)
    }
    fn write_slot(&mut self, slot_id: SlotId, offset: u16, length: u16, flags: u16) {
        let range = Self::slot_range(slot_id);
        self.buffer[range.start..range.start + 2].copy_from_slice(&offset.to_le_bytes());
        self.buffer[range.start + 2..range.start + 4].copy_from_slice(&length.to_le_bytes());
        self.buffer[range.start + 4..range.start + 6].copy_from_slice(&flags.to_le_bytes());
    }

    /// lowest payload offset used so far
    fn payload_tail(&self) -> usize {
        let mut tail = PAGE_SIZE;
        for slot_id in 0..self.slot_count() {
            let (offset, _, _) = self.slot_at(slot_id);
            tail = tail.min(offset as usize);
        }
        tail
    }
    pub fn free_space(&self) -> usize {
        self.payload_tail()
            .saturating_sub(self.free_space_offset() as usize)
    }
    pub fn can_insert(&self, payload_len: usize) -> bool {
        self.free_space_offset() as usize + SLOT_SIZE <= self.payload_tail().saturating_sub(payload_len)
    }

    fn check_record_page(&self) -> Result<(), StorageError> {
        match self.page_type() {
            PageType::Data | PageType::Metadata => Ok(()),
            other => Err(StorageError::InvalidPageType {
                page_id: self.header_page_id(),
                expected: PageType::Data.name(),
                found: other.name(),
            }),
        }
    }

    pub fn insert(&mut self, payload: &[u8]) -> Result<SlotId, StorageError> {
        // a legacy INVALID page becomes DATA on first record operation
        if self.page_type() == PageType::Invalid {
            self.set_page_type(PageType::Data);
        }
        self.check_record_page()?;
        if payload.len() > u16::MAX as usize {
            return Err(StorageError::RecordTooLarge(payload.len()));
        }
        if !self.can_insert(payload.len()) {
            return Err(StorageError::PageFull(self.header_page_id()));
        }
        let start = self.payload_tail() - payload.len();
        self.buffer[start..start + payload.len()].copy_from_slice(payload);
        let slot_id = self.slot_count();
        self.write_slot(slot_id, start as u16, payload.len() as u16, 0);
        self.set_slot_count(slot_id + 1);
        self.set_record_count(self.record_count() + 1);
        self.set_free_space_offset((PAGE_HEADER_SIZE + (slot_id as usize + 1) * SLOT_SIZE) as u16);
        self.is_dirty = true;
        Ok(slot_id)
    }
    pub fn read(&self, slot_id: SlotId) -> Result<Vec<u8>, StorageError> {
        if slot_id >= self.slot_count() {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        let (offset, length, flags) = self.slot_at(slot_id);
        if flags & TOMBSTONE_FLAG != 0 {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        Ok(self.buffer[offset as usize..offset as usize + length as usize].to_vec())
    }
    /// in-place overwrite; returns false if the payload does not fit in the slot
    pub fn update(&mut self, slot_id: SlotId, payload: &[u8]) -> Result<bool, StorageError> {
        if slot_id >= self.slot_count() {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        let (offset, length, flags) = self.slot_at(slot_id);
        if flags & TOMBSTONE_FLAG != 0 {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        if payload.len() > length as usize {
            return Ok(false);
        }
        self.buffer[offset as usize..offset as usize + payload.len()].copy_from_slice(payload);
        self.write_slot(slot_id, offset, payload.len() as u16, flags);
        self.is_dirty = true;
        Ok(true)
    }
    pub fn erase(&mut self, slot_id: SlotId) -> Result<(), StorageError> {
        if slot_id >= self.slot_count() {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        let (offset, length, flags) = self.slot_at(slot_id);
        if flags & TOMBSTONE_FLAG != 0 {
            return Err(StorageError::RecordNotFound {
                page_id: self.header_page_id(),
                slot_id,
            });
        }
        self.write_slot(slot_id, offset, length, flags | TOMBSTONE_FLAG);
        self.set_record_count(self.record_count() - 1);
        self.is_dirty = true;
        Ok(())
    }
    pub fn is_live(&self, slot_id: SlotId) -> bool {
        if slot_id >= self.slot_count() {
            return false;
        }
        self.slot_at(slot_id).2 & TOMBSTONE_FLAG == 0
    }
    /// non-tombstoned records in slot order
    pub fn records(&self) -> Vec<(SlotId, Vec<u8>)> {
        let mut out = vec![];
        for slot_id in 0..self.slot_count() {
            let (offset, length, flags) = self.slot_at(slot_id);
            if flags & TOMBSTONE_FLAG == 0 {
                out.push((
                    slot_id,
                    self.buffer[offset as usize..offset as usize + length as usize].to_vec(),
                ));
            }
        }
        out
    }
    /// drop every slot while keeping type, id and sibling links intact
    pub fn reset_slots(&mut self) {
        self.set_slot_count(0);
        self.set_record_count(0);
        self.set_free_space_offset(PAGE_HEADER_SIZE as u16);
        self.is_dirty = true;
    }
    #[allow(dead_code)]
    pub fn clear(&mut self) {
        self.page_id = None;
        self.is_dirty = false;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_page() -> Page {
        let mut page = Page::new();
        page.init(PageType::Data, 2);
        page
    }

    #[test]
    fn insert_read_round_trip() {
        let mut page = data_page();
        let slot = page.insert(b"hello").unwrap();
        assert_eq!(slot, 0);
        assert_eq!(page.read(slot).unwrap(), b"hello");
        let slot = page.insert(b"world!").unwrap();
        assert_eq!(slot, 1);
        assert_eq!(page.read(slot).unwrap(), b"world!");
        assert_eq!(page.slot_count(), 2);
        assert_eq!(page.record_count(), 2);
    }

    #[test]
    fn update_in_place_or_reject() {
        let mut page = data_page();
        let slot = page.insert(b"abcdef").unwrap();
        assert!(page.update(slot, b"xyz").unwrap());
        assert_eq!(page.read(slot).unwrap(), b"xyz");
        // grown payload must be relocated by the caller
        assert!(!page.update(slot, b"0123456789").unwrap());
        assert_eq!(page.read(slot).unwrap(), b"xyz");
    }

    #[test]
    fn erase_tombstones() {
        let mut page = data_page();
        let s0 = page.insert(b"one").unwrap();
        let s1 = page.insert(b"two").unwrap();
        page.erase(s0).unwrap();
        assert!(page.read(s0).is_err());
        assert!(page.erase(s0).is_err());
        assert_eq!(page.record_count(), 1);
        assert_eq!(page.slot_count(), 2);
        assert_eq!(page.records(), vec![(s1, b"two".to_vec())]);
    }

    #[test]
    fn fill_until_full() {
        let mut page = data_page();
        let payload = [7u8; 64];
        let mut inserted = 0;
        loop {
            match page.insert(&payload) {
                Ok(_) => inserted += 1,
                Err(StorageError::PageFull(_)) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(
            inserted,
            (PAGE_SIZE - PAGE_HEADER_SIZE) / (64 + SLOT_SIZE)
        );
        for slot_id in 0..page.slot_count() {
            assert_eq!(page.read(slot_id).unwrap(), payload.to_vec());
        }
    }

    #[test]
    fn record_ops_rejected_on_index_pages() {
        let mut page = Page::new();
        page.init(PageType::Index, 3);
        assert!(matches!(
            page.insert(b"nope"),
            Err(StorageError::InvalidPageType { .. })
        ));
    }

    #[test]
    fn invalid_page_upgrades_to_data() {
        let mut page = Page::new();
        page.init(PageType::Invalid, 4);
        page.insert(b"first").unwrap();
        assert_eq!(page.page_type(), PageType::Data);
    }
}
