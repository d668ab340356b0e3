use super::{PageId, StorageError, INVALID_PAGE_ID, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Paged I/O over one backing file. Page ids start at 1; the byte offset
/// of a page is `(id - 1) * PAGE_SIZE`.
pub struct FileManager {
    file: File,
    path: PathBuf,
    num_pages: PageId,
}

impl FileManager {
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .open(path.as_ref())?;
        let len = file.metadata()?.len() as usize;
        if len % PAGE_SIZE != 0 {
            return Err(StorageError::Internal(format!(
                "file {} is not page aligned",
                path.as_ref().display()
            )));
        }
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            num_pages: (len / PAGE_SIZE) as PageId,
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn offset_of(&self, page_id: PageId) -> Result<u64, StorageError> {
        if page_id == INVALID_PAGE_ID || page_id > self.num_pages {
            return Err(StorageError::PageIdOutOfBound(page_id));
        }
        Ok((page_id as u64 - 1) * PAGE_SIZE as u64)
    }
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), StorageError> {
        let offset = self.offset_of(page_id)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), StorageError> {
        let offset = self.offset_of(page_id)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }
    /// append one zero-initialized page, returning its id
    pub fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        let page_id = self.num_pages + 1;
        self.file.seek(SeekFrom::Start((page_id as u64 - 1) * PAGE_SIZE as u64))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.num_pages = page_id;
        Ok(page_id)
    }
    pub fn page_count(&self) -> PageId {
        self.num_pages
    }
    pub fn size_bytes(&self) -> u64 {
        self.num_pages as u64 * PAGE_SIZE as u64
    }
    pub fn close(self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_path;
    use rand::Rng;
    use std::fs::remove_file;

    #[test]
    fn allocate_write_read() {
        let path = temp_path("fm");
        {
            let mut fm = FileManager::open(&path, true).unwrap();
            assert_eq!(fm.page_count(), 0);
            assert_eq!(fm.allocate_page().unwrap(), 1);
            assert_eq!(fm.allocate_page().unwrap(), 2);
            let mut rng = rand::thread_rng();
            let mut buf1 = [0u8; PAGE_SIZE];
            let mut buf2 = [0u8; PAGE_SIZE];
            rng.fill(&mut buf1[..]);
            rng.fill(&mut buf2[..]);
            fm.write_page(1, &buf1).unwrap();
            fm.write_page(2, &buf2).unwrap();
            let mut back = [0u8; PAGE_SIZE];
            fm.read_page(1, &mut back).unwrap();
            assert_eq!(back, buf1);
            fm.read_page(2, &mut back).unwrap();
            assert_eq!(back, buf2);
            assert_eq!(fm.size_bytes(), 2 * PAGE_SIZE as u64);
        }
        // reopen preserves page count
        let mut fm = FileManager::open(&path, false).unwrap();
        assert_eq!(fm.page_count(), 2);
        let mut back = [0u8; PAGE_SIZE];
        assert!(fm.read_page(0, &mut back).is_err());
        assert!(fm.read_page(3, &mut back).is_err());
        remove_file(path).unwrap();
    }
}
