use crate::catalog::IndexEntry;
use crate::storage::{PageManager, PageManagerRef, StorageError, INVALID_PAGE_ID};
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod btree;
mod node;

pub use btree::{compare_keys, BPlusTree};
pub use node::{
    BPlusTreeNode, InternalEntry, LeafEntry, NodeType, BTREE_MAX_KEYS, MAX_KEY_LENGTH, NODE_MAGIC,
};

/// frames per index file buffer pool
const INDEX_POOL_SIZE: usize = 32;

/// One open index: the backing file's buffer pool plus the tree over it.
/// The handle owns the file for as long as it lives.
pub struct IndexHandle {
    pm: PageManagerRef,
    tree: BPlusTree,
}

impl IndexHandle {
    pub fn tree(&mut self) -> &mut BPlusTree {
        &mut self.tree
    }
    pub fn tree_ref(&self) -> &BPlusTree {
        &self.tree
    }
    pub fn page_manager(&self) -> &PageManagerRef {
        &self.pm
    }
}

/// Per-index file lifecycle. Every index lives in its own file under the
/// index directory, named by its id.
pub struct IndexManager {
    base_dir: PathBuf,
}

impl IndexManager {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        std::fs::create_dir_all(base_dir.as_ref()).map_err(StorageError::Io)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }
    pub fn path_for(&self, index_id: u32) -> PathBuf {
        self.base_dir.join(format!("idx_{}.kz", index_id))
    }

    /// Open a fresh file and allocate the tree's root. The caller records
    /// the returned tree's root page in the catalog.
    pub fn create_index(&self, entry: &IndexEntry) -> Result<IndexHandle, IndexError> {
        let path = self.path_for(entry.index_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(IndexError::Storage(StorageError::Io(e))),
        }
        let pm = PageManager::open_shared(&path, true, INDEX_POOL_SIZE)?;
        let tree = BPlusTree::new(pm.clone(), INVALID_PAGE_ID, entry.is_unique)?;
        info!(
            "index: created '{}' (id {}) at {}",
            entry.name,
            entry.index_id,
            path.display()
        );
        Ok(IndexHandle { pm, tree })
    }

    pub fn open_index(&self, entry: &IndexEntry) -> Result<IndexHandle, IndexError> {
        let path = self.path_for(entry.index_id);
        if !path.exists() {
            return Err(IndexError::IndexNotFound(entry.name.clone()));
        }
        let pm = PageManager::open_shared(&path, false, INDEX_POOL_SIZE)?;
        let tree = BPlusTree::new(pm.clone(), entry.root_page_id, entry.is_unique)?;
        Ok(IndexHandle { pm, tree })
    }

    /// best-effort file removal
    pub fn drop_index(&self, entry: &IndexEntry) {
        let path = self.path_for(entry.index_id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                info!("index: leaving stale file {}: {}", path.display(), e);
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("duplicate key {0}")]
    DuplicateKey(String),
    #[error("index '{0}' not found")]
    IndexNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::INVALID_PAGE_ID;

    fn sample_entry(index_id: u32, unique: bool) -> IndexEntry {
        IndexEntry {
            index_id,
            table_id: 1,
            name: format!("idx_{}", index_id),
            column_ids: vec![1],
            is_unique: unique,
            is_primary: false,
            root_page_id: INVALID_PAGE_ID,
            create_sql: String::new(),
        }
    }

    #[test]
    fn create_open_drop() {
        let dir = crate::test_util::temp_dir("indexes");
        let manager = IndexManager::new(&dir).unwrap();
        let mut entry = sample_entry(1, true);
        let root = {
            let mut handle = manager.create_index(&entry).unwrap();
            handle.tree().insert(b"alpha", 11).unwrap();
            handle.tree().insert(b"beta", 22).unwrap();
            handle.tree_ref().root_page_id()
        };
        entry.root_page_id = root;
        {
            let mut handle = manager.open_index(&entry).unwrap();
            assert_eq!(handle.tree().search(b"alpha").unwrap(), Some(11));
            assert_eq!(handle.tree().search(b"beta").unwrap(), Some(22));
            assert_eq!(handle.tree().search(b"gamma").unwrap(), None);
        }
        manager.drop_index(&entry);
        assert!(matches!(
            manager.open_index(&entry),
            Err(IndexError::IndexNotFound(_))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn create_replaces_stale_file() {
        let dir = crate::test_util::temp_dir("indexes");
        let manager = IndexManager::new(&dir).unwrap();
        let entry = sample_entry(2, false);
        {
            let mut handle = manager.create_index(&entry).unwrap();
            handle.tree().insert(b"old", 1).unwrap();
        }
        let mut handle = manager.create_index(&entry).unwrap();
        assert_eq!(handle.tree().search(b"old").unwrap(), None);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
