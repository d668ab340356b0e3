use super::node::{BPlusTreeNode, InternalEntry, LeafEntry, NodeType, BTREE_MAX_KEYS};
use super::IndexError;
use crate::storage::{PageId, PageManager, PageManagerRef, PageType, RecordId, INVALID_PAGE_ID, PAGE_SIZE};
use std::cmp::Ordering;

/// Disk-resident B+ tree with variable-length byte-string keys. Keys are
/// ordered by memcmp with the shorter key first on an equal prefix.
/// Nodes split on overflow; removal shrinks nodes without merging, which
/// is fine because every DDL path that could leave stale structure
/// rebuilds the index from scratch.
pub struct BPlusTree {
    pm: PageManagerRef,
    root_page_id: PageId,
    unique: bool,
}

/// outcome of a recursive insert, bubbling a split upward
enum InsertEffect {
    Stable,
    Split { key: Vec<u8>, right: PageId },
}

pub fn compare_keys(lhs: &[u8], rhs: &[u8]) -> Ordering {
    lhs.cmp(rhs)
}

impl BPlusTree {
    /// `INVALID_PAGE_ID` as root allocates a fresh leaf root.
    pub fn new(
        pm: PageManagerRef,
        root_page_id: PageId,
        unique: bool,
    ) -> Result<Self, IndexError> {
        let mut tree = Self {
            pm,
            root_page_id,
            unique,
        };
        if tree.root_page_id == INVALID_PAGE_ID {
            let guard = PageManager::new_page(&tree.pm, PageType::Index)?;
            let root = BPlusTreeNode::make_leaf(guard.page_id());
            root.serialize(&mut guard.borrow_mut())?;
            tree.root_page_id = guard.page_id();
        }
        Ok(tree)
    }
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    fn load_node(&self, page_id: PageId) -> Result<BPlusTreeNode, IndexError> {
        let guard = PageManager::fetch(&self.pm, page_id)?;
        let mut node = BPlusTreeNode::deserialize(&guard.borrow())?;
        node.page_id = page_id;
        Ok(node)
    }
    fn store_node(&self, node: &BPlusTreeNode) -> Result<(), IndexError> {
        let guard = PageManager::fetch(&self.pm, node.page_id)?;
        node.serialize(&mut guard.borrow_mut())?;
        Ok(())
    }
    fn alloc_node(&self, node_type: NodeType) -> Result<BPlusTreeNode, IndexError> {
        let guard = PageManager::new_page(&self.pm, PageType::Index)?;
        Ok(match node_type {
            NodeType::Leaf => BPlusTreeNode::make_leaf(guard.page_id()),
            NodeType::Internal => BPlusTreeNode::make_internal(guard.page_id()),
        })
    }

    /// first leaf slot whose key is not below `key`
    fn find_leaf_index(leaf: &BPlusTreeNode, key: &[u8]) -> usize {
        leaf.leaf_entries
            .iter()
            .take_while(|e| compare_keys(&e.key, key) == Ordering::Less)
            .count()
    }
    /// child to descend into: first separator strictly above `key` wins
    fn find_internal_child(node: &BPlusTreeNode, key: &[u8]) -> usize {
        node.internal_entries
            .iter()
            .take_while(|e| compare_keys(&e.key, key) != Ordering::Greater)
            .count()
    }

    /// Point lookup. With duplicate keys the most recently inserted
    /// value wins.
    pub fn search(&self, key: &[u8]) -> Result<Option<RecordId>, IndexError> {
        let mut current = self.root_page_id;
        loop {
            let node = self.load_node(current)?;
            if node.node_type == NodeType::Leaf {
                let mut idx = Self::find_leaf_index(&node, key);
                let mut found = None;
                while idx < node.leaf_entries.len()
                    && compare_keys(&node.leaf_entries[idx].key, key) == Ordering::Equal
                {
                    found = Some(node.leaf_entries[idx].value);
                    idx += 1;
                }
                return Ok(found);
            }
            let child = Self::find_internal_child(&node, key).min(node.children.len() - 1);
            current = node.children[child];
        }
    }

    pub fn insert(&mut self, key: &[u8], value: RecordId) -> Result<(), IndexError> {
        let effect = self.insert_recursive(self.root_page_id, key, value)?;
        if let InsertEffect::Split { key, right } = effect {
            let mut new_root = self.alloc_node(NodeType::Internal)?;
            new_root.children.push(self.root_page_id);
            new_root.children.push(right);
            new_root.internal_entries.push(InternalEntry { key, child: right });

            let mut left = self.load_node(self.root_page_id)?;
            left.parent_page_id = new_root.page_id;
            self.store_node(&left)?;
            let mut right = self.load_node(right)?;
            right.parent_page_id = new_root.page_id;
            self.store_node(&right)?;

            self.store_node(&new_root)?;
            self.root_page_id = new_root.page_id;
        }
        Ok(())
    }

    fn needs_split(node: &BPlusTreeNode) -> bool {
        node.key_count() > BTREE_MAX_KEYS || node.serialized_size() > PAGE_SIZE
    }

    fn insert_recursive(
        &mut self,
        page_id: PageId,
        key: &[u8],
        value: RecordId,
    ) -> Result<InsertEffect, IndexError> {
        let mut node = self.load_node(page_id)?;
        if node.node_type == NodeType::Leaf {
            let mut idx = Self::find_leaf_index(&node, key);
            if self.unique
                && idx < node.leaf_entries.len()
                && compare_keys(&node.leaf_entries[idx].key, key) == Ordering::Equal
            {
                return Err(IndexError::DuplicateKey(format!(
                    "{:?}",
                    String::from_utf8_lossy(key)
                )));
            }
            // duplicates land after their equals, keeping insertion order
            while idx < node.leaf_entries.len()
                && compare_keys(&node.leaf_entries[idx].key, key) == Ordering::Equal
            {
                idx += 1;
            }
            node.leaf_entries.insert(
                idx,
                LeafEntry {
                    key: key.to_vec(),
                    value,
                },
            );
            if !Self::needs_split(&node) {
                self.store_node(&node)?;
                return Ok(InsertEffect::Stable);
            }
            let mut new_leaf = self.alloc_node(NodeType::Leaf)?;
            new_leaf.parent_page_id = node.parent_page_id;
            let split_point = node.leaf_entries.len() / 2;
            new_leaf.leaf_entries = node.leaf_entries.split_off(split_point);
            let promoted = new_leaf.leaf_entries[0].key.clone();

            new_leaf.next_leaf = node.next_leaf;
            new_leaf.prev_leaf = node.page_id;
            node.next_leaf = new_leaf.page_id;
            if new_leaf.next_leaf != INVALID_PAGE_ID {
                let mut next = self.load_node(new_leaf.next_leaf)?;
                next.prev_leaf = new_leaf.page_id;
                self.store_node(&next)?;
            }
            self.store_node(&node)?;
            self.store_node(&new_leaf)?;
            return Ok(InsertEffect::Split {
                key: promoted,
                right: new_leaf.page_id,
            });
        }

        let child_index = Self::find_internal_child(&node, key);
        let child_page = node.children[child_index];
        match self.insert_recursive(child_page, key, value)? {
            InsertEffect::Stable => Ok(InsertEffect::Stable),
            InsertEffect::Split { key, right } => {
                node.internal_entries.insert(
                    child_index,
                    InternalEntry {
                        key,
                        child: right,
                    },
                );
                node.children.insert(child_index + 1, right);
                if !Self::needs_split(&node) {
                    self.store_node(&node)?;
                    return Ok(InsertEffect::Stable);
                }
                let mut new_internal = self.alloc_node(NodeType::Internal)?;
                new_internal.parent_page_id = node.parent_page_id;
                let split_point = node.internal_entries.len() / 2;
                // the pivot moves up, it is not copied into either half
                let mut upper = node.internal_entries.split_off(split_point);
                let pivot = upper.remove(0);
                new_internal.internal_entries = upper;
                new_internal.children = node.children.split_off(split_point + 1);
                for (idx, entry) in new_internal.internal_entries.iter_mut().enumerate() {
                    entry.child = new_internal.children[idx + 1];
                }
                for &child_id in &new_internal.children {
                    let mut child = self.load_node(child_id)?;
                    child.parent_page_id = new_internal.page_id;
                    self.store_node(&child)?;
                }
                self.store_node(&node)?;
                self.store_node(&new_internal)?;
                Ok(InsertEffect::Split {
                    key: pivot.key,
                    right: new_internal.page_id,
                })
            }
        }
    }

    /// Erase the first entry matching `(key, value)`. Equal keys may run
    /// across leaves, so the scan follows the leaf chain.
    pub fn remove(&mut self, key: &[u8], value: RecordId) -> Result<(), IndexError> {
        let mut current = self.root_page_id;
        loop {
            let node = self.load_node(current)?;
            if node.node_type == NodeType::Leaf {
                break;
            }
            let child = Self::find_internal_child(&node, key).min(node.children.len() - 1);
            current = node.children[child];
        }
        while current != INVALID_PAGE_ID {
            let mut node = self.load_node(current)?;
            let start = Self::find_leaf_index(&node, key);
            for idx in start..node.leaf_entries.len() {
                match compare_keys(&node.leaf_entries[idx].key, key) {
                    Ordering::Equal => {
                        if node.leaf_entries[idx].value == value {
                            node.leaf_entries.remove(idx);
                            self.store_node(&node)?;
                            return Ok(());
                        }
                    }
                    Ordering::Greater => return Ok(()),
                    Ordering::Less => {}
                }
            }
            current = node.next_leaf;
        }
        Ok(())
    }

    pub fn scan_equal(&self, key: &[u8]) -> Result<Vec<RecordId>, IndexError> {
        self.scan_range(Some(key), true, Some(key), true)
    }

    pub fn scan_range(
        &self,
        lower: Option<&[u8]>,
        lower_inclusive: bool,
        upper: Option<&[u8]>,
        upper_inclusive: bool,
    ) -> Result<Vec<RecordId>, IndexError> {
        let mut results = vec![];
        let (mut current, mut start_index) = match lower {
            Some(lower) => self.find_leaf_position(lower)?,
            None => (self.find_leftmost_leaf()?, 0),
        };
        while current != INVALID_PAGE_ID {
            let node = self.load_node(current)?;
            if start_index >= node.leaf_entries.len() {
                current = node.next_leaf;
                start_index = 0;
                continue;
            }
            for entry in &node.leaf_entries[start_index..] {
                if let Some(lower) = lower {
                    match compare_keys(&entry.key, lower) {
                        Ordering::Less => continue,
                        Ordering::Equal if !lower_inclusive => continue,
                        _ => {}
                    }
                }
                if let Some(upper) = upper {
                    match compare_keys(&entry.key, upper) {
                        Ordering::Greater => return Ok(results),
                        Ordering::Equal if !upper_inclusive => return Ok(results),
                        _ => {}
                    }
                }
                results.push(entry.value);
            }
            current = node.next_leaf;
            start_index = 0;
        }
        Ok(results)
    }

    fn find_leaf_position(&self, key: &[u8]) -> Result<(PageId, usize), IndexError> {
        let mut current = self.root_page_id;
        loop {
            let node = self.load_node(current)?;
            if node.node_type == NodeType::Leaf {
                return Ok((current, Self::find_leaf_index(&node, key)));
            }
            let child = Self::find_internal_child(&node, key).min(node.children.len() - 1);
            current = node.children[child];
        }
    }
    fn find_leftmost_leaf(&self) -> Result<PageId, IndexError> {
        let mut current = self.root_page_id;
        loop {
            let node = self.load_node(current)?;
            if node.node_type == NodeType::Leaf {
                return Ok(current);
            }
            if node.children.is_empty() {
                return Ok(INVALID_PAGE_ID);
            }
            current = node.children[0];
        }
    }
}
