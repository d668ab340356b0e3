use super::{TableError, TableHeap};
use crate::datum::{DataType, Datum};
use crate::record;
use crate::storage::{PageId, PageManager, PageManagerRef, INVALID_PAGE_ID};
use itertools::Itertools;
use log::info;
use std::collections::HashMap;

/// The part of a column the heap rewrite needs: its stable id and type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub column_id: u32,
    pub data_type: DataType,
}

/// ALTER-time rewrite: copy every row of the heap rooted at `old_root`
/// into a fresh heap, mapping fields by `column_id`. Columns present in
/// `new` but not in `old` are filled from `fill`, or typed NULL when no
/// fill value is given. Returns the new root; the old chain is left for
/// the caller to free after the catalog swap.
pub fn rewrite(
    pm: PageManagerRef,
    old_root: PageId,
    old: &[ColumnSpec],
    new: &[ColumnSpec],
    fill: &HashMap<u32, Datum>,
) -> Result<PageId, TableError> {
    let old_types = old.iter().map(|c| c.data_type).collect_vec();
    let new_types = new.iter().map(|c| c.data_type).collect_vec();
    let old_position: HashMap<u32, usize> = old
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.column_id, idx))
        .collect();
    let source = TableHeap::open(pm.clone(), old_root);
    let mut target = TableHeap::create(pm)?;
    let mut rows = 0usize;
    for entry in source.iter() {
        let (_, payload) = entry?;
        let values = record::decode(&payload, &old_types)?;
        let migrated = new
            .iter()
            .map(|column| match old_position.get(&column.column_id) {
                Some(&idx) => values[idx].clone(),
                None => fill
                    .get(&column.column_id)
                    .cloned()
                    .unwrap_or_else(|| Datum::null_of(column.data_type)),
            })
            .collect_vec();
        let payload = record::encode(&migrated, &new_types)?;
        target.insert(&payload)?;
        rows += 1;
    }
    info!(
        "heap rewrite: {} rows moved from page {} to page {}",
        rows,
        old_root,
        target.root_page_id()
    );
    Ok(target.root_page_id())
}

/// Free every page of the chain rooted at `root`.
pub fn free_chain(pm: &PageManagerRef, root: PageId) -> Result<(), TableError> {
    let mut chain = vec![];
    let mut page_id = root;
    while page_id != INVALID_PAGE_ID {
        let guard = PageManager::fetch(pm, page_id)?;
        chain.push(page_id);
        page_id = guard.borrow().next_page_id();
    }
    for page_id in chain {
        pm.borrow_mut().free_page(page_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageManager;
    use std::fs::remove_file;

    fn specs(pairs: &[(u32, DataType)]) -> Vec<ColumnSpec> {
        pairs
            .iter()
            .map(|&(column_id, data_type)| ColumnSpec {
                column_id,
                data_type,
            })
            .collect()
    }

    #[test]
    fn add_and_drop_column_rewrites() {
        let path = crate::test_util::temp_path("migrate");
        let pm = PageManager::open_shared(&path, true, 8).unwrap();
        let old = specs(&[(1, DataType::Int), (2, DataType::Varchar(16))]);
        let old_types = vec![DataType::Int, DataType::Varchar(16)];
        let mut heap = TableHeap::create(pm.clone()).unwrap();
        for idx in 0..10 {
            let payload = record::encode(
                &[
                    Datum::Int(Some(idx)),
                    Datum::Varchar(Some(format!("row{}", idx))),
                ],
                &old_types,
            )
            .unwrap();
            heap.insert(&payload).unwrap();
        }
        // add a BOOLEAN column with default TRUE
        let new = specs(&[
            (1, DataType::Int),
            (2, DataType::Varchar(16)),
            (3, DataType::Bool),
        ]);
        let mut fill = HashMap::new();
        fill.insert(3u32, Datum::Bool(Some(true)));
        let new_root = rewrite(pm.clone(), heap.root_page_id(), &old, &new, &fill).unwrap();
        let migrated = TableHeap::open(pm.clone(), new_root);
        let new_types = vec![DataType::Int, DataType::Varchar(16), DataType::Bool];
        for (idx, entry) in migrated.iter().enumerate() {
            let (_, payload) = entry.unwrap();
            let values = record::decode(&payload, &new_types).unwrap();
            assert_eq!(values[0], Datum::Int(Some(idx as i32)));
            assert_eq!(values[2], Datum::Bool(Some(true)));
        }
        // drop the VARCHAR column
        let narrowed = specs(&[(1, DataType::Int), (3, DataType::Bool)]);
        let narrow_root = rewrite(pm.clone(), new_root, &new, &narrowed, &HashMap::new()).unwrap();
        let narrow = TableHeap::open(pm.clone(), narrow_root);
        assert_eq!(narrow.iter().count(), 10);
        free_chain(&pm, heap.root_page_id()).unwrap();
        free_chain(&pm, new_root).unwrap();
        drop(heap);
        drop(narrow);
        drop(migrated);
        drop(pm);
        remove_file(path).unwrap();
    }
}
