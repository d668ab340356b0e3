use super::{
    CatalogError, ColumnEntry, IndexEntry, TableEntry, DROPPED_ORDINAL, MAX_COLUMNS_PER_TABLE,
};
use crate::storage::{
    PageGuard, PageId, PageManager, PageManagerRef, PageType, StorageError, INVALID_PAGE_ID,
};
use itertools::Itertools;
use log::info;
use std::cell::RefCell;
use std::rc::Rc;

/// Persistent table/column/index metadata. Each relation lives on one
/// reserved METADATA page whose id sits in the database metadata page;
/// the pages are allocated lazily on first use. Reads populate an
/// in-memory cache, writes rebuild the whole page and replace the cache
/// only after the page write went through.
pub struct CatalogManager {
    pm: PageManagerRef,
    tables: Option<Vec<TableEntry>>,
    columns: Option<Vec<ColumnEntry>>,
    indexes: Option<Vec<IndexEntry>>,
}

pub type CatalogManagerRef = Rc<RefCell<CatalogManager>>;

#[derive(Clone, Copy)]
enum Relation {
    Tables,
    Columns,
    Indexes,
}

impl CatalogManager {
    pub fn new(pm: PageManagerRef) -> Self {
        Self {
            pm,
            tables: None,
            columns: None,
            indexes: None,
        }
    }
    pub fn new_shared(pm: PageManagerRef) -> CatalogManagerRef {
        Rc::new(RefCell::new(Self::new(pm)))
    }

    fn relation_root(&mut self, relation: Relation) -> Result<PageId, CatalogError> {
        let mut pm = self.pm.borrow_mut();
        let root = match relation {
            Relation::Tables => pm.catalog_tables_root()?,
            Relation::Columns => pm.catalog_columns_root()?,
            Relation::Indexes => pm.catalog_indexes_root()?,
        };
        if root != INVALID_PAGE_ID {
            return Ok(root);
        }
        drop(pm);
        let guard = PageManager::new_page(&self.pm, PageType::Metadata)?;
        let root = guard.page_id();
        drop(guard);
        let mut pm = self.pm.borrow_mut();
        match relation {
            Relation::Tables => pm.set_catalog_tables_root(root)?,
            Relation::Columns => pm.set_catalog_columns_root(root)?,
            Relation::Indexes => pm.set_catalog_indexes_root(root)?,
        }
        Ok(root)
    }

    fn relation_page(&mut self, relation: Relation) -> Result<PageGuard, CatalogError> {
        let root = self.relation_root(relation)?;
        Ok(PageManager::fetch(&self.pm, root)?)
    }

    fn persist(&mut self, relation: Relation, entries: &[Vec<u8>]) -> Result<(), CatalogError> {
        let guard = self.relation_page(relation)?;
        let mut page = guard.borrow_mut();
        page.reset_slots();
        for bytes in entries {
            page.insert(bytes).map_err(|e| match e {
                StorageError::PageFull(_) => CatalogError::OutOfSpace,
                other => CatalogError::Storage(other),
            })?;
        }
        Ok(())
    }

    fn load_tables(&mut self) -> Result<&mut Vec<TableEntry>, CatalogError> {
        if self.tables.is_none() {
            let guard = self.relation_page(Relation::Tables)?;
            let records = guard.borrow().records();
            let entries = records
                .iter()
                .map(|(_, bytes)| TableEntry::from_bytes(bytes))
                .collect::<Result<Vec<_>, _>>()?;
            self.tables = Some(entries);
        }
        Ok(self.tables.as_mut().unwrap())
    }
    fn load_columns(&mut self) -> Result<&mut Vec<ColumnEntry>, CatalogError> {
        if self.columns.is_none() {
            let guard = self.relation_page(Relation::Columns)?;
            let records = guard.borrow().records();
            let mut entries = records
                .iter()
                .map(|(_, bytes)| ColumnEntry::from_bytes(bytes))
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort_by_key(|c| (c.table_id, c.ordinal_position, c.column_id));
            self.columns = Some(entries);
        }
        Ok(self.columns.as_mut().unwrap())
    }
    fn load_indexes(&mut self) -> Result<&mut Vec<IndexEntry>, CatalogError> {
        if self.indexes.is_none() {
            let guard = self.relation_page(Relation::Indexes)?;
            let records = guard.borrow().records();
            let mut entries = records
                .iter()
                .map(|(_, bytes)| IndexEntry::from_bytes(bytes))
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort_by(|a, b| (a.table_id, &a.name).cmp(&(b.table_id, &b.name)));
            self.indexes = Some(entries);
        }
        Ok(self.indexes.as_mut().unwrap())
    }

    fn commit_tables(&mut self, entries: Vec<TableEntry>) -> Result<(), CatalogError> {
        let bytes = entries.iter().map(|e| e.to_bytes()).collect_vec();
        self.persist(Relation::Tables, &bytes)?;
        self.tables = Some(entries);
        Ok(())
    }
    fn commit_columns(&mut self, mut entries: Vec<ColumnEntry>) -> Result<(), CatalogError> {
        entries.sort_by_key(|c| (c.table_id, c.ordinal_position, c.column_id));
        let bytes = entries.iter().map(|e| e.to_bytes()).collect_vec();
        self.persist(Relation::Columns, &bytes)?;
        self.columns = Some(entries);
        Ok(())
    }
    fn commit_indexes(&mut self, mut entries: Vec<IndexEntry>) -> Result<(), CatalogError> {
        entries.sort_by(|a, b| (a.table_id, &a.name).cmp(&(b.table_id, &b.name)));
        let bytes = entries.iter().map(|e| e.to_bytes()).collect_vec();
        self.persist(Relation::Indexes, &bytes)?;
        self.indexes = Some(entries);
        Ok(())
    }

    // lookups

    pub fn table_by_name(&mut self, name: &str) -> Result<Option<TableEntry>, CatalogError> {
        Ok(self.load_tables()?.iter().find(|t| t.name == name).cloned())
    }
    pub fn table_by_id(&mut self, table_id: u32) -> Result<Option<TableEntry>, CatalogError> {
        Ok(self.load_tables()?.iter().find(|t| t.id == table_id).cloned())
    }
    pub fn all_tables(&mut self) -> Result<Vec<TableEntry>, CatalogError> {
        Ok(self.load_tables()?.clone())
    }
    /// active columns in ordinal order
    pub fn columns_of(&mut self, table_id: u32) -> Result<Vec<ColumnEntry>, CatalogError> {
        Ok(self
            .load_columns()?
            .iter()
            .filter(|c| c.table_id == table_id && !c.is_dropped)
            .cloned()
            .collect_vec())
    }
    pub fn indexes_of(&mut self, table_id: u32) -> Result<Vec<IndexEntry>, CatalogError> {
        Ok(self
            .load_indexes()?
            .iter()
            .filter(|i| i.table_id == table_id)
            .cloned()
            .collect_vec())
    }
    pub fn index_by_name(&mut self, name: &str) -> Result<Option<IndexEntry>, CatalogError> {
        Ok(self.load_indexes()?.iter().find(|i| i.name == name).cloned())
    }

    // DDL mutations

    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnEntry>,
        root_page_id: PageId,
        create_sql: &str,
    ) -> Result<TableEntry, CatalogError> {
        if self.table_by_name(name)?.is_some() {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        let table_id = self.pm.borrow_mut().take_next_table_id()?;
        let table = TableEntry {
            id: table_id,
            name: name.to_string(),
            root_page_id,
            schema_version: 1,
            next_column_id: columns.len() as u32 + 1,
            create_sql: create_sql.to_string(),
        };
        let mut new_columns = self.load_columns()?.clone();
        for (idx, column) in columns.into_iter().enumerate() {
            new_columns.push(ColumnEntry {
                table_id,
                column_id: idx as u32 + 1,
                ordinal_position: idx as u16,
                schema_version: 1,
                is_dropped: false,
                ..column
            });
        }
        let mut new_tables = self.load_tables()?.clone();
        new_tables.push(table.clone());
        self.commit_tables(new_tables)?;
        if let Err(e) = self.commit_columns(new_columns) {
            // roll the table relation back so the caches stay coherent
            let rolled_back = self
                .load_tables()?
                .iter()
                .filter(|t| t.id != table_id)
                .cloned()
                .collect_vec();
            self.commit_tables(rolled_back)?;
            return Err(e);
        }
        info!("catalog: created table '{}' (id {})", name, table_id);
        Ok(table)
    }

    /// Remove the table row, its columns and its indexes. The caller
    /// frees the heap chain and index files; the removed entries are
    /// returned for that purpose.
    pub fn drop_table(
        &mut self,
        name: &str,
    ) -> Result<(TableEntry, Vec<IndexEntry>), CatalogError> {
        let table = self
            .table_by_name(name)?
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        let dropped_indexes = self.indexes_of(table.id)?;
        let new_tables = self
            .load_tables()?
            .iter()
            .filter(|t| t.id != table.id)
            .cloned()
            .collect_vec();
        let new_columns = self
            .load_columns()?
            .iter()
            .filter(|c| c.table_id != table.id)
            .cloned()
            .collect_vec();
        let new_indexes = self
            .load_indexes()?
            .iter()
            .filter(|i| i.table_id != table.id)
            .cloned()
            .collect_vec();
        self.commit_tables(new_tables)?;
        self.commit_columns(new_columns)?;
        self.commit_indexes(new_indexes)?;
        info!("catalog: dropped table '{}' (id {})", name, table.id);
        Ok((table, dropped_indexes))
    }

    pub fn add_column(
        &mut self,
        table_id: u32,
        column: ColumnEntry,
        position: Option<usize>,
    ) -> Result<ColumnEntry, CatalogError> {
        let table = self
            .table_by_id(table_id)?
            .ok_or_else(|| CatalogError::TableNotFound(table_id.to_string()))?;
        if column.constraint.primary_key {
            return Err(CatalogError::InvalidConstraint(
                "cannot add a PRIMARY KEY column".to_string(),
            ));
        }
        let active = self.columns_of(table_id)?;
        if active
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&column.name))
        {
            return Err(CatalogError::DuplicateColumn(column.name));
        }
        if active.len() >= MAX_COLUMNS_PER_TABLE {
            return Err(CatalogError::InvalidConstraint(format!(
                "table holds at most {} columns",
                MAX_COLUMNS_PER_TABLE
            )));
        }
        let position = position.unwrap_or(active.len()).min(active.len());
        let new_version = table.schema_version + 1;
        let added = ColumnEntry {
            table_id,
            column_id: table.next_column_id,
            ordinal_position: position as u16,
            schema_version: new_version,
            is_dropped: false,
            ..column
        };
        let mut new_columns = self.load_columns()?.clone();
        for entry in new_columns
            .iter_mut()
            .filter(|c| c.table_id == table_id && !c.is_dropped)
        {
            if entry.ordinal_position >= position as u16 {
                entry.ordinal_position += 1;
            }
        }
        new_columns.push(added.clone());
        let mut new_tables = self.load_tables()?.clone();
        for entry in new_tables.iter_mut().filter(|t| t.id == table_id) {
            entry.schema_version = new_version;
            entry.next_column_id += 1;
        }
        self.commit_columns(new_columns)?;
        self.commit_tables(new_tables)?;
        info!(
            "catalog: added column '{}' to table {} (v{})",
            added.name, table_id, new_version
        );
        Ok(added)
    }

    pub fn drop_column(&mut self, table_id: u32, name: &str) -> Result<ColumnEntry, CatalogError> {
        let table = self
            .table_by_id(table_id)?
            .ok_or_else(|| CatalogError::TableNotFound(table_id.to_string()))?;
        let active = self.columns_of(table_id)?;
        let target = active
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| CatalogError::ColumnNotFound(name.to_string()))?;
        if active.len() == 1 {
            return Err(CatalogError::InvalidConstraint(
                "cannot drop the last column".to_string(),
            ));
        }
        if target.constraint.primary_key {
            return Err(CatalogError::InvalidConstraint(
                "cannot drop a PRIMARY KEY column".to_string(),
            ));
        }
        let new_version = table.schema_version + 1;
        let mut new_columns = self.load_columns()?.clone();
        let mut next_ordinal = 0u16;
        for entry in new_columns.iter_mut().filter(|c| c.table_id == table_id) {
            if entry.column_id == target.column_id {
                entry.is_dropped = true;
                entry.ordinal_position = DROPPED_ORDINAL;
                entry.schema_version = new_version;
            }
        }
        // renumber the surviving active columns densely
        let mut survivors = new_columns
            .iter_mut()
            .filter(|c| c.table_id == table_id && !c.is_dropped)
            .collect_vec();
        survivors.sort_by_key(|c| c.ordinal_position);
        for entry in survivors {
            entry.ordinal_position = next_ordinal;
            next_ordinal += 1;
        }
        let mut new_tables = self.load_tables()?.clone();
        for entry in new_tables.iter_mut().filter(|t| t.id == table_id) {
            entry.schema_version = new_version;
        }
        self.commit_columns(new_columns)?;
        self.commit_tables(new_tables)?;
        info!(
            "catalog: dropped column '{}' from table {} (v{})",
            name, table_id, new_version
        );
        Ok(target)
    }

    pub fn create_index(&mut self, entry: IndexEntry) -> Result<IndexEntry, CatalogError> {
        if entry.name.is_empty() {
            return Err(CatalogError::InvalidConstraint(
                "index name must not be empty".to_string(),
            ));
        }
        if entry.column_ids.is_empty() {
            return Err(CatalogError::InvalidConstraint(
                "index needs at least one column".to_string(),
            ));
        }
        if self.index_by_name(&entry.name)?.is_some() {
            return Err(CatalogError::IndexExists(entry.name));
        }
        let index_id = self.pm.borrow_mut().take_next_index_id()?;
        let entry = IndexEntry { index_id, ..entry };
        let mut new_indexes = self.load_indexes()?.clone();
        new_indexes.push(entry.clone());
        self.commit_indexes(new_indexes)?;
        info!("catalog: created index '{}' (id {})", entry.name, index_id);
        Ok(entry)
    }

    /// returns whether an entry was removed
    pub fn drop_index(&mut self, name: &str) -> Result<bool, CatalogError> {
        let existed = self.index_by_name(name)?.is_some();
        if existed {
            let new_indexes = self
                .load_indexes()?
                .iter()
                .filter(|i| i.name != name)
                .cloned()
                .collect_vec();
            self.commit_indexes(new_indexes)?;
            info!("catalog: dropped index '{}'", name);
        }
        Ok(existed)
    }

    pub fn set_table_root(&mut self, table_id: u32, root: PageId) -> Result<(), CatalogError> {
        let mut new_tables = self.load_tables()?.clone();
        for entry in new_tables.iter_mut().filter(|t| t.id == table_id) {
            entry.root_page_id = root;
        }
        self.commit_tables(new_tables)
    }
    pub fn set_index_root(&mut self, index_id: u32, root: PageId) -> Result<(), CatalogError> {
        let mut new_indexes = self.load_indexes()?.clone();
        for entry in new_indexes.iter_mut().filter(|i| i.index_id == index_id) {
            entry.root_page_id = root;
        }
        self.commit_indexes(new_indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnConstraint;
    use crate::datum::DataType;
    use std::fs::remove_file;

    fn column(name: &str, data_type: DataType) -> ColumnEntry {
        ColumnEntry {
            table_id: 0,
            column_id: 0,
            ordinal_position: 0,
            schema_version: 0,
            is_dropped: false,
            name: name.to_string(),
            data_type,
            constraint: ColumnConstraint::default(),
        }
    }

    fn open_catalog() -> (CatalogManager, PageManagerRef, std::path::PathBuf) {
        let path = crate::test_util::temp_path("catalog");
        let pm = PageManager::open_shared(&path, true, 16).unwrap();
        let catalog = CatalogManager::new(pm.clone());
        (catalog, pm, path)
    }

    #[test]
    fn create_and_reopen() {
        let (path, table_id) = {
            let (mut catalog, pm, path) = open_catalog();
            let table = catalog
                .create_table(
                    "users",
                    vec![
                        column("id", DataType::Int),
                        column("name", DataType::Varchar(32)),
                    ],
                    2,
                    "CREATE TABLE users (id INTEGER, name VARCHAR(32))",
                )
                .unwrap();
            assert!(matches!(
                catalog.create_table("users", vec![column("id", DataType::Int)], 3, ""),
                Err(CatalogError::TableExists(_))
            ));
            drop(catalog);
            drop(pm);
            (path, table.id)
        };
        let pm = PageManager::open_shared(&path, false, 16).unwrap();
        let mut catalog = CatalogManager::new(pm.clone());
        let table = catalog.table_by_name("users").unwrap().unwrap();
        assert_eq!(table.id, table_id);
        assert_eq!(table.schema_version, 1);
        let columns = catalog.columns_of(table.id).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].name, "name");
        assert_eq!(columns[1].ordinal_position, 1);
        drop(catalog);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn add_then_drop_restores_active_list() {
        let (mut catalog, pm, path) = open_catalog();
        let table = catalog
            .create_table(
                "t",
                vec![column("a", DataType::Int), column("b", DataType::Text)],
                2,
                "",
            )
            .unwrap();
        let before = catalog.columns_of(table.id).unwrap();
        catalog
            .add_column(table.id, column("c", DataType::Bool), None)
            .unwrap();
        assert_eq!(catalog.columns_of(table.id).unwrap().len(), 3);
        let v2 = catalog.table_by_id(table.id).unwrap().unwrap().schema_version;
        assert_eq!(v2, 2);
        catalog.drop_column(table.id, "c").unwrap();
        let after = catalog.columns_of(table.id).unwrap();
        assert_eq!(
            before.iter().map(|c| (&c.name, c.ordinal_position)).collect::<Vec<_>>(),
            after.iter().map(|c| (&c.name, c.ordinal_position)).collect::<Vec<_>>()
        );
        let v3 = catalog.table_by_id(table.id).unwrap().unwrap().schema_version;
        assert_eq!(v3, 3);
        drop(catalog);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn drop_column_guards() {
        let (mut catalog, pm, path) = open_catalog();
        let mut pk = column("id", DataType::Int);
        pk.constraint.primary_key = true;
        pk.constraint.not_null = true;
        pk.constraint.unique = true;
        let table = catalog
            .create_table("t", vec![pk, column("v", DataType::Int)], 2, "")
            .unwrap();
        assert!(matches!(
            catalog.drop_column(table.id, "id"),
            Err(CatalogError::InvalidConstraint(_))
        ));
        catalog.drop_column(table.id, "v").unwrap();
        assert!(matches!(
            catalog.drop_column(table.id, "id"),
            Err(CatalogError::InvalidConstraint(_))
        ));
        assert!(matches!(
            catalog.drop_column(table.id, "missing"),
            Err(CatalogError::ColumnNotFound(_))
        ));
        drop(catalog);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn index_lifecycle() {
        let (mut catalog, pm, path) = open_catalog();
        let table = catalog
            .create_table("t", vec![column("a", DataType::Int)], 2, "")
            .unwrap();
        let entry = catalog
            .create_index(IndexEntry {
                index_id: 0,
                table_id: table.id,
                name: "idx_a".to_string(),
                column_ids: vec![1],
                is_unique: true,
                is_primary: false,
                root_page_id: INVALID_PAGE_ID,
                create_sql: "CREATE UNIQUE INDEX idx_a ON t(a)".to_string(),
            })
            .unwrap();
        assert!(entry.index_id > 0);
        assert!(matches!(
            catalog.create_index(IndexEntry {
                index_id: 0,
                table_id: table.id,
                name: "idx_a".to_string(),
                column_ids: vec![1],
                is_unique: false,
                is_primary: false,
                root_page_id: INVALID_PAGE_ID,
                create_sql: String::new(),
            }),
            Err(CatalogError::IndexExists(_))
        ));
        catalog.set_index_root(entry.index_id, 9).unwrap();
        assert_eq!(
            catalog.index_by_name("idx_a").unwrap().unwrap().root_page_id,
            9
        );
        assert!(catalog.drop_index("idx_a").unwrap());
        assert!(!catalog.drop_index("idx_a").unwrap());
        drop(catalog);
        drop(pm);
        remove_file(path).unwrap();
    }

    #[test]
    fn drop_table_removes_columns_and_indexes() {
        let (mut catalog, pm, path) = open_catalog();
        let table = catalog
            .create_table(
                "t",
                vec![column("a", DataType::Int), column("b", DataType::Int)],
                2,
                "",
            )
            .unwrap();
        catalog
            .create_index(IndexEntry {
                index_id: 0,
                table_id: table.id,
                name: "idx_b".to_string(),
                column_ids: vec![2],
                is_unique: false,
                is_primary: false,
                root_page_id: INVALID_PAGE_ID,
                create_sql: String::new(),
            })
            .unwrap();
        let (dropped, indexes) = catalog.drop_table("t").unwrap();
        assert_eq!(dropped.id, table.id);
        assert_eq!(indexes.len(), 1);
        assert!(catalog.table_by_name("t").unwrap().is_none());
        assert!(catalog.index_by_name("idx_b").unwrap().is_none());
        assert!(catalog.columns_of(table.id).unwrap().is_empty());
        drop(catalog);
        drop(pm);
        remove_file(path).unwrap();
    }
}
