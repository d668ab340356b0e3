use super::{decode_row, render_literal, ExecutionError};
use crate::catalog::{
    CatalogManagerRef, ColumnConstraint, ColumnEntry, IndexEntry, TableEntry, MAX_COLUMNS_PER_TABLE,
};
use crate::datum::Datum;
use crate::expr::literal_to_datum;
use crate::index::{IndexError, IndexManager};
use crate::record;
use crate::sql::ast::{
    AlterAction, AlterTableStmt, ColumnDef, CreateIndexStmt, CreateTableStmt, DropIndexStmt,
    DropTableStmt,
};
use crate::storage::{record_id_of, PageId, PageManagerRef, INVALID_PAGE_ID};
use crate::table::{free_chain, rewrite, ColumnSpec, TableHeap};
use itertools::Itertools;
use log::info;
use std::collections::HashMap;
use std::rc::Rc;

/// Executes CREATE/DROP TABLE, CREATE/DROP INDEX and ALTER TABLE.
pub struct DdlExecutor {
    pm: PageManagerRef,
    catalog: CatalogManagerRef,
    indexes: Rc<IndexManager>,
}

impl DdlExecutor {
    pub fn new(pm: PageManagerRef, catalog: CatalogManagerRef, indexes: Rc<IndexManager>) -> Self {
        Self {
            pm,
            catalog,
            indexes,
        }
    }

    fn map_column_def(def: &ColumnDef) -> Result<ColumnEntry, ExecutionError> {
        if let Some(default) = &def.default {
            // fail early on a default that cannot take the column type
            literal_to_datum(default, Some(def.data_type))?;
        }
        Ok(ColumnEntry {
            table_id: 0,
            column_id: 0,
            ordinal_position: 0,
            schema_version: 0,
            is_dropped: false,
            name: def.name.clone(),
            data_type: def.data_type,
            constraint: ColumnConstraint {
                not_null: def.not_null || def.primary_key,
                primary_key: def.primary_key,
                unique: def.unique || def.primary_key,
                has_default: def.default.is_some(),
                default_literal: def
                    .default
                    .as_ref()
                    .map(render_literal)
                    .unwrap_or_default(),
            },
        })
    }

    pub fn create_table(
        &mut self,
        stmt: &CreateTableStmt,
        sql_text: &str,
    ) -> Result<(), ExecutionError> {
        if stmt.columns.len() > MAX_COLUMNS_PER_TABLE {
            return Err(ExecutionError::InvalidConstraint(format!(
                "table holds at most {} columns",
                MAX_COLUMNS_PER_TABLE
            )));
        }
        let mut seen = vec![];
        let mut primary = None;
        for def in &stmt.columns {
            let lowered = def.name.to_ascii_lowercase();
            if seen.contains(&lowered) {
                return Err(ExecutionError::DuplicateColumn(def.name.clone()));
            }
            seen.push(lowered);
            if def.primary_key {
                if primary.is_some() {
                    return Err(ExecutionError::InvalidConstraint(
                        "multiple PRIMARY KEY columns".to_string(),
                    ));
                }
                primary = Some(def.name.clone());
            }
        }
        let columns = stmt
            .columns
            .iter()
            .map(Self::map_column_def)
            .collect::<Result<Vec<_>, _>>()?;

        let root = TableHeap::create(self.pm.clone())?.root_page_id();
        let table = self
            .catalog
            .borrow_mut()
            .create_table(&stmt.name, columns, root, sql_text)
            .map_err(|e| {
                let _ = self.pm.borrow_mut().free_page(root);
                ExecutionError::from(e)
            })?;

        if let Some(pk_column) = primary {
            if let Err(e) = self.create_primary_index(&table, &pk_column) {
                // undo the half-created table
                let _ = self.catalog.borrow_mut().drop_table(&stmt.name);
                let _ = free_chain(&self.pm, root);
                return Err(e);
            }
        }
        info!("ddl: created table '{}'", stmt.name);
        Ok(())
    }

    fn create_primary_index(
        &mut self,
        table: &TableEntry,
        pk_column: &str,
    ) -> Result<(), ExecutionError> {
        let name = format!("{}_pk", table.name);
        if self.catalog.borrow_mut().index_by_name(&name)?.is_some() {
            return Ok(());
        }
        let columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let column = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(pk_column))
            .ok_or_else(|| ExecutionError::ColumnNotFound(pk_column.to_string()))?;
        let entry = self.catalog.borrow_mut().create_index(IndexEntry {
            index_id: 0,
            table_id: table.id,
            name: name.clone(),
            column_ids: vec![column.column_id],
            is_unique: true,
            is_primary: true,
            root_page_id: INVALID_PAGE_ID,
            create_sql: format!(
                "CREATE UNIQUE INDEX {} ON {}({})",
                name, table.name, column.name
            ),
        })?;
        match self.build_index(&entry, &columns, table.root_page_id) {
            Ok(root) => {
                self.catalog.borrow_mut().set_index_root(entry.index_id, root)?;
                Ok(())
            }
            Err(e) => {
                self.indexes.drop_index(&entry);
                let _ = self.catalog.borrow_mut().drop_index(&entry.name);
                Err(e)
            }
        }
    }

    /// Create the index file and fill it from the heap in scan order.
    /// Returns the tree's root page inside the index file.
    fn build_index(
        &self,
        entry: &IndexEntry,
        columns: &[ColumnEntry],
        heap_root: PageId,
    ) -> Result<PageId, ExecutionError> {
        let position_of: HashMap<u32, usize> = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.column_id, idx))
            .collect();
        let positions = entry
            .column_ids
            .iter()
            .map(|column_id| {
                position_of.get(column_id).copied().ok_or_else(|| {
                    ExecutionError::ColumnNotFound(format!("column id {}", column_id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let key_types = positions.iter().map(|&p| columns[p].data_type).collect_vec();

        let mut handle = self.indexes.create_index(entry)?;
        let heap = TableHeap::open(self.pm.clone(), heap_root);
        for row in heap.iter() {
            let (loc, payload) = row?;
            let values = decode_row(columns, &payload)?;
            let key_values = positions.iter().map(|&p| values[p].clone()).collect_vec();
            let key = record::encode(&key_values, &key_types)?;
            handle.tree().insert(&key, record_id_of(loc))?;
        }
        Ok(handle.tree_ref().root_page_id())
    }

    pub fn drop_table(&mut self, stmt: &DropTableStmt) -> Result<bool, ExecutionError> {
        let table = match self.catalog.borrow_mut().table_by_name(&stmt.name)? {
            Some(table) => table,
            None if stmt.if_exists => return Ok(false),
            None => return Err(ExecutionError::TableNotFound(stmt.name.clone())),
        };
        // index files first, then catalog rows, then the heap chain
        let indexes = self.catalog.borrow_mut().indexes_of(table.id)?;
        for entry in &indexes {
            self.indexes.drop_index(entry);
        }
        self.catalog.borrow_mut().drop_table(&stmt.name)?;
        free_chain(&self.pm, table.root_page_id)?;
        info!("ddl: dropped table '{}'", stmt.name);
        Ok(true)
    }

    pub fn create_index(
        &mut self,
        stmt: &CreateIndexStmt,
        sql_text: &str,
    ) -> Result<(), ExecutionError> {
        let table = self
            .catalog
            .borrow_mut()
            .table_by_name(&stmt.table)?
            .ok_or_else(|| ExecutionError::TableNotFound(stmt.table.clone()))?;
        let columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let column_ids = stmt
            .columns
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|c| c.column_id)
                    .ok_or_else(|| ExecutionError::ColumnNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let entry = self.catalog.borrow_mut().create_index(IndexEntry {
            index_id: 0,
            table_id: table.id,
            name: stmt.name.clone(),
            column_ids,
            is_unique: stmt.unique,
            is_primary: false,
            root_page_id: INVALID_PAGE_ID,
            create_sql: sql_text.to_string(),
        })?;
        match self.build_index(&entry, &columns, table.root_page_id) {
            Ok(root) => {
                self.catalog.borrow_mut().set_index_root(entry.index_id, root)?;
                info!("ddl: created index '{}'", stmt.name);
                Ok(())
            }
            Err(e) => {
                self.indexes.drop_index(&entry);
                let _ = self.catalog.borrow_mut().drop_index(&entry.name);
                Err(e)
            }
        }
    }

    pub fn drop_index(&mut self, stmt: &DropIndexStmt) -> Result<bool, ExecutionError> {
        let entry = match self.catalog.borrow_mut().index_by_name(&stmt.name)? {
            Some(entry) => entry,
            None if stmt.if_exists => return Ok(false),
            None => {
                return Err(ExecutionError::Index(IndexError::IndexNotFound(
                    stmt.name.clone(),
                )))
            }
        };
        self.indexes.drop_index(&entry);
        self.catalog.borrow_mut().drop_index(&stmt.name)?;
        info!("ddl: dropped index '{}'", stmt.name);
        Ok(true)
    }

    pub fn alter_table(&mut self, stmt: &AlterTableStmt) -> Result<(), ExecutionError> {
        match &stmt.action {
            AlterAction::AddColumn(def) => self.add_column(&stmt.table, def),
            AlterAction::DropColumn(column) => self.drop_column(&stmt.table, column),
        }
    }

    fn add_column(&mut self, table_name: &str, def: &ColumnDef) -> Result<(), ExecutionError> {
        let table = self
            .catalog
            .borrow_mut()
            .table_by_name(table_name)?
            .ok_or_else(|| ExecutionError::TableNotFound(table_name.to_string()))?;
        if def.primary_key {
            return Err(ExecutionError::InvalidConstraint(
                "cannot add a PRIMARY KEY column".to_string(),
            ));
        }
        let column = Self::map_column_def(def)?;
        let old_columns = self.catalog.borrow_mut().columns_of(table.id)?;
        if old_columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&column.name))
        {
            return Err(ExecutionError::DuplicateColumn(column.name));
        }
        if old_columns.len() >= MAX_COLUMNS_PER_TABLE {
            return Err(ExecutionError::InvalidConstraint(format!(
                "table holds at most {} columns",
                MAX_COLUMNS_PER_TABLE
            )));
        }
        let fill_value = match &def.default {
            Some(default) => literal_to_datum(default, Some(def.data_type))?,
            None if column.constraint.not_null => {
                return Err(ExecutionError::InvalidConstraint(format!(
                    "column '{}' is NOT NULL and has no default",
                    column.name
                )))
            }
            None => Datum::null_of(def.data_type),
        };

        // build new, swap, free old
        let new_column_id = table.next_column_id;
        let old_specs = specs_of(&old_columns);
        let mut new_specs = old_specs.clone();
        new_specs.push(ColumnSpec {
            column_id: new_column_id,
            data_type: def.data_type,
        });
        let mut fill = HashMap::new();
        fill.insert(new_column_id, fill_value);
        let new_root = rewrite(
            self.pm.clone(),
            table.root_page_id,
            &old_specs,
            &new_specs,
            &fill,
        )?;
        self.catalog.borrow_mut().add_column(table.id, column, None)?;
        self.catalog.borrow_mut().set_table_root(table.id, new_root)?;
        free_chain(&self.pm, table.root_page_id)?;

        let new_columns = self.catalog.borrow_mut().columns_of(table.id)?;
        self.rebuild_indexes(table.id, &new_columns, new_root, None)?;
        info!("ddl: added column '{}' to '{}'", def.name, table_name);
        Ok(())
    }

    fn drop_column(&mut self, table_name: &str, column_name: &str) -> Result<(), ExecutionError> {
        let table = self
            .catalog
            .borrow_mut()
            .table_by_name(table_name)?
            .ok_or_else(|| ExecutionError::TableNotFound(table_name.to_string()))?;
        let old_columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let target = old_columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column_name))
            .ok_or_else(|| ExecutionError::ColumnNotFound(column_name.to_string()))?
            .clone();
        if target.constraint.primary_key {
            return Err(ExecutionError::InvalidConstraint(
                "cannot drop a PRIMARY KEY column".to_string(),
            ));
        }
        if old_columns.len() == 1 {
            return Err(ExecutionError::InvalidConstraint(
                "cannot drop the last column".to_string(),
            ));
        }

        let old_specs = specs_of(&old_columns);
        let new_specs = old_specs
            .iter()
            .filter(|s| s.column_id != target.column_id)
            .cloned()
            .collect_vec();
        let new_root = rewrite(
            self.pm.clone(),
            table.root_page_id,
            &old_specs,
            &new_specs,
            &HashMap::new(),
        )?;
        self.catalog.borrow_mut().drop_column(table.id, column_name)?;
        self.catalog.borrow_mut().set_table_root(table.id, new_root)?;
        free_chain(&self.pm, table.root_page_id)?;

        let new_columns = self.catalog.borrow_mut().columns_of(table.id)?;
        self.rebuild_indexes(table.id, &new_columns, new_root, Some(target.column_id))?;
        info!(
            "ddl: dropped column '{}' from '{}'",
            column_name, table_name
        );
        Ok(())
    }

    /// After a heap rewrite every record id changed: recreate each index
    /// file from the new heap. Indexes referencing `dropped_column` are
    /// dropped outright.
    fn rebuild_indexes(
        &mut self,
        table_id: u32,
        columns: &[ColumnEntry],
        heap_root: PageId,
        dropped_column: Option<u32>,
    ) -> Result<(), ExecutionError> {
        let indexes = self.catalog.borrow_mut().indexes_of(table_id)?;
        for entry in indexes {
            if dropped_column.map_or(false, |id| entry.column_ids.contains(&id)) {
                self.indexes.drop_index(&entry);
                self.catalog.borrow_mut().drop_index(&entry.name)?;
                info!("ddl: dropped index '{}' with its column", entry.name);
                continue;
            }
            let root = self.build_index(&entry, columns, heap_root)?;
            self.catalog.borrow_mut().set_index_root(entry.index_id, root)?;
        }
        Ok(())
    }
}

fn specs_of(columns: &[ColumnEntry]) -> Vec<ColumnSpec> {
    columns
        .iter()
        .map(|c| ColumnSpec {
            column_id: c.column_id,
            data_type: c.data_type,
        })
        .collect_vec()
}
