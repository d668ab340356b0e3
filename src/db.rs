use crate::catalog::{CatalogManager, CatalogManagerRef};
use crate::execution::{DdlExecutor, DmlExecutor, ExecutionError, IndexUsageObserver};
use crate::index::IndexManager;
use crate::sql::ast::Statement;
use crate::sql::{parse, SyntaxError};
use crate::storage::{PageManager, PageManagerRef, StorageError, DEFAULT_POOL_SIZE};
use itertools::Itertools;
use log::debug;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// Rows of display strings: `NULL`, `TRUE`/`FALSE`, `YYYY-MM-DD` dates,
/// locale-independent numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectResult {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Created,
    Dropped,
    Altered,
    Inserted(usize),
    Updated(usize),
    Deleted(usize),
    Truncated,
    Select(SelectResult),
}

impl StatementResult {
    pub fn rows_affected(&self) -> usize {
        match self {
            Self::Inserted(count) | Self::Updated(count) | Self::Deleted(count) => *count,
            Self::Select(result) => result.rows.len(),
            _ => 0,
        }
    }
    pub fn as_select(&self) -> Option<&SelectResult> {
        match self {
            Self::Select(result) => Some(result),
            _ => None,
        }
    }
}

/// A single-user session over one database file plus its index
/// directory. Statements run synchronously to completion.
pub struct Database {
    pm: PageManagerRef,
    catalog: CatalogManagerRef,
    indexes: Rc<IndexManager>,
    observer: Option<IndexUsageObserver>,
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KizunaError> {
        let index_dir = PathBuf::from(format!("{}.idx", path.as_ref().display()));
        Self::open_with(path, index_dir, DEFAULT_POOL_SIZE)
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        index_dir: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<Self, KizunaError> {
        let pm = PageManager::open_shared(&path, true, capacity)
            .map_err(ExecutionError::Storage)?;
        let catalog = CatalogManager::new_shared(pm.clone());
        let indexes = Rc::new(IndexManager::new(index_dir).map_err(ExecutionError::Index)?);
        Ok(Self {
            pm,
            catalog,
            indexes,
            observer: None,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn catalog(&self) -> CatalogManagerRef {
        self.catalog.clone()
    }

    /// Register the per-statement index usage callback used by tests to
    /// assert access paths.
    pub fn set_index_usage_observer(&mut self, observer: Option<IndexUsageObserver>) {
        self.observer = observer;
    }

    pub fn execute(&mut self, sql: &str) -> Result<StatementResult, KizunaError> {
        debug!("execute: {}", sql);
        let statement = parse(sql)?;
        let mut ddl = DdlExecutor::new(self.pm.clone(), self.catalog.clone(), self.indexes.clone());
        let mut dml = DmlExecutor::new(
            self.pm.clone(),
            self.catalog.clone(),
            self.indexes.clone(),
            self.observer.clone(),
        );
        let result = match &statement {
            Statement::CreateTable(stmt) => {
                ddl.create_table(stmt, sql)?;
                StatementResult::Created
            }
            Statement::DropTable(stmt) => {
                ddl.drop_table(stmt)?;
                StatementResult::Dropped
            }
            Statement::CreateIndex(stmt) => {
                ddl.create_index(stmt, sql)?;
                StatementResult::Created
            }
            Statement::DropIndex(stmt) => {
                ddl.drop_index(stmt)?;
                StatementResult::Dropped
            }
            Statement::AlterTable(stmt) => {
                ddl.alter_table(stmt)?;
                StatementResult::Altered
            }
            Statement::Insert(stmt) => StatementResult::Inserted(dml.insert(stmt)?),
            Statement::Select(stmt) => {
                let output = dml.select(stmt)?;
                StatementResult::Select(SelectResult {
                    column_names: output.column_names,
                    rows: output
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|value| value.to_string()).collect_vec())
                        .collect_vec(),
                })
            }
            Statement::Update(stmt) => StatementResult::Updated(dml.update(stmt)?),
            Statement::Delete(stmt) => StatementResult::Deleted(dml.delete(stmt)?),
            Statement::Truncate(stmt) => {
                dml.truncate(stmt)?;
                StatementResult::Truncated
            }
        };
        Ok(result)
    }

    pub fn close(self) -> Result<(), KizunaError> {
        self.pm
            .borrow_mut()
            .flush_all()
            .map_err(ExecutionError::Storage)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum KizunaError {
    #[error("SyntaxError: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("ExecutionError: {0}")]
    Execution(#[from] ExecutionError),
    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),
}
