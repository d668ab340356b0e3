use crate::catalog::{CatalogError, ColumnEntry, IndexEntry};
use crate::datum::Datum;
use crate::expr::ExprError;
use crate::index::{IndexError, IndexHandle, IndexManager};
use crate::record::{self, RecordError};
use crate::sql::ast::Literal;
use crate::storage::StorageError;
use crate::table::TableError;
use itertools::Itertools;
use std::collections::HashMap;
use thiserror::Error;

mod ddl;
mod dml;
mod plan;

pub use ddl::DdlExecutor;
pub use dml::{DmlExecutor, IndexUsageObserver, SelectOutput};
pub use plan::{extract_predicates, select_access_path, AccessPath, ColumnPredicate, PredicateSet};

/// Encode one row for the heap, enforcing per-column constraints: NOT
/// NULL rejection and VARCHAR length bounds.
pub(crate) fn encode_row(
    columns: &[ColumnEntry],
    values: &[Datum],
) -> Result<Vec<u8>, ExecutionError> {
    if columns.len() != values.len() {
        return Err(ExecutionError::SchemaMismatch(format!(
            "{} values for {} columns",
            values.len(),
            columns.len()
        )));
    }
    for (column, value) in columns.iter().zip(values.iter()) {
        if value.is_null() && column.constraint.not_null {
            return Err(ExecutionError::InvalidConstraint(format!(
                "column '{}' is NOT NULL",
                column.name
            )));
        }
        if let crate::datum::DataType::Varchar(limit) = column.data_type {
            if let Some(text) = value.as_str() {
                if text.len() > limit as usize {
                    return Err(ExecutionError::InvalidConstraint(format!(
                        "value too long for column '{}'",
                        column.name
                    )));
                }
            }
        }
    }
    let types = columns.iter().map(|c| c.data_type).collect_vec();
    Ok(record::encode(values, &types)?)
}

pub(crate) fn decode_row(
    columns: &[ColumnEntry],
    payload: &[u8],
) -> Result<Vec<Datum>, ExecutionError> {
    let types = columns.iter().map(|c| c.data_type).collect_vec();
    Ok(record::decode(payload, &types)?)
}

/// One open index of the statement's table, with the positions of its
/// key columns in the row.
pub(crate) struct IndexContext {
    pub entry: IndexEntry,
    pub handle: IndexHandle,
    /// row positions of `entry.column_ids`, in index column order
    pub key_positions: Vec<usize>,
}

impl IndexContext {
    pub fn key_for(&self, columns: &[ColumnEntry], values: &[Datum]) -> Result<Vec<u8>, ExecutionError> {
        let key_values = self
            .key_positions
            .iter()
            .map(|&pos| values[pos].clone())
            .collect_vec();
        let key_types = self
            .key_positions
            .iter()
            .map(|&pos| columns[pos].data_type)
            .collect_vec();
        Ok(record::encode(&key_values, &key_types)?)
    }
}

/// Open every index of a table, resolving key column positions.
pub(crate) fn load_index_contexts(
    manager: &IndexManager,
    indexes: Vec<IndexEntry>,
    columns: &[ColumnEntry],
) -> Result<Vec<IndexContext>, ExecutionError> {
    let position_of: HashMap<u32, usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.column_id, idx))
        .collect();
    let mut contexts = vec![];
    for entry in indexes {
        let key_positions = entry
            .column_ids
            .iter()
            .map(|column_id| {
                position_of.get(column_id).copied().ok_or_else(|| {
                    ExecutionError::Internal(format!(
                        "index '{}' references missing column {}",
                        entry.name, column_id
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let handle = manager.open_index(&entry)?;
        contexts.push(IndexContext {
            entry,
            handle,
            key_positions,
        });
    }
    Ok(contexts)
}

/// Render a literal back to SQL text, the form the catalog stores for
/// column defaults.
pub(crate) fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Integer(value) => value.to_string(),
        Literal::Decimal(value) => value.to_string(),
        Literal::String(value) => format!("'{}'", value.replace('\'', "''")),
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("ambiguous column '{0}'")]
    AmbiguousColumn(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    Index(#[from] IndexError),
    #[error("{0}")]
    Table(#[from] TableError),
    #[error("{0}")]
    Record(#[from] RecordError),
}

impl From<ExprError> for ExecutionError {
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::ColumnNotFound(name) => ExecutionError::ColumnNotFound(name),
            ExprError::AmbiguousColumn(name) => ExecutionError::AmbiguousColumn(name),
            ExprError::TypeError(msg) => ExecutionError::TypeError(msg),
            ExprError::Internal(msg) => ExecutionError::Internal(msg),
        }
    }
}
