use crate::datum::{DataType, DataTypeError};
use crate::record::RecordError;
use crate::storage::{PageId, StorageError};
use std::convert::TryInto;
use thiserror::Error;

mod manager;

pub use manager::{CatalogManager, CatalogManagerRef};

pub const MAX_COLUMNS_PER_TABLE: usize = 32;

/// ordinal assigned to dropped columns, keeping them out of the dense
/// active numbering
pub const DROPPED_ORDINAL: u16 = u16::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnConstraint {
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub has_default: bool,
    pub default_literal: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    pub table_id: u32,
    pub column_id: u32,
    pub ordinal_position: u16,
    pub schema_version: u32,
    pub is_dropped: bool,
    pub name: String,
    pub data_type: DataType,
    pub constraint: ColumnConstraint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub id: u32,
    pub name: String,
    pub root_page_id: PageId,
    pub schema_version: u32,
    pub next_column_id: u32,
    pub create_sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub index_id: u32,
    pub table_id: u32,
    pub name: String,
    pub column_ids: Vec<u32>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub root_page_id: PageId,
    pub create_sql: String,
}

// entry encoding: little-endian scalars, u16-length-prefixed strings

fn put_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_le_bytes());
}
fn put_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
}
fn put_string(bytes: &mut Vec<u8>, value: &str) {
    put_u16(bytes, value.len() as u16);
    bytes.extend_from_slice(value.as_bytes());
}

struct EntryReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> EntryReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }
    fn take(&mut self, len: usize) -> Result<&'a [u8], CatalogError> {
        if self.offset + len > self.bytes.len() {
            return Err(CatalogError::Corrupt("catalog entry truncated".to_string()));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
    fn u8(&mut self) -> Result<u8, CatalogError> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16, CatalogError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32, CatalogError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn string(&mut self) -> Result<String, CatalogError> {
        let len = self.u16()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).to_string())
    }
}

impl TableEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        put_u32(&mut bytes, self.id);
        put_u32(&mut bytes, self.root_page_id);
        put_u32(&mut bytes, self.schema_version);
        put_u32(&mut bytes, self.next_column_id);
        put_string(&mut bytes, &self.name);
        put_string(&mut bytes, &self.create_sql);
        bytes
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let mut reader = EntryReader::new(bytes);
        Ok(Self {
            id: reader.u32()?,
            root_page_id: reader.u32()?,
            schema_version: reader.u32()?,
            next_column_id: reader.u32()?,
            name: reader.string()?,
            create_sql: reader.string()?,
        })
    }
}

impl ColumnEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        put_u32(&mut bytes, self.table_id);
        put_u32(&mut bytes, self.column_id);
        put_u16(&mut bytes, self.ordinal_position);
        put_u32(&mut bytes, self.schema_version);
        bytes.push(self.is_dropped as u8);
        bytes.push(self.data_type.type_tag());
        put_u16(&mut bytes, self.data_type.length());
        let flags = self.constraint.not_null as u8
            | (self.constraint.primary_key as u8) << 1
            | (self.constraint.unique as u8) << 2
            | (self.constraint.has_default as u8) << 3;
        bytes.push(flags);
        put_string(&mut bytes, &self.name);
        put_string(&mut bytes, &self.constraint.default_literal);
        bytes
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let mut reader = EntryReader::new(bytes);
        let table_id = reader.u32()?;
        let column_id = reader.u32()?;
        let ordinal_position = reader.u16()?;
        let schema_version = reader.u32()?;
        let is_dropped = reader.u8()? != 0;
        let tag = reader.u8()?;
        let length = reader.u16()?;
        let data_type = DataType::from_tag(tag, length)?;
        let flags = reader.u8()?;
        let name = reader.string()?;
        let default_literal = reader.string()?;
        Ok(Self {
            table_id,
            column_id,
            ordinal_position,
            schema_version,
            is_dropped,
            name,
            data_type,
            constraint: ColumnConstraint {
                not_null: flags & 1 != 0,
                primary_key: flags & 2 != 0,
                unique: flags & 4 != 0,
                has_default: flags & 8 != 0,
                default_literal,
            },
        })
    }
}

impl IndexEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        put_u32(&mut bytes, self.index_id);
        put_u32(&mut bytes, self.table_id);
        put_u32(&mut bytes, self.root_page_id);
        bytes.push(self.is_unique as u8);
        bytes.push(self.is_primary as u8);
        put_u16(&mut bytes, self.column_ids.len() as u16);
        for &column_id in &self.column_ids {
            put_u32(&mut bytes, column_id);
        }
        put_string(&mut bytes, &self.name);
        put_string(&mut bytes, &self.create_sql);
        bytes
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let mut reader = EntryReader::new(bytes);
        let index_id = reader.u32()?;
        let table_id = reader.u32()?;
        let root_page_id = reader.u32()?;
        let is_unique = reader.u8()? != 0;
        let is_primary = reader.u8()? != 0;
        let num_columns = reader.u16()? as usize;
        let mut column_ids = vec![];
        for _ in 0..num_columns {
            column_ids.push(reader.u32()?);
        }
        Ok(Self {
            index_id,
            table_id,
            root_page_id,
            is_unique,
            is_primary,
            column_ids,
            name: reader.string()?,
            create_sql: reader.string()?,
        })
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("index '{0}' already exists")]
    IndexExists(String),
    #[error("index '{0}' not found")]
    IndexNotFound(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    #[error("catalog page out of space")]
    OutOfSpace,
    #[error("corrupt catalog: {0}")]
    Corrupt(String),
    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),
    #[error("RecordError: {0}")]
    Record(#[from] RecordError),
}

impl From<DataTypeError> for CatalogError {
    fn from(err: DataTypeError) -> Self {
        CatalogError::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips() {
        let table = TableEntry {
            id: 3,
            name: "users".to_string(),
            root_page_id: 12,
            schema_version: 4,
            next_column_id: 5,
            create_sql: "CREATE TABLE users (id INTEGER PRIMARY KEY)".to_string(),
        };
        assert_eq!(TableEntry::from_bytes(&table.to_bytes()).unwrap(), table);

        let column = ColumnEntry {
            table_id: 3,
            column_id: 2,
            ordinal_position: 1,
            schema_version: 4,
            is_dropped: false,
            name: "name".to_string(),
            data_type: DataType::Varchar(32),
            constraint: ColumnConstraint {
                not_null: true,
                primary_key: false,
                unique: true,
                has_default: true,
                default_literal: "'bob'".to_string(),
            },
        };
        assert_eq!(ColumnEntry::from_bytes(&column.to_bytes()).unwrap(), column);

        let index = IndexEntry {
            index_id: 9,
            table_id: 3,
            name: "users_pk".to_string(),
            column_ids: vec![1, 2],
            is_unique: true,
            is_primary: true,
            root_page_id: 44,
            create_sql: "CREATE UNIQUE INDEX users_pk ON users(id)".to_string(),
        };
        assert_eq!(IndexEntry::from_bytes(&index.to_bytes()).unwrap(), index);
    }

    #[test]
    fn truncated_entry_rejected() {
        let table = TableEntry {
            id: 1,
            name: "t".to_string(),
            root_page_id: 2,
            schema_version: 1,
            next_column_id: 2,
            create_sql: String::new(),
        };
        let bytes = table.to_bytes();
        assert!(TableEntry::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
