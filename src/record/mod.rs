use crate::datum::{DataType, Datum};
use crate::storage::StorageError;
use std::convert::TryInto;
use thiserror::Error;

///
/// Record Format:
///
/// ```text
/// | field_count | null_bitmap | Field[0] | Field[1] | ...
/// ```
///
/// Field Format:
///
/// ```text
/// | type_tag | length | payload |
/// ```
///
/// The null bitmap holds one bit per field; a set bit means NULL and the
/// field's length is zero.
///

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid record format: {0}")]
    Invalid(String),
}

impl From<RecordError> for StorageError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Invalid(msg) => StorageError::InvalidRecordFormat(msg),
        }
    }
}

pub fn encode(values: &[Datum], types: &[DataType]) -> Result<Vec<u8>, RecordError> {
    if values.len() != types.len() {
        return Err(RecordError::Invalid(format!(
            "encoding {} values against {} columns",
            values.len(),
            types.len()
        )));
    }
    let bitmap_len = (values.len() + 7) / 8;
    let mut bytes = vec![];
    bytes.extend_from_slice(&(values.len() as u16).to_le_bytes());
    let bitmap_start = bytes.len();
    bytes.resize(bitmap_start + bitmap_len, 0u8);
    for (idx, (value, data_type)) in values.iter().zip(types.iter()).enumerate() {
        bytes.push(data_type.type_tag());
        if value.is_null() {
            bytes[bitmap_start + idx / 8] |= 1 << (idx % 8);
            bytes.extend_from_slice(&0u16.to_le_bytes());
            continue;
        }
        let payload = value.to_bytes();
        if payload.len() > u16::MAX as usize {
            return Err(RecordError::Invalid(format!(
                "field {} of {} bytes does not fit a record",
                idx,
                payload.len()
            )));
        }
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8], types: &[DataType]) -> Result<Vec<Datum>, RecordError> {
    if bytes.len() < 2 {
        return Err(RecordError::Invalid("record shorter than its header".to_string()));
    }
    let field_count = u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as usize;
    if field_count != types.len() {
        return Err(RecordError::Invalid(format!(
            "record has {} fields, schema expects {}",
            field_count,
            types.len()
        )));
    }
    let bitmap_len = (field_count + 7) / 8;
    if bytes.len() < 2 + bitmap_len {
        return Err(RecordError::Invalid("record truncated in null bitmap".to_string()));
    }
    let bitmap = &bytes[2..2 + bitmap_len];
    let mut offset = 2 + bitmap_len;
    let mut values = vec![];
    for (idx, expected) in types.iter().enumerate() {
        if offset + 3 > bytes.len() {
            return Err(RecordError::Invalid(format!(
                "record truncated at field {}",
                idx
            )));
        }
        let tag = bytes[offset];
        let length =
            u16::from_le_bytes(bytes[offset + 1..offset + 3].try_into().unwrap()) as usize;
        offset += 3;
        let data_type = DataType::from_tag(tag, expected.length())
            .map_err(|_| RecordError::Invalid(format!("unknown type tag {}", tag)))?;
        if data_type.type_tag() != expected.type_tag() {
            return Err(RecordError::Invalid(format!(
                "field {} stored as {}, schema expects {}",
                idx, data_type, expected
            )));
        }
        if offset + length > bytes.len() {
            return Err(RecordError::Invalid(format!(
                "field {} length {} exceeds record payload",
                idx, length
            )));
        }
        let is_null = bitmap[idx / 8] >> (idx % 8) & 1 == 1;
        if is_null {
            values.push(Datum::null_of(*expected));
        } else {
            let datum = Datum::from_bytes(*expected, &bytes[offset..offset + length])
                .map_err(|e| RecordError::Invalid(e.to_string()))?;
            values.push(datum);
        }
        offset += length;
    }
    Ok(values)
}
