use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::convert::TryInto;
use std::fmt;

pub use types::{DataType, DataTypeError};

mod types;

const EPOCH_DAYS_FROM_CE: i64 = 719_163; // 1970-01-01

/// A typed value. `None` in a variant payload is SQL NULL of that type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(Option<bool>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    /// days since 1970-01-01
    Date(Option<i64>),
    /// seconds since the epoch
    Timestamp(Option<i64>),
    Varchar(Option<String>),
    Text(Option<String>),
}

impl Datum {
    pub fn null_of(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => Self::Bool(None),
            DataType::Int => Self::Int(None),
            DataType::BigInt => Self::BigInt(None),
            DataType::Float => Self::Float(None),
            DataType::Double => Self::Double(None),
            DataType::Date => Self::Date(None),
            DataType::Timestamp => Self::Timestamp(None),
            DataType::Varchar(_) => Self::Varchar(None),
            DataType::Text => Self::Text(None),
        }
    }
    pub fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::BigInt(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Double(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::Varchar(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
        }
    }
    /// at-rest payload bytes per the record format; empty for NULL
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(Some(v)) => vec![*v as u8],
            Self::Int(Some(v)) => v.to_le_bytes().to_vec(),
            Self::BigInt(Some(v)) | Self::Date(Some(v)) | Self::Timestamp(Some(v)) => {
                v.to_le_bytes().to_vec()
            }
            Self::Float(Some(v)) => v.to_le_bytes().to_vec(),
            Self::Double(Some(v)) => v.to_le_bytes().to_vec(),
            Self::Varchar(Some(v)) | Self::Text(Some(v)) => v.as_bytes().to_vec(),
            _ => vec![],
        }
    }
    pub fn from_bytes(data_type: DataType, bytes: &[u8]) -> Result<Self, DataTypeError> {
        let width_ok = match data_type.fixed_width() {
            Some(width) => bytes.len() == width,
            None => true,
        };
        if !width_ok {
            return Err(DataTypeError::UndefinedDataType(data_type.type_tag()));
        }
        Ok(match data_type {
            DataType::Bool => Self::Bool(Some(bytes[0] != 0)),
            DataType::Int => Self::Int(Some(i32::from_le_bytes(bytes.try_into().unwrap()))),
            DataType::BigInt => Self::BigInt(Some(i64::from_le_bytes(bytes.try_into().unwrap()))),
            DataType::Float => Self::Float(Some(f32::from_le_bytes(bytes.try_into().unwrap()))),
            DataType::Double => Self::Double(Some(f64::from_le_bytes(bytes.try_into().unwrap()))),
            DataType::Date => Self::Date(Some(i64::from_le_bytes(bytes.try_into().unwrap()))),
            DataType::Timestamp => {
                Self::Timestamp(Some(i64::from_le_bytes(bytes.try_into().unwrap())))
            }
            DataType::Varchar(_) => {
                Self::Varchar(Some(String::from_utf8_lossy(bytes).to_string()))
            }
            DataType::Text => Self::Text(Some(String::from_utf8_lossy(bytes).to_string())),
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(Some(v)) => Some(*v as i64),
            Self::Int(Some(v)) => Some(*v as i64),
            Self::BigInt(Some(v)) | Self::Date(Some(v)) | Self::Timestamp(Some(v)) => Some(*v),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(Some(v)) => Some(*v as f64),
            Self::BigInt(Some(v)) => Some(*v as f64),
            Self::Float(Some(v)) => Some(*v as f64),
            Self::Double(Some(v)) => Some(*v),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Varchar(Some(v)) | Self::Text(Some(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// `YYYY-MM-DD` to days since the epoch
    pub fn parse_date(text: &str) -> Option<i64> {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(|date| date.num_days_from_ce() as i64 - EPOCH_DAYS_FROM_CE)
    }
    pub fn format_date(days: i64) -> String {
        match NaiveDate::from_num_days_from_ce_opt((days + EPOCH_DAYS_FROM_CE) as i32) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => days.to_string(),
        }
    }

    /// Total order used by ORDER BY and the MIN/MAX accumulators: NULL
    /// sorts after every value, numerics compare across widths, strings
    /// lexicographically.
    pub fn sort_cmp(&self, other: &Datum) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        if let (Some(lhs), Some(rhs)) = (self.as_str(), other.as_str()) {
            return lhs.cmp(rhs);
        }
        if let (Self::Bool(Some(lhs)), Self::Bool(Some(rhs))) = (self, other) {
            return lhs.cmp(rhs);
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(lhs), Some(rhs)) => lhs.cmp(&rhs),
                _ => Ordering::Equal,
            },
        }
    }

    /// canonical signature used for DISTINCT deduplication
    pub fn signature(&self) -> String {
        if self.is_null() {
            return "null".to_string();
        }
        match self {
            Self::Bool(_) => format!("b:{}", self),
            Self::Int(_) | Self::BigInt(_) => format!("i:{}", self),
            Self::Float(_) | Self::Double(_) => format!("f:{}", self),
            Self::Date(_) => format!("d:{}", self),
            Self::Timestamp(_) => format!("t:{}", self),
            Self::Varchar(_) | Self::Text(_) => format!("s:{}", self),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match self {
            Self::Bool(Some(v)) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Self::Int(Some(v)) => write!(f, "{}", v),
            Self::BigInt(Some(v)) | Self::Timestamp(Some(v)) => write!(f, "{}", v),
            Self::Float(Some(v)) => write!(f, "{}", v),
            Self::Double(Some(v)) => write!(f, "{}", v),
            Self::Date(Some(v)) => write!(f, "{}", Self::format_date(*v)),
            Self::Varchar(Some(v)) | Self::Text(Some(v)) => write!(f, "{}", v),
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let days = Datum::parse_date("2023-05-01").unwrap();
        assert_eq!(Datum::format_date(days), "2023-05-01");
        assert_eq!(Datum::parse_date("1970-01-01").unwrap(), 0);
        assert!(Datum::parse_date("not-a-date").is_none());
        assert!(Datum::parse_date("2023-13-40").is_none());
    }

    #[test]
    fn bytes_round_trip() {
        let cases = vec![
            (DataType::Bool, Datum::Bool(Some(true))),
            (DataType::Int, Datum::Int(Some(-42))),
            (DataType::BigInt, Datum::BigInt(Some(1 << 40))),
            (DataType::Float, Datum::Float(Some(1.5))),
            (DataType::Double, Datum::Double(Some(-2.25))),
            (DataType::Date, Datum::Date(Some(19_478))),
            (DataType::Timestamp, Datum::Timestamp(Some(1_700_000_000))),
            (DataType::Varchar(16), Datum::Varchar(Some("alice".to_string()))),
            (DataType::Text, Datum::Text(Some("".to_string()))),
        ];
        for (data_type, datum) in cases {
            let bytes = datum.to_bytes();
            assert_eq!(Datum::from_bytes(data_type, &bytes).unwrap(), datum);
        }
    }

    #[test]
    fn display_strings() {
        assert_eq!(Datum::Bool(Some(true)).to_string(), "TRUE");
        assert_eq!(Datum::Bool(None).to_string(), "NULL");
        assert_eq!(Datum::Int(Some(7)).to_string(), "7");
        assert_eq!(Datum::Double(Some(32.75)).to_string(), "32.75");
        assert_eq!(
            Datum::Date(Datum::parse_date("2019-12-12")).to_string(),
            "2019-12-12"
        );
    }

    #[test]
    fn null_sorts_last() {
        let mut datums = vec![
            Datum::Int(Some(3)),
            Datum::Int(None),
            Datum::Int(Some(1)),
        ];
        datums.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            datums,
            vec![Datum::Int(Some(1)), Datum::Int(Some(3)), Datum::Int(None)]
        );
    }
}
