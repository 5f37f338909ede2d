//! Decoded field values

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Semantic type of a column, as seen by typed getters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    String,
    Date,
    Boolean,
    Integer32,
    Decimal,
    DateTime,
    Raw,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SemanticType::String => "string",
            SemanticType::Date => "date",
            SemanticType::Boolean => "boolean",
            SemanticType::Integer32 => "int32",
            SemanticType::Decimal => "decimal",
            SemanticType::DateTime => "datetime",
            SemanticType::Raw => "raw",
        })
    }
}

/// A decoded field value. An absent value is represented as `None` by the
/// decoders, never as an empty variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Date(NaiveDate),
    Boolean(bool),
    Integer(i32),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Raw(Vec<u8>),
}

impl Value {
    /// The semantic type this value belongs to
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Value::String(_) => SemanticType::String,
            Value::Date(_) => SemanticType::Date,
            Value::Boolean(_) => SemanticType::Boolean,
            Value::Integer(_) => SemanticType::Integer32,
            Value::Decimal(_) => SemanticType::Decimal,
            Value::DateTime(_) => SemanticType::DateTime,
            Value::Raw(_) => SemanticType::Raw,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}
