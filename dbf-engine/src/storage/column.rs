//! Column descriptors and per-type field decoding
//!
//! Every column occupies a fixed span of each row. Decoding takes the row
//! bytes, the column's offset in that buffer and the reader's text encoding,
//! and produces a typed [`Value`] or `None` for an absent value.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use encoding_rs::Encoding;
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::str::FromStr;

use super::value::{SemanticType, Value};
use crate::error::{DbfError, DbfResult};

/// Native type codes found in column descriptors
pub mod native {
    pub const CHAR: u8 = b'C';
    pub const DATE: u8 = b'D';
    pub const FLOAT: u8 = b'F';
    pub const LONG: u8 = b'I';
    pub const LOGICAL: u8 = b'L';
    pub const NUMERIC: u8 = b'N';
    pub const DATETIME: u8 = b'T';
}

/// Julian day number of 0001-01-01, the epoch of FoxPro datetime fields
pub const FOXPRO_JULIAN_EPOCH: u32 = 1_721_426;

/// Decode behavior of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Character data, trailing NULs and spaces trimmed
    String,
    /// `YYYYMMDD` text
    Date,
    /// One of `TtYyFfNn`, anything else is absent
    Boolean,
    /// Little-endian signed 32-bit integer
    Integer32,
    /// Numeric text with `.` as decimal separator
    Decimal,
    /// FoxPro julian day + milliseconds of day
    FoxProDateTime,
    /// Unrecognized type, passed through byte-exact
    Raw(u8),
}

impl ColumnKind {
    /// Map a native type code to the kind decoded by default
    pub fn from_native(code: u8) -> Self {
        match code {
            native::CHAR => ColumnKind::String,
            native::DATE => ColumnKind::Date,
            native::LONG => ColumnKind::Integer32,
            native::LOGICAL => ColumnKind::Boolean,
            native::NUMERIC | native::FLOAT => ColumnKind::Decimal,
            other => ColumnKind::Raw(other),
        }
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            ColumnKind::String => SemanticType::String,
            ColumnKind::Date => SemanticType::Date,
            ColumnKind::Boolean => SemanticType::Boolean,
            ColumnKind::Integer32 => SemanticType::Integer32,
            ColumnKind::Decimal => SemanticType::Decimal,
            ColumnKind::FoxProDateTime => SemanticType::DateTime,
            ColumnKind::Raw(_) => SemanticType::Raw,
        }
    }
}

/// A column of a dBASE table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    native_type: u8,
    /// Offset from the first byte after the deletion flag
    offset: usize,
    size: usize,
    decimal_count: u8,
}

impl Column {
    /// Size of a column descriptor in the header
    pub const DESCRIPTOR_SIZE: usize = 32;

    /// Length of the name field in a descriptor
    pub const NAME_SIZE: usize = 11;

    pub fn new(
        name: impl Into<String>,
        kind: ColumnKind,
        native_type: u8,
        offset: usize,
        size: usize,
        decimal_count: u8,
    ) -> Self {
        Column {
            name: name.into(),
            kind,
            native_type,
            offset,
            size,
            decimal_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.kind.semantic_type()
    }

    /// Type code as stored on disk
    pub fn native_type(&self) -> u8 {
        self.native_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn decimal_count(&self) -> u8 {
        self.decimal_count
    }

    /// First byte past this column, relative to the row body
    pub(crate) fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Decode this column from `buffer`, where its bytes start at `at`.
    ///
    /// Reads exactly `size` bytes. A zero-size column is always absent.
    pub fn decode(
        &self,
        buffer: &[u8],
        at: usize,
        encoding: &'static Encoding,
    ) -> DbfResult<Option<Value>> {
        if self.size == 0 {
            return Ok(None);
        }
        let bytes = buffer.get(at..at + self.size).ok_or_else(|| {
            DbfError::OutOfRange(format!(
                "column '{}' spans {}..{} past a {} byte buffer",
                self.name,
                at,
                at + self.size,
                buffer.len()
            ))
        })?;

        let value = match self.kind {
            ColumnKind::String => decode_string(bytes, encoding).map(Value::String),
            ColumnKind::Date => decode_date(bytes, encoding)?.map(Value::Date),
            ColumnKind::Boolean => decode_boolean(bytes).map(Value::Boolean),
            ColumnKind::Integer32 => decode_int32(bytes).map(Value::Integer),
            ColumnKind::Decimal => decode_decimal(bytes, encoding).map(Value::Decimal),
            ColumnKind::FoxProDateTime => decode_foxpro_datetime(bytes).map(Value::DateTime),
            ColumnKind::Raw(_) => Some(Value::Raw(bytes.to_vec())),
        };
        Ok(value)
    }
}

fn decode_text<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    encoding.decode_without_bom_handling(bytes).0
}

fn decode_string(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let text = decode_text(bytes, encoding);
    let trimmed = text.trim_end_matches(['\0', ' ']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn decode_date(bytes: &[u8], encoding: &'static Encoding) -> DbfResult<Option<NaiveDate>> {
    let text = decode_text(bytes, encoding);
    if text.trim_matches(|c: char| c.is_whitespace() || c == '\0').is_empty() {
        return Ok(None);
    }

    let invalid = || DbfError::Format(format!("'{}' is not a YYYYMMDD date", text));
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = text[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = text[4..6].parse().map_err(|_| invalid())?;
    let day: u32 = text[6..8].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or_else(invalid)
}

fn decode_boolean(bytes: &[u8]) -> Option<bool> {
    match bytes[0].to_ascii_uppercase() {
        b'T' | b'Y' => Some(true),
        b'F' | b'N' => Some(false),
        _ => None,
    }
}

fn decode_int32(bytes: &[u8]) -> Option<i32> {
    if bytes.len() < 4 {
        return None;
    }
    Some(LittleEndian::read_i32(&bytes[..4]))
}

fn decode_decimal(bytes: &[u8], encoding: &'static Encoding) -> Option<Decimal> {
    let text = decode_text(bytes, encoding);
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if !is_float_literal(text) {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// `[+-]digits[.digits][(e|E)[+-]digits]`, with digits on at least one side
/// of the point
fn is_float_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    let digits = |i: &mut usize| {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i - start
    };

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let mut mantissa = digits(&mut i);
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        mantissa += digits(&mut i);
    }
    if mantissa == 0 {
        return false;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        if digits(&mut i) == 0 {
            return false;
        }
    }
    i == bytes.len()
}

fn decode_foxpro_datetime(bytes: &[u8]) -> Option<NaiveDateTime> {
    if bytes.len() < 8 {
        return None;
    }
    let julian_day = LittleEndian::read_u32(&bytes[0..4]);
    let millis = LittleEndian::read_u32(&bytes[4..8]);
    let days = julian_day.checked_sub(FOXPRO_JULIAN_EPOCH)?;

    let date = NaiveDate::from_ymd_opt(1, 1, 1)?.checked_add_days(Days::new(days as u64))?;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis as i64))
}
