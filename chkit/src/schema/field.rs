// chkit/src/schema/field.rs
//
// Column types and their TabSeparated text representation.
//

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::tsv::{escape, parse_array, quote, unescape};
use crate::errors::{ClickHouseError, Result};
use crate::types::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    FixedString(usize),
    Date,
    DateTime,
    Enum8(Vec<(String, i16)>),
    Enum16(Vec<(String, i16)>),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn array(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// `Enum8` whose values are numbered from 1 in declaration order.
    pub fn enum8<S: AsRef<str>>(names: &[S]) -> Self {
        FieldType::Enum8(numbered(names))
    }

    pub fn enum16<S: AsRef<str>>(names: &[S]) -> Self {
        FieldType::Enum16(numbered(names))
    }

    /// Value used when a row does not set this column.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => Value::Int(0),
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64 => {
                Value::UInt(0)
            }
            FieldType::Float32 | FieldType::Float64 => Value::Float(0.0),
            FieldType::String | FieldType::FixedString(_) => Value::String(String::new()),
            FieldType::Date => Value::Date(NaiveDate::default()),
            FieldType::DateTime => Value::DateTime(DateTime::<Utc>::default()),
            FieldType::Enum8(variants) | FieldType::Enum16(variants) => variants
                .first()
                .map(|(name, _)| Value::Enum(name.clone()))
                .unwrap_or(Value::Enum(String::new())),
            FieldType::Array(_) => Value::Array(Vec::new()),
        }
    }

    /// Convert `value` into the canonical variant for this type, checking
    /// ranges and enum membership. Strings are parsed as their text form.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (FieldType::Array(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| inner.coerce(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (FieldType::Array(_), Value::String(text)) => self.parse_value(&text),
            (FieldType::Array(_), other) => Err(mismatch(self, &other)),

            (FieldType::String, Value::String(s)) => Ok(Value::String(s)),
            (FieldType::FixedString(n), Value::String(s)) => {
                if s.len() > *n {
                    Err(ClickHouseError::ValidationError(format!(
                        "{:?} is longer than FixedString({})",
                        s, n
                    )))
                } else {
                    Ok(Value::String(s))
                }
            }
            (FieldType::String | FieldType::FixedString(_), other) => Err(mismatch(self, &other)),

            (FieldType::Enum8(variants) | FieldType::Enum16(variants), value) => {
                let name = match &value {
                    Value::Enum(name) | Value::String(name) => variants
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(n, _)| n.clone()),
                    Value::Int(i) => variants.iter().find(|(_, v)| *v as i64 == *i).map(|(n, _)| n.clone()),
                    Value::UInt(u) => variants
                        .iter()
                        .find(|(_, v)| *v >= 0 && *v as u64 == *u)
                        .map(|(n, _)| n.clone()),
                    _ => None,
                };
                name.map(Value::Enum).ok_or_else(|| {
                    ClickHouseError::ValidationError(format!("{} is not a member of {}", value, self))
                })
            }

            (FieldType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (FieldType::Date, Value::DateTime(dt)) => Ok(Value::Date(dt.date_naive())),
            (FieldType::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
            (FieldType::DateTime, Value::Date(d)) => Ok(Value::DateTime(
                Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap_or_default()),
            )),
            (FieldType::DateTime, Value::Int(ts)) => timestamp(ts).map(Value::DateTime),
            (FieldType::DateTime, Value::UInt(ts)) => i64::try_from(ts)
                .map_err(|_| mismatch(self, &Value::UInt(ts)))
                .and_then(timestamp)
                .map(Value::DateTime),
            (FieldType::Date | FieldType::DateTime, Value::String(text)) => self.parse_value(&text),
            (FieldType::Date | FieldType::DateTime, other) => Err(mismatch(self, &other)),

            (FieldType::Float32 | FieldType::Float64, value) => {
                let f = match value {
                    Value::Float(f) => f,
                    Value::Int(i) => i as f64,
                    Value::UInt(u) => u as f64,
                    Value::String(text) => return self.parse_value(&text),
                    other => return Err(mismatch(self, &other)),
                };
                if *self == FieldType::Float32 && f.is_finite() && f.abs() > f32::MAX as f64 {
                    return Err(ClickHouseError::ValidationError(format!(
                        "{} is out of range for Float32",
                        f
                    )));
                }
                Ok(Value::Float(f))
            }

            (int_type, value) => {
                let (min, max) = int_type.int_range().ok_or_else(|| mismatch(int_type, &value))?;
                let n: i128 = match value {
                    Value::Int(i) => i as i128,
                    Value::UInt(u) => u as i128,
                    Value::Float(f) if f.fract() == 0.0 && f.is_finite() => f as i128,
                    Value::String(text) => return int_type.parse_value(&text),
                    other => return Err(mismatch(int_type, &other)),
                };
                if n < min || n > max {
                    return Err(ClickHouseError::ValidationError(format!(
                        "{} is out of range for {}",
                        n, int_type
                    )));
                }
                if int_type.is_unsigned() {
                    Ok(Value::UInt(n as u64))
                } else {
                    Ok(Value::Int(n as i64))
                }
            }
        }
    }

    /// Parse the unescaped text form of one value.
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        match self {
            FieldType::String | FieldType::FixedString(_) => {
                // FixedString columns come back NUL-padded
                let s = match self {
                    FieldType::FixedString(_) => text.trim_end_matches('\0'),
                    _ => text,
                };
                self.coerce(Value::String(s.to_string()))
            }
            FieldType::Date => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| parse_error(self, text, e)),
            FieldType::DateTime => {
                let text = text.trim();
                if let Ok(ts) = text.parse::<i64>() {
                    return timestamp(ts).map(Value::DateTime);
                }
                NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                    .map(|naive| Value::DateTime(Utc.from_utc_datetime(&naive)))
                    .map_err(|e| parse_error(self, text, e))
            }
            FieldType::Float32 | FieldType::Float64 => text
                .trim()
                .parse::<f64>()
                .map_err(|e| parse_error(self, text, e))
                .and_then(|f| self.coerce(Value::Float(f))),
            FieldType::Enum8(_) | FieldType::Enum16(_) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(n) => self.coerce(Value::Int(n)),
                    Err(_) => self.coerce(Value::Enum(text.to_string())),
                }
            }
            FieldType::Array(inner) => parse_array(text)?
                .iter()
                .map(|item| inner.parse_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            int_type => {
                let text = text.trim();
                let value = if int_type.is_unsigned() {
                    text.parse::<u64>().map(Value::UInt).map_err(|e| parse_error(self, text, e))?
                } else {
                    text.parse::<i64>().map(Value::Int).map_err(|e| parse_error(self, text, e))?
                };
                int_type.coerce(value)
            }
        }
    }

    /// Decode one raw (still escaped) TSV field.
    pub fn decode(&self, raw: &str) -> Result<Value> {
        match self {
            FieldType::Array(_) => self.parse_value(raw),
            _ => self.parse_value(&unescape(raw)),
        }
    }

    /// Encode `value` as one TSV field.
    pub fn encode(&self, value: &Value) -> Result<String> {
        let value = self.coerce(value.clone())?;
        Ok(self.format(&value, false))
    }

    fn format(&self, value: &Value, quoted: bool) -> String {
        match (self, value) {
            (FieldType::Array(inner), Value::Array(items)) => {
                let parts: Vec<String> = items.iter().map(|item| inner.format(item, true)).collect();
                format!("[{}]", parts.join(","))
            }
            (_, Value::Int(i)) => i.to_string(),
            (_, Value::UInt(u)) => u.to_string(),
            (_, Value::Float(f)) => format_float(self, *f),
            _ => {
                let text = match value {
                    Value::String(s) | Value::Enum(s) => s.clone(),
                    Value::Date(d) => d.format(DATE_FORMAT).to_string(),
                    Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
                    other => other.to_string(),
                };
                if quoted {
                    quote(&text)
                } else {
                    escape(&text)
                }
            }
        }
    }

    fn int_range(&self) -> Option<(i128, i128)> {
        Some(match self {
            FieldType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            FieldType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            FieldType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            FieldType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            FieldType::UInt8 => (0, u8::MAX as i128),
            FieldType::UInt16 => (0, u16::MAX as i128),
            FieldType::UInt32 => (0, u32::MAX as i128),
            FieldType::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    fn is_unsigned(&self) -> bool {
        matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int8 => f.write_str("Int8"),
            FieldType::Int16 => f.write_str("Int16"),
            FieldType::Int32 => f.write_str("Int32"),
            FieldType::Int64 => f.write_str("Int64"),
            FieldType::UInt8 => f.write_str("UInt8"),
            FieldType::UInt16 => f.write_str("UInt16"),
            FieldType::UInt32 => f.write_str("UInt32"),
            FieldType::UInt64 => f.write_str("UInt64"),
            FieldType::Float32 => f.write_str("Float32"),
            FieldType::Float64 => f.write_str("Float64"),
            FieldType::String => f.write_str("String"),
            FieldType::FixedString(n) => write!(f, "FixedString({})", n),
            FieldType::Date => f.write_str("Date"),
            FieldType::DateTime => f.write_str("DateTime"),
            FieldType::Enum8(variants) => write!(f, "Enum8({})", enum_body(variants)),
            FieldType::Enum16(variants) => write!(f, "Enum16({})", enum_body(variants)),
            FieldType::Array(inner) => write!(f, "Array({})", inner),
        }
    }
}

impl FromStr for FieldType {
    type Err = ClickHouseError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let simple = match s {
            "Int8" => Some(FieldType::Int8),
            "Int16" => Some(FieldType::Int16),
            "Int32" => Some(FieldType::Int32),
            "Int64" => Some(FieldType::Int64),
            "UInt8" => Some(FieldType::UInt8),
            "UInt16" => Some(FieldType::UInt16),
            "UInt32" => Some(FieldType::UInt32),
            "UInt64" => Some(FieldType::UInt64),
            "Float32" => Some(FieldType::Float32),
            "Float64" => Some(FieldType::Float64),
            "String" => Some(FieldType::String),
            "Date" => Some(FieldType::Date),
            "DateTime" => Some(FieldType::DateTime),
            _ => None,
        };
        if let Some(simple) = simple {
            return Ok(simple);
        }

        let (name, args) = s
            .split_once('(')
            .and_then(|(name, rest)| rest.strip_suffix(')').map(|args| (name, args)))
            .ok_or_else(|| ClickHouseError::ParseError(format!("unsupported column type: {}", s)))?;

        match name {
            "Array" => Ok(FieldType::array(args.parse()?)),
            "FixedString" => args
                .trim()
                .parse::<usize>()
                .map(FieldType::FixedString)
                .map_err(|e| ClickHouseError::ParseError(format!("invalid column type {}: {}", s, e))),
            "Enum8" => parse_enum_body(args).map(FieldType::Enum8),
            "Enum16" => parse_enum_body(args).map(FieldType::Enum16),
            _ => Err(ClickHouseError::ParseError(format!("unsupported column type: {}", s))),
        }
    }
}

fn numbered<S: AsRef<str>>(names: &[S]) -> Vec<(String, i16)> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_ref().to_string(), i as i16 + 1))
        .collect()
}

fn enum_body(variants: &[(String, i16)]) -> String {
    variants
        .iter()
        .map(|(name, value)| format!("{} = {}", quote(name), value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse `'a' = 1, 'b' = 2`.
fn parse_enum_body(body: &str) -> Result<Vec<(String, i16)>> {
    let mut variants = Vec::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let after_quote = rest
            .strip_prefix('\'')
            .ok_or_else(|| ClickHouseError::ParseError(format!("invalid enum definition: {}", body)))?;

        let mut raw = String::new();
        let mut chars = after_quote.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    raw.push(c);
                    if let Some((_, escaped)) = chars.next() {
                        raw.push(escaped);
                    }
                }
                '\'' => {
                    end = Some(i + 1);
                    break;
                }
                _ => raw.push(c),
            }
        }
        let end = end.ok_or_else(|| {
            ClickHouseError::ParseError(format!("unterminated enum name in: {}", body))
        })?;

        let tail = after_quote[end..].trim_start();
        let tail = tail
            .strip_prefix('=')
            .ok_or_else(|| ClickHouseError::ParseError(format!("invalid enum definition: {}", body)))?;
        let (number, next) = match tail.split_once(',') {
            Some((number, next)) => (number, next),
            None => (tail, ""),
        };
        let value = number
            .trim()
            .parse::<i16>()
            .map_err(|e| ClickHouseError::ParseError(format!("invalid enum value in {}: {}", body, e)))?;

        variants.push((unescape(&raw), value));
        rest = next.trim();
    }
    Ok(variants)
}

fn format_float(field_type: &FieldType, f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if *field_type == FieldType::Float32 {
        (f as f32).to_string()
    } else {
        f.to_string()
    }
}

fn timestamp(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| ClickHouseError::ValidationError(format!("timestamp {} is out of range", ts)))
}

fn mismatch(field_type: &FieldType, value: &Value) -> ClickHouseError {
    ClickHouseError::ValidationError(format!("cannot store {} in a {} column", value, field_type))
}

fn parse_error(field_type: &FieldType, text: &str, err: impl fmt::Display) -> ClickHouseError {
    ClickHouseError::ParseError(format!("cannot parse {:?} as {}: {}", text, field_type, err))
}
