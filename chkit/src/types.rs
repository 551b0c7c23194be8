use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::{ClickHouseError, Result};
use crate::schema::field::FieldType;
use crate::schema::tsv::{parse_tsv, split_tsv};

/// One typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Enum(String),
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Enum(name) => write!(f, "{}", name),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from_int {
    ($variant:ident, $as:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $as)
                }
            }
        )+
    };
}

value_from_int!(Int, i64, i8, i16, i32, i64);
value_from_int!(UInt, u64, u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion out of a [`Value`], used by [`Row::get_as`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn unexpected(value: &Value, wanted: &str) -> ClickHouseError {
    ClickHouseError::ValidationError(format!("expected {}, got {}", wanted, value))
}

macro_rules! from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    let converted = match value {
                        Value::Int(i) => <$t>::try_from(*i).ok(),
                        Value::UInt(u) => <$t>::try_from(*u).ok(),
                        _ => None,
                    };
                    converted.ok_or_else(|| unexpected(value, stringify!($t)))
                }
            }
        )+
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::UInt(u) => Ok(*u as f64),
            other => Err(unexpected(other, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) | Value::Enum(s) => Ok(s.clone()),
            other => Err(unexpected(other, "string")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            other => Err(unexpected(other, "date")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            other => Err(unexpected(other, "datetime")),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Err(unexpected(other, "array")),
        }
    }
}

/// Name and type of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Runtime description of a row shape, built either from a model's columns
/// or from the header of a query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescriptor {
    columns: Vec<Column>,
}

impl RowDescriptor {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build from the two header lines of a `TabSeparatedWithNamesAndTypes`
    /// response.
    pub fn from_header(names_line: &str, types_line: &str) -> Result<Self> {
        let names = parse_tsv(names_line);
        let types = parse_tsv(types_line);
        if names.len() != types.len() {
            return Err(ClickHouseError::ParseError(format!(
                "header has {} column names but {} column types",
                names.len(),
                types.len()
            )));
        }
        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Ok(Column::new(name, ty.parse()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// The columns named in `names`, in that order.
    pub fn project(&self, names: &[String]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| {
                    ClickHouseError::ParseError(format!("unknown column {:?}", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A row of values paired with its descriptor. Returned by ad-hoc selects
/// and used as the intermediate form for models.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    descriptor: Arc<RowDescriptor>,
    values: Vec<Value>,
}

impl Row {
    /// Coerces every value to its column type.
    pub fn new(descriptor: Arc<RowDescriptor>, values: Vec<Value>) -> Result<Self> {
        if values.len() != descriptor.len() {
            return Err(ClickHouseError::ValidationError(format!(
                "row has {} values for {} columns",
                values.len(),
                descriptor.len()
            )));
        }
        let values = descriptor
            .columns()
            .iter()
            .zip(values)
            .map(|(column, value)| {
                column.field_type.coerce(value).map_err(|e| {
                    ClickHouseError::ValidationError(format!("column {}: {}", column.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { descriptor, values })
    }

    /// Decode one TSV data line laid out as `descriptor`.
    pub fn decode(descriptor: Arc<RowDescriptor>, line: &str) -> Result<Self> {
        let fields = split_tsv(line);
        if fields.len() != descriptor.len() {
            return Err(ClickHouseError::ParseError(format!(
                "line has {} fields, expected {}",
                fields.len(),
                descriptor.len()
            )));
        }
        let values = descriptor
            .columns()
            .iter()
            .zip(fields)
            .map(|(column, raw)| column.field_type.decode(raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { descriptor, values })
    }

    /// Encode as one TSV data line.
    pub fn encode(&self) -> Result<String> {
        let fields = self
            .descriptor
            .columns()
            .iter()
            .zip(&self.values)
            .map(|(column, value)| column.field_type.encode(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.join("\t"))
    }

    pub fn descriptor(&self) -> &Arc<RowDescriptor> {
        &self.descriptor
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.descriptor.position(name).map(|i| &self.values[i])
    }

    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get(name)
            .ok_or_else(|| ClickHouseError::ParseError(format!("row has no column {:?}", name)))?;
        T::from_value(value)
    }
}
