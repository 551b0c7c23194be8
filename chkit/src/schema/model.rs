use std::sync::Arc;

use super::engine::Engine;
use crate::errors::{ClickHouseError, Result};
use crate::types::{Column, Row, RowDescriptor, Value};

/// A typed table row.
///
/// Implementors describe the table once (`table_name`, `columns`, `engine`)
/// and convert between themselves and [`Row`]; DDL and TSV encoding come for
/// free.
///
/// ```rust,ignore
/// struct Visit { day: NaiveDate, user_id: u64, url: String }
///
/// impl Model for Visit {
///     fn table_name() -> String { "visits".into() }
///     fn columns() -> Vec<Column> {
///         vec![
///             Column::new("day", FieldType::Date),
///             Column::new("user_id", FieldType::UInt64),
///             Column::new("url", FieldType::String),
///         ]
///     }
///     fn engine() -> Engine { Engine::merge_tree("day", &["user_id", "day"]) }
///     fn to_values(&self) -> Vec<Value> {
///         vec![self.day.into(), self.user_id.into(), self.url.clone().into()]
///     }
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             day: row.get_as("day")?,
///             user_id: row.get_as("user_id")?,
///             url: row.get_as("url")?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized + Send + 'static {
    fn table_name() -> String;

    fn columns() -> Vec<Column>;

    fn engine() -> Engine;

    /// Values in `columns()` order.
    fn to_values(&self) -> Vec<Value>;

    /// Build from a row that carries a subset of the columns, in any order.
    fn from_row(row: &Row) -> Result<Self>;

    fn descriptor() -> RowDescriptor {
        RowDescriptor::new(Self::columns())
    }

    fn create_table_sql(db_name: &str) -> String {
        let columns: Vec<String> = Self::columns()
            .iter()
            .map(|c| format!("    `{}` {}", c.name, c.field_type))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS `{}`.`{}` (\n{}\n) ENGINE = {}",
            db_name,
            Self::table_name(),
            columns.join(",\n"),
            Self::engine().create_table_sql()
        )
    }

    fn drop_table_sql(db_name: &str) -> String {
        format!("DROP TABLE IF EXISTS `{}`.`{}`", db_name, Self::table_name())
    }

    fn to_row(&self) -> Result<Row> {
        Row::new(Arc::new(Self::descriptor()), self.to_values())
    }

    fn to_tsv(&self) -> Result<String> {
        self.to_row()?.encode()
    }

    /// Decode a data line whose fields are named by `field_names`.
    fn from_tsv(line: &str, field_names: &[String]) -> Result<Self> {
        let descriptor = Self::descriptor().project(field_names).map_err(|e| {
            ClickHouseError::ParseError(format!("{} for table {}", e, Self::table_name()))
        })?;
        let row = Row::decode(Arc::new(descriptor), line)?;
        Self::from_row(&row)
    }
}
