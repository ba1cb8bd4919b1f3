//! The capability contract every warehouse backend satisfies.
//!
//! Callers obtain a `Box<dyn Datastore>` from a registered
//! [`Service`](crate::services::Service), bulk load a CSV extract into a table
//! and hand the same handle to the dataset optimizer. Only the PostgreSQL
//! backend ships; [`BackendKind`] is the variant tag the registry resolves.

pub mod postgres;
pub mod sql;
pub mod staging;

use std::{fmt, path::Path, str::FromStr};

use crate::{error::Result, schema::Column};

pub use self::postgres::PostgresDatastore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Postgres,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(crate::error::Error::UnsupportedBackend(other.to_string())),
        }
    }
}

/// How a bulk load treats the destination table.
///
/// | `create_table` | `append` | effect                                 |
/// |----------------|----------|----------------------------------------|
/// | true           | any      | create the table, then copy            |
/// | false          | false    | truncate existing rows, then copy      |
/// | false          | true     | copy alongside existing rows           |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub append: bool,
    pub create_table: bool,
}

impl LoadOptions {
    pub fn create() -> Self {
        Self {
            append: false,
            create_table: true,
        }
    }

    pub fn replace() -> Self {
        Self::default()
    }

    pub fn append() -> Self {
        Self {
            append: true,
            create_table: false,
        }
    }

    pub fn truncates(&self) -> bool {
        !self.append && !self.create_table
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Option<String>,
}

/// One result row with every cell materialized as text; `None` is SQL `NULL`.
/// Numeric and date parsing is left to the caller through [`Row::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value.as_deref())
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.value.as_deref())
    }

    /// Parses the cell at `index`; `Ok(None)` for a missing or `NULL` cell.
    pub fn parse<T: FromStr>(&self, index: usize) -> Result<Option<T>, T::Err> {
        self.value(index).map(|v| v.trim().parse()).transpose()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.value.clone().unwrap_or_default())
            .collect()
    }
}

pub trait Datastore {
    fn kind(&self) -> BackendKind;

    /// Loads the CSV at `file` (comma separated, header row) into `table` and
    /// returns the number of rows copied. Table creation or truncation and
    /// the copy commit together or not at all.
    fn bulk_load(
        &mut self,
        file: &Path,
        table: &str,
        columns: &[Column],
        options: LoadOptions,
    ) -> Result<u64>;

    fn delete_table(&mut self, table: &str) -> Result<()>;

    /// Runs `sql` with `$1..$n` bound to `args`.
    fn query(&mut self, sql: &str, args: &[&str]) -> Result<Vec<Row>>;

    /// Live columns of `table` in ordinal order; empty when the table does
    /// not exist.
    fn get_column_types(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Alters a text column to native date storage in place. Destructive: the
    /// column must not already be a date.
    fn convert_column_to_date(&mut self, table: &str, column: &str, date_format: &str)
    -> Result<()>;
}
