#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_warehouse::datastore::{BackendKind, Datastore, Field, LoadOptions, Row};
use csv_warehouse::error::{Error, Result};
use csv_warehouse::schema::{Column, DataType};
use regex::Regex;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// In-memory [`Datastore`] that answers `COUNT(DISTINCT ...)` queries from a
/// table of canned cardinalities and tracks live column types so date
/// conversions behave like the real backend.
#[derive(Debug, Default)]
pub struct FakeDatastore {
    distinct: HashMap<String, u64>,
    failing_counts: HashSet<String>,
    live: Vec<Column>,
    failing_conversions: HashSet<String>,
    pub conversions: Vec<(String, String, String)>,
    pub queries: Vec<String>,
}

impl FakeDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distinct(mut self, column: &str, count: u64) -> Self {
        self.distinct.insert(column.to_string(), count);
        self
    }

    pub fn with_failing_count(mut self, column: &str) -> Self {
        self.failing_counts.insert(column.to_string());
        self
    }

    pub fn with_live_column(mut self, column: &str, data_type: DataType) -> Self {
        self.live.push(Column::new(column, data_type));
        self
    }

    pub fn with_failing_conversion(mut self, column: &str) -> Self {
        self.failing_conversions.insert(column.to_string());
        self
    }

    pub fn live_type(&self, column: &str) -> Option<DataType> {
        self.live
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type)
    }
}

fn count_distinct_column(sql: &str) -> Option<String> {
    let pattern = Regex::new(r#"COUNT\(DISTINCT "([^"]+)"\)"#).expect("count pattern");
    pattern
        .captures(sql)
        .map(|captures| captures[1].replace("\"\"", "\""))
}

impl Datastore for FakeDatastore {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn bulk_load(
        &mut self,
        _file: &Path,
        _table: &str,
        _columns: &[Column],
        _options: LoadOptions,
    ) -> Result<u64> {
        Ok(0)
    }

    fn delete_table(&mut self, _table: &str) -> Result<()> {
        self.live.clear();
        Ok(())
    }

    fn query(&mut self, sql: &str, _args: &[&str]) -> Result<Vec<Row>> {
        self.queries.push(sql.to_string());
        let column = count_distinct_column(sql).ok_or_else(|| Error::Query {
            sql: sql.to_string(),
            source: "unsupported statement".into(),
        })?;
        if self.failing_counts.contains(&column) {
            return Err(Error::Query {
                sql: sql.to_string(),
                source: format!("column \"{column}\" does not exist").into(),
            });
        }
        let count = self.distinct.get(&column).copied().unwrap_or(0);
        Ok(vec![Row::new(vec![Field {
            name: "count".to_string(),
            value: Some(count.to_string()),
        }])])
    }

    fn get_column_types(&mut self, _table: &str) -> Result<Vec<Column>> {
        Ok(self.live.clone())
    }

    fn convert_column_to_date(&mut self, table: &str, column: &str, date_format: &str) -> Result<()> {
        if self.failing_conversions.contains(column) {
            return Err(Error::Conversion {
                table: table.to_string(),
                column: column.to_string(),
                reason: "value does not match the date format".to_string(),
                source: None,
            });
        }
        let live = self
            .live
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| Error::Conversion {
                table: table.to_string(),
                column: column.to_string(),
                reason: "column not found in table".to_string(),
                source: None,
            })?;
        if live.data_type != DataType::String {
            return Err(Error::Conversion {
                table: table.to_string(),
                column: column.to_string(),
                reason: "column is not stored as text".to_string(),
                source: None,
            });
        }
        live.data_type = DataType::Date;
        self.conversions.push((
            table.to_string(),
            column.to_string(),
            date_format.to_string(),
        ));
        Ok(())
    }
}
