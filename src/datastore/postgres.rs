//! PostgreSQL implementation of [`Datastore`].
//!
//! Bulk loads stage the CSV next to the server (see [`StagingTarget`]) and
//! run a server-side `COPY ... FROM '<path>'` inside one transaction together
//! with the `CREATE TABLE`/`TRUNCATE`. Reads go through the simple-query
//! protocol so every cell is returned as text.

use std::path::Path;

use log::{debug, error, info, warn};
use postgres::{Client, NoTls, SimpleQueryMessage};

use crate::{
    datastore::{
        BackendKind, Datastore, Field, LoadOptions, Row,
        sql::{self, validate_table_name},
        staging::StagingTarget,
    },
    error::{Error, Result},
    schema::{Column, DataType, DateFormat, resolve_date_format},
    services::Service,
};

/// Upper bound on distinct values checked against a date format before the
/// destructive `ALTER` is issued.
const DATE_SAMPLE_LIMIT: usize = 100;

pub struct PostgresDatastore {
    client: Option<Client>,
    endpoint: String,
    staging: StagingTarget,
    drop_missing_ok: bool,
}

impl PostgresDatastore {
    pub fn connect(service: &Service) -> Result<Self> {
        let endpoint = format!("{}:{}/{}", service.host, service.port, service.database);
        let client = postgres::Config::new()
            .host(&service.host)
            .port(service.port)
            .dbname(&service.database)
            .user(&service.username)
            .password(&service.password)
            .connect(NoTls)
            .map_err(|source| {
                error!("Connecting to postgres at {endpoint} failed: {source}");
                Error::Connection {
                    context: format!("connecting to {endpoint}"),
                    source: Some(source.into()),
                }
            })?;
        info!("Connected to postgres datastore at {endpoint}");
        Ok(Self {
            client: Some(client),
            endpoint,
            staging: StagingTarget::parse(&service.staging_directory),
            drop_missing_ok: service.drop_missing_ok,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn staging(&self) -> &StagingTarget {
        &self.staging
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().map_err(|source| Error::Connection {
                context: format!("closing session to {}", self.endpoint),
                source: Some(source.into()),
            })?;
            info!("Disconnected from postgres datastore at {}", self.endpoint);
        }
        Ok(())
    }

    fn client(&mut self) -> Result<&mut Client> {
        match self.client.as_mut() {
            Some(client) if !client.is_closed() => Ok(client),
            Some(_) => Err(Error::Connection {
                context: format!("session to {} was closed by the server", self.endpoint),
                source: None,
            }),
            None => Err(Error::Connection {
                context: format!("no live session to {}", self.endpoint),
                source: None,
            }),
        }
    }

    fn copy_staged(
        &mut self,
        table: &str,
        columns: &[Column],
        options: LoadOptions,
        staged: &str,
    ) -> Result<u64> {
        let schema_error = |source: postgres::Error| Error::Schema {
            table: table.to_string(),
            source: source.into(),
        };
        let load_error = |source: postgres::Error| Error::Load {
            table: table.to_string(),
            source: source.into(),
        };

        let endpoint = self.endpoint.clone();
        let mut tx = self
            .client()?
            .transaction()
            .map_err(|source| Error::Connection {
                context: format!("opening a transaction on {endpoint}"),
                source: Some(source.into()),
            })?;

        if options.create_table {
            debug!("Creating table '{table}' with {} column(s)", columns.len());
            tx.batch_execute(&sql::create_table(table, columns))
                .map_err(schema_error)?;
        } else if options.truncates() {
            debug!("Truncating table '{table}' before load");
            tx.batch_execute(&sql::truncate_table(table))
                .map_err(schema_error)?;
        }

        let messages = tx
            .simple_query(&sql::copy_from_file(table, columns, staged))
            .map_err(load_error)?;
        let rows = messages
            .iter()
            .find_map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                _ => None,
            })
            .unwrap_or(0);
        tx.commit().map_err(load_error)?;
        Ok(rows)
    }

    fn verify_date_values(&mut self, table: &str, column: &str, format: &DateFormat) -> Result<()> {
        let statement = sql::sample_distinct_values(table, column, DATE_SAMPLE_LIMIT);
        let rows = self
            .query(&statement, &[])
            .map_err(|err| sampling_error(table, column, err))?;
        for row in &rows {
            let Some(value) = row.value(0).map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            if format.parse_value(value).is_none() {
                return Err(Error::conversion(
                    table,
                    column,
                    format!("value '{value}' does not match date format '{format}'"),
                    None,
                ));
            }
        }
        debug!(
            "{} sampled value(s) of '{table}.{column}' match '{format}'",
            rows.len()
        );
        Ok(())
    }
}

impl Datastore for PostgresDatastore {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn bulk_load(
        &mut self,
        file: &Path,
        table: &str,
        columns: &[Column],
        options: LoadOptions,
    ) -> Result<u64> {
        validate_table_name(table)?;
        if columns.is_empty() {
            return Err(Error::Schema {
                table: table.to_string(),
                source: "at least one column is required for a bulk load".into(),
            });
        }
        self.client()?;

        let staged = self.staging.stage(file, table).inspect_err(|err| {
            error!("Staging {file:?} for table '{table}' failed: {err}");
        })?;
        let staged_path = staged.path().to_string();
        info!("Copying {staged_path} into table '{table}' ({options:?})");
        let loaded = self.copy_staged(table, columns, options, &staged_path);
        let cleanup = self.staging.release(&staged, table);

        match (loaded, cleanup) {
            (Ok(rows), Ok(())) => {
                info!("Loaded {rows} row(s) from {file:?} into table '{table}'");
                Ok(rows)
            }
            (Ok(_), Err(err)) => {
                error!("Loaded table '{table}' but removing staged file {staged_path} failed: {err}");
                Err(err)
            }
            (Err(err), cleanup) => {
                error!("Bulk load of {file:?} into table '{table}' failed: {err}");
                if let Err(cleanup_err) = cleanup {
                    warn!("Staged file {staged_path} was left behind: {cleanup_err}");
                }
                Err(err)
            }
        }
    }

    fn delete_table(&mut self, table: &str) -> Result<()> {
        let statement = sql::drop_table(table, self.drop_missing_ok);
        self.client()?.batch_execute(&statement).map_err(|source| {
            error!("Dropping table '{table}' failed: {source}");
            Error::Schema {
                table: table.to_string(),
                source: source.into(),
            }
        })?;
        info!("Dropped table '{table}'");
        Ok(())
    }

    fn query(&mut self, sql: &str, args: &[&str]) -> Result<Vec<Row>> {
        let statement = sql::bind_args(sql, args);
        let messages = self.client()?.simple_query(&statement).map_err(|source| {
            error!("Query failed: {source} ({statement})");
            Error::Query {
                sql: statement.clone(),
                source: source.into(),
            }
        })?;
        Ok(materialize_rows(messages))
    }

    fn get_column_types(&mut self, table: &str) -> Result<Vec<Column>> {
        let rows = self
            .query(sql::COLUMN_TYPES, &[table])
            .map_err(|err| match err {
                Error::Query { source, .. } => Error::Schema {
                    table: table.to_string(),
                    source,
                },
                other => other,
            })?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("column_name")?;
                let native = row.get("data_type").unwrap_or_default();
                Some(Column::new(name, native_data_type(native)))
            })
            .collect())
    }

    fn convert_column_to_date(
        &mut self,
        table: &str,
        column: &str,
        date_format: &str,
    ) -> Result<()> {
        let format = resolve_date_format(Some(date_format));
        let live = self.get_column_types(table)?;
        let current = live
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| Error::conversion(table, column, "column not found in table", None))?;
        match current.data_type {
            DataType::String => {}
            DataType::Date => {
                return Err(Error::conversion(
                    table,
                    column,
                    "column is already stored as date",
                    None,
                ));
            }
            other => {
                return Err(Error::conversion(
                    table,
                    column,
                    format!("column is stored as {other}, expected text"),
                    None,
                ));
            }
        }

        if format.is_complete() {
            self.verify_date_values(table, column, &format)?;
        }

        let statement = sql::alter_column_to_date(table, column, &format.postgres_pattern());
        self.client()?.batch_execute(&statement).map_err(|source| {
            error!("Converting '{table}.{column}' with format '{format}' failed: {source}");
            Error::conversion(table, column, "ALTER TABLE was rejected", Some(source.into()))
        })?;
        info!("Converted '{table}.{column}' to date using format '{format}'");
        Ok(())
    }
}

/// Maps an `information_schema.columns.data_type` value onto [`DataType`].
/// Anything unrecognised is treated as a string.
pub fn native_data_type(native: &str) -> DataType {
    let native = native.trim().to_ascii_lowercase();
    match native.as_str() {
        "smallint" | "integer" | "bigint" => DataType::Int,
        "real" | "double precision" | "numeric" | "decimal" => DataType::Float,
        "date" => DataType::Date,
        _ if native.starts_with("timestamp") => DataType::Date,
        _ => DataType::String,
    }
}

/// A lost session stays a connection error; anything else means the values
/// could not be checked and the conversion is refused.
fn sampling_error(table: &str, column: &str, err: Error) -> Error {
    match err {
        lost @ Error::Connection { .. } => lost,
        other => Error::conversion(
            table,
            column,
            "sampling existing values failed",
            Some(other.into()),
        ),
    }
}

fn materialize_rows(messages: Vec<SimpleQueryMessage>) -> Vec<Row> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(Row::new(
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| Field {
                        name: column.name().to_string(),
                        value: row.get(idx).map(str::to_string),
                    })
                    .collect(),
            )),
            _ => None,
        })
        .collect()
}
