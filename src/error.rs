//! Error taxonomy shared by the datastore driver, the service registry and
//! the dataset metadata optimizer.
//!
//! Every variant carries the table/column/dataset context needed to report a
//! precise cause; command handlers wrap these in `anyhow` with extra context.

use std::io;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live backend session, or the session could not be opened.
    #[error("datastore connection unavailable: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Copying the source file to the staging location, or removing it
    /// afterwards, failed.
    #[error("staging transfer failed for '{path}'")]
    Transfer {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Table creation, truncation, drop or catalog introspection failed.
    #[error("schema operation on table '{table}' failed")]
    Schema {
        table: String,
        #[source]
        source: BoxError,
    },

    /// The bulk copy statement (or its commit) failed.
    #[error("bulk copy into table '{table}' failed")]
    Load {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("converting column '{column}' of table '{table}' to date failed: {reason}")]
    Conversion {
        table: String,
        column: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Reading or writing dataset, column, table or service records failed.
    #[error("metadata store error: {context}")]
    Metadata {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("query failed: {sql}")]
    Query {
        sql: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid datastore service: {0}")]
    InvalidService(String),

    #[error("unsupported datastore backend '{0}'")]
    UnsupportedBackend(String),

    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },
}

impl Error {
    pub(crate) fn metadata(context: impl Into<String>) -> Self {
        Error::Metadata {
            context: context.into(),
            source: None,
        }
    }

    pub(crate) fn metadata_with<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Metadata {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn conversion(
        table: &str,
        column: &str,
        reason: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Error::Conversion {
            table: table.to_string(),
            column: column.to_string(),
            reason: reason.into(),
            source,
        }
    }
}
