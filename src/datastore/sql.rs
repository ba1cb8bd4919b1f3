//! PostgreSQL statement builders.
//!
//! SQL cannot parameterize identifiers, so every table and column name is
//! wrapped in double quotes (embedded quotes doubled) before being formatted
//! into a statement. Literals go through `pg_escape::quote_literal`.

use std::sync::OnceLock;

use itertools::Itertools;
use pg_escape::quote_literal;
use regex::{Captures, Regex};

use crate::{
    error::{Error, Result},
    schema::{Column, DataType},
};

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Rejects table names that cannot double as a staged file name.
pub fn validate_table_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("table name cannot be empty")
    } else if name.len() > MAX_IDENTIFIER_BYTES {
        Some("table name exceeds 63 bytes")
    } else if name.contains(['/', '\\', '\0']) {
        Some("table name cannot contain path separators or NUL")
    } else if name == "." || name == ".." {
        Some("table name cannot be a relative path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidIdentifier {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Native storage type used at table creation. Dates are stored as text so
/// the copy never fails on format mismatches; conversion happens later.
pub fn storage_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String | DataType::Date => "text",
        DataType::Int => "bigint",
        DataType::Float => "double precision",
    }
}

pub fn column_list(columns: &[Column]) -> String {
    format!(
        "({})",
        columns.iter().map(|c| quote_identifier(&c.name)).join(", ")
    )
}

pub fn create_table(table: &str, columns: &[Column]) -> String {
    let definitions = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), storage_type(c.data_type)))
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", quote_identifier(table))
}

pub fn truncate_table(table: &str) -> String {
    format!("TRUNCATE TABLE {}", quote_identifier(table))
}

pub fn copy_from_file(table: &str, columns: &[Column], path: &str) -> String {
    format!(
        "COPY {} {} FROM {} DELIMITER ',' CSV HEADER",
        quote_identifier(table),
        column_list(columns),
        quote_literal(path)
    )
}

pub fn drop_table(table: &str, if_exists: bool) -> String {
    let guard = if if_exists { "IF EXISTS " } else { "" };
    format!("DROP TABLE {guard}{}", quote_identifier(table))
}

pub fn count_distinct(table: &str, column: &str) -> String {
    format!(
        "SELECT COUNT(DISTINCT {}) FROM {}",
        quote_identifier(column),
        quote_identifier(table)
    )
}

/// Catalog lookup; bind the table name as `$1`.
pub const COLUMN_TYPES: &str = "SELECT column_name, data_type FROM information_schema.columns \
     WHERE table_name = $1 ORDER BY ordinal_position";

pub fn sample_distinct_values(table: &str, column: &str, limit: usize) -> String {
    let column = quote_identifier(column);
    format!(
        "SELECT DISTINCT {column} FROM {} WHERE {column} IS NOT NULL LIMIT {limit}",
        quote_identifier(table)
    )
}

pub fn alter_column_to_date(table: &str, column: &str, postgres_format: &str) -> String {
    let column = quote_identifier(column);
    format!(
        "ALTER TABLE {} ALTER COLUMN {column} TYPE DATE USING to_date({column}, {})",
        quote_identifier(table),
        quote_literal(postgres_format)
    )
}

/// Replaces `$1..$n` with quoted literals so the statement can run over the
/// simple-query protocol, where every cell comes back as text. Placeholders
/// without a matching argument are left untouched for the server to reject.
pub fn bind_args(sql: &str, args: &[&str]) -> String {
    if args.is_empty() {
        return sql.to_string();
    }
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\$(\d+)").expect("placeholder regex is valid"));
    placeholder
        .replace_all(sql, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| args.get(idx))
                .map(|arg| quote_literal(arg).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
