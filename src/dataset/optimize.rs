//! Post-load heuristics that enrich a dataset's column metadata.
//!
//! Two independent passes run against the freshly loaded table:
//!
//! 1. **Dimensions**: every column not yet flagged gets a
//!    `COUNT(DISTINCT ...)`; a cardinality in `1..50` marks it as a dimension.
//!    Query failures are logged and the column is skipped.
//! 2. **Dates**: every column declared as a date that is still stored as text
//!    is converted in place. The first conversion fails the run; earlier
//!    conversions stay committed. The first column converted becomes the
//!    table's default date field unless one is already set.
//!
//! Nothing is cached between runs, so a failed run can simply be repeated.

use log::{debug, error, info, warn};

use crate::{
    datastore::{Datastore, sql},
    dataset::{ColumnNode, Dataset, MetadataStore, TableNode},
    error::{Error, Result},
    schema::{DataType, resolve_date_format},
};

/// Exclusive upper bound on distinct values for a dimension column.
pub const DIMENSION_CARDINALITY_LIMIT: u64 = 50;

pub fn is_dimension_cardinality(distinct: u64) -> bool {
    distinct > 0 && distinct < DIMENSION_CARDINALITY_LIMIT
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionScan {
    /// Columns newly flagged as dimensions.
    pub flagged: Vec<String>,
    /// Columns whose cardinality could not be determined.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateScan {
    pub converted: Vec<String>,
    /// Set when this run assigned the table's default date field.
    pub default_date_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub dataset_id: u64,
    pub dimensions: DimensionScan,
    pub dates: DateScan,
}

pub fn optimize_dataset_metadata<D, M>(
    datastore: &mut D,
    store: &mut M,
    dataset_id: u64,
    user_id: u64,
) -> Result<OptimizeReport>
where
    D: Datastore + ?Sized,
    M: MetadataStore + ?Sized,
{
    info!("Optimizing metadata of dataset {dataset_id}");
    let dataset = store.dataset(dataset_id, user_id).inspect_err(|err| {
        error!("Loading dataset {dataset_id} for user {user_id} failed: {err}");
    })?;
    let mut columns = store.columns(&dataset).inspect_err(|err| {
        error!("Loading columns of dataset {dataset_id} failed: {err}");
    })?;
    let mut table = store.table(&dataset).inspect_err(|err| {
        error!("Loading table of dataset {dataset_id} failed: {err}");
    })?;

    let dimensions = identify_dimensions(datastore, store, &dataset, &table, &mut columns)?;
    let dates = identify_dates(datastore, store, &dataset, &mut table, &columns)?;

    info!(
        "Optimized dataset {dataset_id}: {} new dimension(s), {} date conversion(s)",
        dimensions.flagged.len(),
        dates.converted.len()
    );
    Ok(OptimizeReport {
        dataset_id,
        dimensions,
        dates,
    })
}

/// Flags low-cardinality columns as dimensions and persists the changed
/// columns in one batch. Columns already flagged are never re-examined.
pub fn identify_dimensions<D, M>(
    datastore: &mut D,
    store: &mut M,
    dataset: &Dataset,
    table: &TableNode,
    columns: &mut [ColumnNode],
) -> Result<DimensionScan>
where
    D: Datastore + ?Sized,
    M: MetadataStore + ?Sized,
{
    let mut scan = DimensionScan::default();
    let mut changed = Vec::new();

    for column in columns.iter_mut().filter(|c| !c.dimension) {
        let statement = sql::count_distinct(&table.name, &column.name);
        let counted = datastore.query(&statement, &[]).and_then(|rows| {
            rows.first()
                .map(|row| row.parse::<u64>(0))
                .transpose()
                .map(|count| count.flatten().unwrap_or(0))
                .map_err(|err| Error::Query {
                    sql: statement.clone(),
                    source: err.into(),
                })
        });
        let distinct = match counted {
            Ok(distinct) => distinct,
            Err(err) => {
                warn!(
                    "Skipping column '{}' of table '{}' (dataset {}): {err}",
                    column.name, table.name, dataset.id
                );
                scan.skipped.push(column.name.clone());
                continue;
            }
        };

        if is_dimension_cardinality(distinct) {
            debug!(
                "Column '{}' has {distinct} distinct value(s); flagging as dimension",
                column.name
            );
            column.dimension = true;
            scan.flagged.push(column.name.clone());
            changed.push(column.clone());
        }
    }

    info!(
        "Found {} dimension column(s) in table '{}'",
        changed.len(),
        table.name
    );
    if !changed.is_empty() {
        store.update_columns(dataset, &changed).inspect_err(|err| {
            error!(
                "Saving dimension flags for table '{}' of dataset {} failed: {err}",
                table.name, dataset.id
            );
        })?;
    }
    Ok(scan)
}

/// Converts declared date columns still stored as text and assigns the
/// table's default date field if it has none.
pub fn identify_dates<D, M>(
    datastore: &mut D,
    store: &mut M,
    dataset: &Dataset,
    table: &mut TableNode,
    columns: &[ColumnNode],
) -> Result<DateScan>
where
    D: Datastore + ?Sized,
    M: MetadataStore + ?Sized,
{
    let mut scan = DateScan::default();
    let declared = columns
        .iter()
        .filter(|c| c.data_type == DataType::Date)
        .collect::<Vec<_>>();
    if declared.is_empty() {
        return Ok(scan);
    }

    let live = datastore.get_column_types(&table.name).inspect_err(|err| {
        error!(
            "Reading column types of table '{}' (dataset {}) failed: {err}",
            table.name, dataset.id
        );
    })?;

    let mut first_converted: Option<&ColumnNode> = None;
    for column in declared {
        let Some(current) = live.iter().find(|c| c.name == column.name) else {
            warn!(
                "Date column '{}' is missing from table '{}'; skipping",
                column.name, table.name
            );
            continue;
        };
        if current.data_type != DataType::String {
            debug!(
                "Column '{}' is already stored as {}; nothing to convert",
                column.name, current.data_type
            );
            continue;
        }

        let format = resolve_date_format(column.date_format.as_deref());
        datastore
            .convert_column_to_date(&table.name, &column.name, format.pattern())
            .inspect_err(|err| {
                error!(
                    "Converting column '{}' of table '{}' (dataset {}) to date failed: {err}",
                    column.name, table.name, dataset.id
                );
            })?;
        scan.converted.push(column.name.clone());
        first_converted.get_or_insert(column);
    }

    if table.default_date_field.is_none()
        && let Some(column) = first_converted
    {
        table.default_date_field = Some(column.uid);
        store.update_table(dataset, table).inspect_err(|err| {
            error!(
                "Saving default date field of table '{}' (dataset {}) failed: {err}",
                table.name, dataset.id
            );
        })?;
        info!(
            "Column '{}' is now the default date field of table '{}'",
            column.name, table.name
        );
        scan.default_date_field = Some(column.name.clone());
    }
    Ok(scan)
}
