mod common;

use common::{FakeDatastore, TestWorkspace};
use csv_warehouse::dataset::{
    ColumnNode, Dataset, FileMetadataStore, MetadataStore, TableNode, identify_dates,
    identify_dimensions, optimize_dataset_metadata,
};
use csv_warehouse::error::{Error, Result};
use csv_warehouse::schema::{Column, DataType};
use proptest::prelude::*;

const USER: u64 = 7;

/// Delegates to a file store while counting writes.
struct CountingStore {
    inner: FileMetadataStore,
    column_writes: usize,
    table_writes: usize,
}

impl MetadataStore for CountingStore {
    fn dataset(&self, id: u64, user_id: u64) -> Result<Dataset> {
        self.inner.dataset(id, user_id)
    }

    fn columns(&self, dataset: &Dataset) -> Result<Vec<ColumnNode>> {
        self.inner.columns(dataset)
    }

    fn table(&self, dataset: &Dataset) -> Result<TableNode> {
        self.inner.table(dataset)
    }

    fn update_columns(&mut self, dataset: &Dataset, columns: &[ColumnNode]) -> Result<()> {
        self.column_writes += 1;
        self.inner.update_columns(dataset, columns)
    }

    fn update_table(&mut self, dataset: &Dataset, table: &TableNode) -> Result<()> {
        self.table_writes += 1;
        self.inner.update_table(dataset, table)
    }
}

fn store_with(workspace: &TestWorkspace, columns: &[Column]) -> (CountingStore, Dataset) {
    let mut inner = FileMetadataStore::new(workspace.path().join("metadata"));
    let dataset = inner
        .create_dataset("sales", USER, 1, "sales", columns)
        .expect("create dataset");
    (
        CountingStore {
            inner,
            column_writes: 0,
            table_writes: 0,
        },
        dataset,
    )
}

fn flagged(store: &CountingStore, dataset: &Dataset) -> Vec<String> {
    store
        .columns(dataset)
        .expect("columns")
        .into_iter()
        .filter(|c| c.dimension)
        .map(|c| c.name)
        .collect()
}

#[test]
fn dimension_flag_follows_cardinality_boundaries() {
    let workspace = TestWorkspace::new();
    let columns = ["empty", "single", "forty_nine", "fifty", "fifty_one"]
        .map(|name| Column::new(name, DataType::String));
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new()
        .with_distinct("empty", 0)
        .with_distinct("single", 1)
        .with_distinct("forty_nine", 49)
        .with_distinct("fifty", 50)
        .with_distinct("fifty_one", 51);

    let report = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("optimize");

    assert_eq!(report.dimensions.flagged, vec!["single", "forty_nine"]);
    assert!(report.dimensions.skipped.is_empty());
    assert_eq!(flagged(&store, &dataset), vec!["single", "forty_nine"]);
    assert_eq!(store.column_writes, 1);
}

#[test]
fn failing_count_skips_only_that_column() {
    let workspace = TestWorkspace::new();
    let columns = ["region", "ghost", "channel"].map(|name| Column::new(name, DataType::String));
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new()
        .with_distinct("region", 4)
        .with_failing_count("ghost")
        .with_distinct("channel", 3);

    let report = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("optimize");

    assert_eq!(report.dimensions.flagged, vec!["region", "channel"]);
    assert_eq!(report.dimensions.skipped, vec!["ghost"]);
    assert_eq!(flagged(&store, &dataset), vec!["region", "channel"]);
}

#[test]
fn nothing_is_written_when_no_column_qualifies() {
    let workspace = TestWorkspace::new();
    let columns = [Column::new("order_id", DataType::Int)];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new().with_distinct("order_id", 10_000);

    let report = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("optimize");

    assert!(report.dimensions.flagged.is_empty());
    assert_eq!(store.column_writes, 0);
    assert_eq!(store.table_writes, 0);
}

#[test]
fn flagged_columns_are_not_counted_again() {
    let workspace = TestWorkspace::new();
    let columns = [Column::new("region", DataType::String)];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new().with_distinct("region", 5);

    optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER).expect("first run");
    let issued = datastore.queries.len();
    let second = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("second run");

    assert_eq!(datastore.queries.len(), issued);
    assert!(second.dimensions.flagged.is_empty());
    assert_eq!(store.column_writes, 1);
}

#[test]
fn first_converted_date_becomes_default_field() {
    let workspace = TestWorkspace::new();
    let columns = [
        Column::new("region", DataType::String),
        Column::new("ordered_at", DataType::Date),
        Column::new("shipped_at", DataType::Date).with_date_format("dd/mm/yyyy"),
    ];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new()
        .with_distinct("region", 400)
        .with_distinct("ordered_at", 300)
        .with_distinct("shipped_at", 300)
        .with_live_column("region", DataType::String)
        .with_live_column("ordered_at", DataType::String)
        .with_live_column("shipped_at", DataType::String);

    let report = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("optimize");

    assert_eq!(report.dates.converted, vec!["ordered_at", "shipped_at"]);
    assert_eq!(report.dates.default_date_field.as_deref(), Some("ordered_at"));
    assert_eq!(
        datastore.conversions,
        vec![
            (
                "sales".to_string(),
                "ordered_at".to_string(),
                "yyyy-mm-dd".to_string()
            ),
            (
                "sales".to_string(),
                "shipped_at".to_string(),
                "dd/mm/yyyy".to_string()
            ),
        ]
    );

    let table = store.table(&dataset).expect("table");
    let ordered_at = store
        .columns(&dataset)
        .expect("columns")
        .into_iter()
        .find(|c| c.name == "ordered_at")
        .expect("ordered_at column");
    assert_eq!(table.default_date_field, Some(ordered_at.uid));
}

#[test]
fn rerun_keeps_default_date_field_and_skips_converted_columns() {
    let workspace = TestWorkspace::new();
    let columns = [Column::new("ordered_at", DataType::Date)];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new()
        .with_distinct("ordered_at", 900)
        .with_live_column("ordered_at", DataType::String);

    optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER).expect("first run");
    let before = store.table(&dataset).expect("table");
    let second = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect("second run");

    assert!(second.dates.converted.is_empty());
    assert_eq!(second.dates.default_date_field, None);
    assert_eq!(datastore.conversions.len(), 1);
    assert_eq!(store.table(&dataset).expect("table"), before);
    assert_eq!(store.table_writes, 1);
}

#[test]
fn existing_default_date_field_is_not_replaced() {
    let workspace = TestWorkspace::new();
    let columns = [
        Column::new("ordered_at", DataType::Date),
        Column::new("shipped_at", DataType::Date),
    ];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut table = store.table(&dataset).expect("table");
    let shipped = store
        .columns(&dataset)
        .expect("columns")
        .into_iter()
        .find(|c| c.name == "shipped_at")
        .expect("shipped_at column");
    table.default_date_field = Some(shipped.uid);
    store.update_table(&dataset, &table).expect("preset default");

    let cols = store.columns(&dataset).expect("columns");
    let mut datastore = FakeDatastore::new()
        .with_live_column("ordered_at", DataType::String)
        .with_live_column("shipped_at", DataType::Date);
    let scan = identify_dates(&mut datastore, &mut store, &dataset, &mut table, &cols)
        .expect("identify dates");

    assert_eq!(scan.converted, vec!["ordered_at"]);
    assert_eq!(scan.default_date_field, None);
    assert_eq!(
        store.table(&dataset).expect("table").default_date_field,
        Some(shipped.uid)
    );
}

#[test]
fn conversion_failure_aborts_but_keeps_earlier_conversions() {
    let workspace = TestWorkspace::new();
    let columns = [
        Column::new("ordered_at", DataType::Date),
        Column::new("shipped_at", DataType::Date),
        Column::new("returned_at", DataType::Date),
    ];
    let (mut store, dataset) = store_with(&workspace, &columns);
    let mut datastore = FakeDatastore::new()
        .with_distinct("ordered_at", 100)
        .with_distinct("shipped_at", 100)
        .with_distinct("returned_at", 100)
        .with_live_column("ordered_at", DataType::String)
        .with_live_column("shipped_at", DataType::String)
        .with_live_column("returned_at", DataType::String)
        .with_failing_conversion("shipped_at");

    let err = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER)
        .expect_err("conversion failure surfaces");

    assert!(matches!(err, Error::Conversion { ref column, .. } if column == "shipped_at"));
    assert_eq!(datastore.live_type("ordered_at"), Some(DataType::Date));
    assert_eq!(datastore.live_type("shipped_at"), Some(DataType::String));
    assert_eq!(datastore.live_type("returned_at"), Some(DataType::String));
    assert_eq!(store.table(&dataset).expect("table").default_date_field, None);
}

#[test]
fn unknown_dataset_or_wrong_user_is_a_metadata_error() {
    let workspace = TestWorkspace::new();
    let (mut store, dataset) = store_with(&workspace, &[Column::new("a", DataType::String)]);
    let mut datastore = FakeDatastore::new();

    let missing = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id + 10, USER);
    assert!(matches!(missing, Err(Error::Metadata { .. })));

    let foreign = optimize_dataset_metadata(&mut datastore, &mut store, dataset.id, USER + 1);
    assert!(matches!(foreign, Err(Error::Metadata { .. })));
    assert!(datastore.queries.is_empty());
}

proptest! {
    #[test]
    fn only_cardinalities_below_fifty_are_flagged(count in 0u64..500) {
        let workspace = TestWorkspace::new();
        let (mut store, dataset) = store_with(&workspace, &[Column::new("c", DataType::String)]);
        let table = store.table(&dataset).expect("table");
        let mut columns = store.columns(&dataset).expect("columns");
        let mut datastore = FakeDatastore::new().with_distinct("c", count);

        let scan = identify_dimensions(&mut datastore, &mut store, &dataset, &table, &mut columns)
            .expect("identify dimensions");

        prop_assert_eq!(scan.flagged.len() == 1, count > 0 && count < 50);
        prop_assert_eq!(columns[0].dimension, count > 0 && count < 50);
    }
}
