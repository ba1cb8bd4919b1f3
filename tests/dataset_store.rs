mod common;

use common::TestWorkspace;
use csv_warehouse::dataset::{FileMetadataStore, MetadataStore};
use csv_warehouse::error::Error;
use csv_warehouse::schema::{Column, DataType};

fn columns() -> Vec<Column> {
    vec![
        Column::new("region", DataType::String),
        Column::new("qty", DataType::Int),
        Column::new("ordered_at", DataType::Date).with_date_format("dd/mm/yyyy"),
    ]
}

#[test]
fn created_dataset_exposes_table_and_columns() {
    let workspace = TestWorkspace::new();
    let mut store = FileMetadataStore::new(workspace.path().join("metadata"));
    let dataset = store
        .create_dataset("Orders", 3, 1, "orders", &columns())
        .expect("create dataset");

    assert_eq!(dataset.id, 1);
    assert_eq!(store.dataset(1, 3).expect("dataset"), dataset);

    let table = store.table(&dataset).expect("table");
    assert_eq!(table.name, "orders");
    assert_eq!(table.default_date_field, None);

    let stored = store.columns(&dataset).expect("columns");
    assert_eq!(
        stored.iter().map(|c| c.column()).collect::<Vec<_>>(),
        columns()
    );
    assert!(stored.iter().all(|c| !c.dimension));
    assert!(workspace.path().join("metadata").join("dataset-1.yaml").exists());
}

#[test]
fn dataset_of_another_user_is_not_visible() {
    let workspace = TestWorkspace::new();
    let mut store = FileMetadataStore::new(workspace.path());
    store
        .create_dataset("Orders", 3, 1, "orders", &columns())
        .expect("create dataset");

    assert!(matches!(store.dataset(1, 4), Err(Error::Metadata { .. })));
    assert!(matches!(store.dataset(2, 3), Err(Error::Metadata { .. })));
}

#[test]
fn column_updates_replace_matching_uids_only() {
    let workspace = TestWorkspace::new();
    let mut store = FileMetadataStore::new(workspace.path());
    let dataset = store
        .create_dataset("Orders", 3, 1, "orders", &columns())
        .expect("create dataset");

    let mut region = store.columns(&dataset).expect("columns").remove(0);
    region.dimension = true;
    store
        .update_columns(&dataset, std::slice::from_ref(&region))
        .expect("update columns");

    let reread = FileMetadataStore::new(workspace.path());
    let stored = reread.columns(&dataset).expect("columns");
    assert_eq!(stored[0], region);
    assert!(!stored[1].dimension);
    assert_eq!(stored.len(), 3);
}

#[test]
fn table_update_persists_default_date_field() {
    let workspace = TestWorkspace::new();
    let mut store = FileMetadataStore::new(workspace.path());
    let dataset = store
        .create_dataset("Orders", 3, 1, "orders", &columns())
        .expect("create dataset");
    let ordered_at = store.columns(&dataset).expect("columns").remove(2);

    let mut table = store.table(&dataset).expect("table");
    table.default_date_field = Some(ordered_at.uid);
    store.update_table(&dataset, &table).expect("update table");

    assert_eq!(
        store.table(&dataset).expect("table").default_date_field,
        Some(ordered_at.uid)
    );

    let mut foreign = table.clone();
    foreign.uid = uuid::Uuid::new_v4();
    assert!(matches!(
        store.update_table(&dataset, &foreign),
        Err(Error::Metadata { .. })
    ));
}
