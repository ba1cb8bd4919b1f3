use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dataset::{ColumnNode, Dataset, MetadataStore, TableNode},
    error::{Error, Result},
    schema::Column,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetRecord {
    dataset: Dataset,
    table: TableNode,
    #[serde(default)]
    columns: Vec<ColumnNode>,
}

/// Keeps each dataset with its table and columns in `<root>/dataset-<id>.yaml`.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    root: PathBuf,
}

impl FileMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers a dataset for a freshly loaded table, assigning the next
    /// free id and new uids for the table and its columns.
    pub fn create_dataset(
        &mut self,
        name: &str,
        user_id: u64,
        service_id: u64,
        table: &str,
        columns: &[Column],
    ) -> Result<Dataset> {
        let dataset = Dataset {
            id: self.next_id()?,
            user_id,
            name: name.to_string(),
            service_id,
        };
        let record = DatasetRecord {
            dataset: dataset.clone(),
            table: TableNode {
                uid: Uuid::new_v4(),
                name: table.to_string(),
                default_date_field: None,
            },
            columns: columns.iter().map(ColumnNode::from_column).collect(),
        };
        self.write_record(&record)?;
        info!(
            "Registered dataset {} ('{name}') for table '{table}' with {} column(s)",
            dataset.id,
            columns.len()
        );
        Ok(dataset)
    }

    pub fn list(&self) -> Result<Vec<Dataset>> {
        let mut datasets = self
            .record_ids()?
            .into_iter()
            .map(|id| self.read_record(id).map(|record| record.dataset))
            .collect::<Result<Vec<_>>>()?;
        datasets.sort_by_key(|d| d.id);
        Ok(datasets)
    }

    fn record_path(&self, id: u64) -> PathBuf {
        self.root.join(format!("dataset-{id}.yaml"))
    }

    fn record_ids(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::metadata_with(
                    format!("listing metadata directory {:?}", self.root),
                    err,
                ));
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::metadata_with(format!("listing metadata directory {:?}", self.root), err)
            })?;
            let name = entry.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("dataset-"))
                .and_then(|n| n.strip_suffix(".yaml"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn next_id(&self) -> Result<u64> {
        Ok(self.record_ids()?.into_iter().max().unwrap_or(0) + 1)
    }

    fn read_record(&self, id: u64) -> Result<DatasetRecord> {
        let path = self.record_path(id);
        let contents = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::metadata(format!("dataset {id} not found"))
            } else {
                Error::metadata_with(format!("reading dataset record {path:?}"), err)
            }
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|err| Error::metadata_with(format!("parsing dataset record {path:?}"), err))
    }

    fn write_record(&self, record: &DatasetRecord) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| {
            Error::metadata_with(format!("creating metadata directory {:?}", self.root), err)
        })?;
        let path = self.record_path(record.dataset.id);
        let yaml = serde_yaml::to_string(record).map_err(|err| {
            Error::metadata_with(format!("serializing dataset {}", record.dataset.id), err)
        })?;
        fs::write(&path, yaml)
            .map_err(|err| Error::metadata_with(format!("writing dataset record {path:?}"), err))?;
        debug!("Wrote dataset record {path:?}");
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn dataset(&self, id: u64, user_id: u64) -> Result<Dataset> {
        let record = self.read_record(id)?;
        if record.dataset.user_id != user_id {
            return Err(Error::metadata(format!(
                "dataset {id} not found for user {user_id}"
            )));
        }
        Ok(record.dataset)
    }

    fn columns(&self, dataset: &Dataset) -> Result<Vec<ColumnNode>> {
        Ok(self.read_record(dataset.id)?.columns)
    }

    fn table(&self, dataset: &Dataset) -> Result<TableNode> {
        Ok(self.read_record(dataset.id)?.table)
    }

    fn update_columns(&mut self, dataset: &Dataset, columns: &[ColumnNode]) -> Result<()> {
        let mut record = self.read_record(dataset.id)?;
        for column in columns {
            let slot = record
                .columns
                .iter_mut()
                .find(|c| c.uid == column.uid)
                .ok_or_else(|| {
                    Error::metadata(format!(
                        "column {} ('{}') is not part of dataset {}",
                        column.uid, column.name, dataset.id
                    ))
                })?;
            *slot = column.clone();
        }
        self.write_record(&record)
    }

    fn update_table(&mut self, dataset: &Dataset, table: &TableNode) -> Result<()> {
        let mut record = self.read_record(dataset.id)?;
        if record.table.uid != table.uid {
            return Err(Error::metadata(format!(
                "table {} is not part of dataset {}",
                table.uid, dataset.id
            )));
        }
        record.table = table.clone();
        self.write_record(&record)
    }
}
