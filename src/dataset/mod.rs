//! Dataset metadata: the records the optimizer reads and rewrites.
//!
//! A [`Dataset`] owns exactly one [`TableNode`] and its [`ColumnNode`]s. The
//! records live behind a [`MetadataStore`]; [`store::FileMetadataStore`] is
//! the bundled implementation.

pub mod optimize;
pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    schema::{Column, DataType},
};

pub use self::optimize::{
    DIMENSION_CARDINALITY_LIMIT, OptimizeReport, identify_dates, identify_dimensions,
    is_dimension_cardinality, optimize_dataset_metadata,
};
pub use self::store::FileMetadataStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    /// Registry id of the service holding the table.
    pub service_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    pub uid: Uuid,
    pub name: String,
    /// Column used for time-series slicing when the user picks none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_date_field: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNode {
    pub uid: Uuid,
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(default)]
    pub dimension: bool,
}

impl ColumnNode {
    pub fn from_column(column: &Column) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: column.name.clone(),
            data_type: column.data_type,
            date_format: column.date_format.clone(),
            dimension: false,
        }
    }

    pub fn column(&self) -> Column {
        Column {
            name: self.name.clone(),
            data_type: self.data_type,
            date_format: self.date_format.clone(),
        }
    }
}

pub trait MetadataStore {
    /// The dataset `id` owned by `user_id`.
    fn dataset(&self, id: u64, user_id: u64) -> Result<Dataset>;

    fn columns(&self, dataset: &Dataset) -> Result<Vec<ColumnNode>>;

    fn table(&self, dataset: &Dataset) -> Result<TableNode>;

    /// Replaces the stored columns whose `uid` matches one in `columns`.
    fn update_columns(&mut self, dataset: &Dataset, columns: &[ColumnNode]) -> Result<()>;

    fn update_table(&mut self, dataset: &Dataset, table: &TableNode) -> Result<()>;
}
