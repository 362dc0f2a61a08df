//! Local table snapshots and readiness state

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::{ColumnSearch, OrderClause};

/// Persistent card identifier (stable across sessions, unlike widget instance ids)
pub type CardId = u64;

/// Filters the owning table widget had applied when the snapshot was taken
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFilters {
    #[serde(default)]
    pub global_search: Option<String>,
    #[serde(default)]
    pub column_searches: Vec<ColumnSearch>,
}

/// Materialized rows of a table widget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub data: Vec<Value>,
    #[serde(default)]
    pub filters: TableFilters,
    #[serde(default)]
    pub sorting: Vec<OrderClause>,
}

impl TableSnapshot {
    pub fn new(data: Vec<Value>) -> Self {
        Self {
            data,
            filters: TableFilters::default(),
            sorting: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Progress of a registered table towards being consumable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TablePhase {
    #[default]
    SchemaPending,
    SchemaReady,
    DataReady,
}

/// Readiness of one registered table.
///
/// `error` runs in parallel with `phase`: a failed push records the reason
/// without discarding the phase reached so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub phase: TablePhase,
    #[serde(default)]
    pub error: Option<String>,
}

impl Readiness {
    pub fn schema_ready(&self) -> bool {
        matches!(self.phase, TablePhase::SchemaReady | TablePhase::DataReady)
    }

    pub fn data_ready(&self) -> bool {
        self.phase == TablePhase::DataReady
    }

    /// `schemaReady && dataReady && !error`
    pub fn is_ready(&self) -> bool {
        self.schema_ready() && self.data_ready() && self.error.is_none()
    }
}
