//! Runtime services: query cache, datasources, local tables, refresh, widgets

mod cache;
mod cache_key;
mod datasource;
mod foreign_key;
mod live;
pub mod local_query;
mod local_table;
mod refresh;
pub mod validator;
mod widget;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheStats, FetchPolicy, QueryCache};
pub use cache_key::{canonicalize, derive_key, CacheKey, KeyMaterial, SourceIdentity};
pub use datasource::{merge_parameters, DatasourceService};
pub use foreign_key::ForeignKeyDisplayPolicy;
pub use live::{LatestValue, LiveValue, WaitError};
pub use local_table::{LocalTableBus, TableInfo, SCHEMA_MISSING};
pub use refresh::RefreshScheduler;
pub use validator::{validate, validate_value, validate_value_with, validate_with};
pub use widget::{Widget, WidgetData};
