//! dashkit-types: Shared data types for the dashkit dashboard runtime.
//!
//! This crate contains pure data types (card configs, datasource
//! descriptors, request parameters, table snapshots, validation results)
//! shared across all dashkit crates. Nothing here does I/O or needs an
//! async runtime, making it suitable as a foundation layer.

pub mod card;
pub mod color;
pub mod datasource;
pub mod field;
pub mod request;
pub mod table;
pub mod validation;

// Re-export commonly used types at the crate root for convenience
pub use card::{
    CardConfig, ChartConfig, ChartKind, ColumnConfig, DataTableConfig, HtmlConfig, LabelConfig,
    SeriesConfig,
};
pub use color::{is_hex_rgb, palette_color, Color};
pub use datasource::{
    DatasourceDescriptor, EntitySource, LocalTableSource, ParameterMap, ParameterValue,
    QuerySource, RemoteSource,
};
pub use field::{ColumnSchema, ColumnType, ForeignKeyRef, TableSchema};
pub use request::{
    ColumnSearch, OrderClause, PagedResult, RequestParameters, SortDirection, UserParameters,
};
pub use table::{CardId, Readiness, TableFilters, TablePhase, TableSnapshot};
pub use validation::{codes, FieldPath, ValidationError, ValidationResult};
