//! Card configuration - one typed config per card kind.
//!
//! `CardConfig` is the single source of truth for a card's settings. It is
//! replaced wholesale when the user edits a card, never patched in place.

use serde::{Deserialize, Serialize};

use crate::datasource::DatasourceDescriptor;
use crate::field::TableSchema;

fn default_true() -> bool {
    true
}

/// Visible column of a data table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl ColumnConfig {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header: None,
            visible: true,
        }
    }
}

/// Configuration for the data table card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableConfig {
    #[serde(default)]
    pub datasource: Option<DatasourceDescriptor>,
    #[serde(default)]
    pub title: String,
    /// Empty means "all columns of the result"
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Publish this table's rows on the local table bus
    #[serde(default)]
    pub expose_as_local_table: bool,
    /// Explicit schema; inferred from the first result when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
}

fn default_page_size() -> u32 {
    25
}

impl Default for DataTableConfig {
    fn default() -> Self {
        Self {
            datasource: None,
            title: String::new(),
            columns: Vec::new(),
            page_size: default_page_size(),
            refresh_interval_secs: 0,
            expose_as_local_table: false,
            schema: None,
        }
    }
}

/// Chart flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
}

/// One plotted series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesConfig {
    #[serde(default)]
    pub data_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `#RRGGBB`; palette color when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Configuration for the chart card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(default)]
    pub datasource: Option<DatasourceDescriptor>,
    #[serde(default)]
    pub chart_kind: ChartKind,
    #[serde(default)]
    pub label_column: String,
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

/// Configuration for the label card.
///
/// Without a datasource the label is static text; with one, `{value}` in
/// `text` is replaced by `valueColumn` of the first row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub datasource: Option<DatasourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_column: Option<String>,
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            text: "Label".to_string(),
            color: None,
            datasource: None,
            value_column: None,
            refresh_interval_secs: 0,
        }
    }
}

/// Configuration for the HTML block card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlConfig {
    #[serde(default)]
    pub content: String,
}

/// Type-safe enum for all card configurations.
/// Uses serde tag for JSON serialization: {"type": "chart", ...}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CardConfig {
    #[serde(rename = "dataTable")]
    DataTable(DataTableConfig),

    #[serde(rename = "chart")]
    Chart(ChartConfig),

    #[serde(rename = "label")]
    Label(LabelConfig),

    #[serde(rename = "html")]
    Html(HtmlConfig),
}

impl CardConfig {
    /// Get the card type key
    pub fn type_key(&self) -> &'static str {
        match self {
            CardConfig::DataTable(_) => "dataTable",
            CardConfig::Chart(_) => "chart",
            CardConfig::Label(_) => "label",
            CardConfig::Html(_) => "html",
        }
    }

    /// Whether this kind of card needs a datasource to be useful
    pub fn requires_datasource(&self) -> bool {
        matches!(self, CardConfig::DataTable(_) | CardConfig::Chart(_))
    }

    /// The bound datasource, if any
    pub fn datasource(&self) -> Option<&DatasourceDescriptor> {
        match self {
            CardConfig::DataTable(cfg) => cfg.datasource.as_ref(),
            CardConfig::Chart(cfg) => cfg.datasource.as_ref(),
            CardConfig::Label(cfg) => cfg.datasource.as_ref(),
            CardConfig::Html(_) => None,
        }
    }

    /// Auto-refresh interval in seconds; 0 disables refresh
    pub fn refresh_interval_secs(&self) -> u64 {
        match self {
            CardConfig::DataTable(cfg) => cfg.refresh_interval_secs,
            CardConfig::Chart(cfg) => cfg.refresh_interval_secs,
            CardConfig::Label(cfg) => cfg.refresh_interval_secs,
            CardConfig::Html(_) => 0,
        }
    }
}
