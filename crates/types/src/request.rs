//! Fetch inputs and outputs shared by every datasource kind

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::datasource::ParameterMap;

/// Extra parameters supplied by the user at view time (filters, dates, ...)
pub type UserParameters = ParameterMap;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Per-column search term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSearch {
    pub column: String,
    pub value: String,
}

/// One ordering clause; clauses apply in sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderClause {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderClause {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Paging, search and ordering for a fetch. Also part of the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    /// 1-based page number
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    /// Rows per page; 0 means "everything"
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub global_search: Option<String>,
    #[serde(default)]
    pub column_searches: Vec<ColumnSearch>,
    #[serde(default)]
    pub order_by: Vec<OrderClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<String>>,
}

fn default_page_number() -> u32 {
    1
}

fn default_page_size() -> u32 {
    25
}

impl Default for RequestParameters {
    fn default() -> Self {
        Self {
            page_number: default_page_number(),
            page_size: default_page_size(),
            global_search: None,
            column_searches: Vec::new(),
            order_by: Vec::new(),
            includes: None,
        }
    }
}

impl RequestParameters {
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            ..Self::default()
        }
    }

    /// Parameters that return every row in one page
    pub fn all() -> Self {
        Self::page(1, 0)
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.global_search = Some(search.into());
        self
    }

    pub fn with_order(mut self, clause: OrderClause) -> Self {
        self.order_by.push(clause);
        self
    }

    pub fn with_column_search(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.column_searches.push(ColumnSearch {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

/// One page of rows returned by any datasource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    /// Row objects
    pub items: Vec<Value>,
    /// Total rows across all pages
    pub total: u64,
    /// Referenced rows keyed by foreign table name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_data: Option<BTreeMap<String, Vec<Value>>>,
}

impl PagedResult {
    pub fn new(items: Vec<Value>, total: u64) -> Self {
        Self {
            items,
            total,
            foreign_key_data: None,
        }
    }

    /// Result holding all `items`, with `total` equal to their count
    pub fn from_items(items: Vec<Value>) -> Self {
        let total = items.len() as u64;
        Self::new(items, total)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
