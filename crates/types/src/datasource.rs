//! Datasource descriptors - where a card's data comes from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::table::CardId;

/// Value of a procedure or user parameter. Any JSON value is accepted.
pub type ParameterValue = serde_json::Value;

/// Named parameters, kept ordered so equal maps serialize identically.
pub type ParameterMap = BTreeMap<String, ParameterValue>;

/// Remote API route on a configured connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSource {
    #[serde(default)]
    pub connection_id: Option<u64>,
    #[serde(default)]
    pub route: Option<String>,
    /// Non-empty when the route is a parametrized procedure
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub procedure_parameters: ParameterMap,
}

/// ORM entity reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySource {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
}

/// Saved server-side query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySource {
    #[serde(default)]
    pub query_id: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub procedure_parameters: ParameterMap,
}

/// Another card's live table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTableSource {
    #[serde(default)]
    pub source_card_id: Option<CardId>,
    /// Projection applied to the upstream rows; `None` keeps every column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// Type-safe enum for all datasource kinds.
/// Uses serde tag for JSON serialization: {"kind": "remote", ...}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DatasourceDescriptor {
    #[serde(rename = "remote")]
    Remote(RemoteSource),

    #[serde(rename = "entity")]
    Entity(EntitySource),

    #[serde(rename = "query")]
    Query(QuerySource),

    #[serde(rename = "localTable")]
    LocalTable(LocalTableSource),
}

impl DatasourceDescriptor {
    /// Get the datasource kind string
    pub fn kind(&self) -> &'static str {
        match self {
            DatasourceDescriptor::Remote(_) => "remote",
            DatasourceDescriptor::Entity(_) => "entity",
            DatasourceDescriptor::Query(_) => "query",
            DatasourceDescriptor::LocalTable(_) => "localTable",
        }
    }

    pub fn remote(connection_id: u64, route: impl Into<String>) -> Self {
        DatasourceDescriptor::Remote(RemoteSource {
            connection_id: Some(connection_id),
            route: Some(route.into()),
            procedure_parameters: ParameterMap::new(),
        })
    }

    pub fn query(query_id: u64) -> Self {
        DatasourceDescriptor::Query(QuerySource {
            query_id: Some(query_id),
            procedure_parameters: ParameterMap::new(),
        })
    }

    pub fn local_table(source_card_id: CardId) -> Self {
        DatasourceDescriptor::LocalTable(LocalTableSource {
            source_card_id: Some(source_card_id),
            columns: None,
        })
    }

    /// Procedure parameters carried by the descriptor, if its kind has any
    pub fn procedure_parameters(&self) -> Option<&ParameterMap> {
        match self {
            DatasourceDescriptor::Remote(r) => Some(&r.procedure_parameters),
            DatasourceDescriptor::Query(q) => Some(&q.procedure_parameters),
            _ => None,
        }
    }

    /// Upstream card id when this is a local table source
    pub fn local_table_id(&self) -> Option<CardId> {
        match self {
            DatasourceDescriptor::LocalTable(l) => l.source_card_id,
            _ => None,
        }
    }
}
