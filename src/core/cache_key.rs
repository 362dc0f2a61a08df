//! Cache key derivation
//!
//! A key is the identity of the source (enough of the descriptor to tell
//! sources apart) plus a digest of the canonical serialization of everything
//! else that shapes the result. Canonical means: object keys sorted at every
//! depth, column searches sorted, includes sorted and de-duplicated, blank
//! global search dropped. `order_by` keeps its order since it changes the
//! result.

use dashkit_core::{DashError, Result};
use dashkit_types::{DatasourceDescriptor, ParameterMap, RequestParameters, UserParameters};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The part of a descriptor that distinguishes one source from another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceIdentity {
    Remote { connection_id: u64, route: String },
    Entity { context: String, entity_name: String },
    Query { query_id: u64 },
    LocalTable { card_id: u64 },
}

impl SourceIdentity {
    /// Extract the identity, failing on descriptors missing required fields
    pub fn of(descriptor: &DatasourceDescriptor) -> Result<Self> {
        match descriptor {
            DatasourceDescriptor::Remote(remote) => {
                let connection_id = remote
                    .connection_id
                    .ok_or_else(|| DashError::config("remote datasource has no connection"))?;
                let route = remote
                    .route
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| DashError::config("remote datasource has no route"))?;
                Ok(SourceIdentity::Remote {
                    connection_id,
                    route: route.to_string(),
                })
            }
            DatasourceDescriptor::Entity(entity) => {
                let context = entity
                    .context
                    .clone()
                    .ok_or_else(|| DashError::config("entity datasource has no context"))?;
                let entity_name = entity
                    .entity_name
                    .clone()
                    .ok_or_else(|| DashError::config("entity datasource has no entity name"))?;
                Ok(SourceIdentity::Entity {
                    context,
                    entity_name,
                })
            }
            DatasourceDescriptor::Query(query) => {
                let query_id = query
                    .query_id
                    .ok_or_else(|| DashError::config("query datasource has no query id"))?;
                Ok(SourceIdentity::Query { query_id })
            }
            DatasourceDescriptor::LocalTable(local) => {
                let card_id = local
                    .source_card_id
                    .ok_or_else(|| DashError::config("local table datasource has no source card"))?;
                Ok(SourceIdentity::LocalTable { card_id })
            }
        }
    }

    pub fn connection_id(&self) -> Option<u64> {
        match self {
            SourceIdentity::Remote { connection_id, .. } => Some(*connection_id),
            _ => None,
        }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceIdentity::Remote {
                connection_id,
                route,
            } => write!(f, "remote:{}:{}", connection_id, route),
            SourceIdentity::Entity {
                context,
                entity_name,
            } => write!(f, "entity:{}:{}", context, entity_name),
            SourceIdentity::Query { query_id } => write!(f, "query:{}", query_id),
            SourceIdentity::LocalTable { card_id } => write!(f, "local:{}", card_id),
        }
    }
}

/// Key of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: SourceIdentity,
    pub digest: u64,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.source, self.digest)
    }
}

/// A derived key together with the canonical text it was hashed from.
/// The text is kept so cache hits can be checked for an exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: CacheKey,
    pub canonical: String,
}

#[derive(Serialize)]
struct KeyParts<'a> {
    procedure: Option<&'a ParameterMap>,
    columns: Option<Vec<String>>,
    params: Value,
    user: Value,
}

/// Derive the cache key for a fetch
pub fn derive_key(
    descriptor: &DatasourceDescriptor,
    params: &RequestParameters,
    user_params: &UserParameters,
) -> Result<KeyMaterial> {
    let source = SourceIdentity::of(descriptor)?;

    let columns = match descriptor {
        DatasourceDescriptor::LocalTable(local) => local.columns.clone().map(|mut c| {
            c.sort();
            c.dedup();
            c
        }),
        _ => None,
    };

    let parts = KeyParts {
        procedure: descriptor.procedure_parameters().filter(|p| !p.is_empty()),
        columns,
        params: canonical_params(params)?,
        user: canonicalize(to_value(user_params)?),
    };
    let canonical = serde_json::to_string(&canonicalize(to_value(&parts)?))
        .map_err(|e| DashError::config(format!("unserializable parameters: {}", e)))?;

    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);

    Ok(KeyMaterial {
        key: CacheKey {
            source,
            digest: hasher.finish(),
        },
        canonical,
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| DashError::config(format!("unserializable parameters: {}", e)))
}

fn canonical_params(params: &RequestParameters) -> Result<Value> {
    let mut params = params.clone();
    params
        .column_searches
        .sort_by(|a, b| (&a.column, &a.value).cmp(&(&b.column, &b.value)));
    if let Some(includes) = params.includes.as_mut() {
        includes.sort();
        includes.dedup();
    }
    if params
        .global_search
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        params.global_search = None;
    }
    Ok(canonicalize(to_value(&params)?))
}

/// Rebuild a JSON value with object keys sorted at every depth
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkit_types::OrderClause;
    use serde_json::json;

    fn user(pairs: &[(&str, Value)]) -> UserParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_key_is_stable_across_field_order() {
        let descriptor = DatasourceDescriptor::remote(1, "/orders");
        let a = RequestParameters::default()
            .with_column_search("status", "open")
            .with_column_search("city", "Oslo");
        let b = RequestParameters::default()
            .with_column_search("city", "Oslo")
            .with_column_search("status", "open");
        let u1 = user(&[("filter", json!({"b": 1, "a": [2, 3]}))]);
        let u2 = user(&[("filter", json!({"a": [2, 3], "b": 1}))]);

        assert_eq!(
            derive_key(&descriptor, &a, &u1).unwrap(),
            derive_key(&descriptor, &b, &u2).unwrap()
        );
    }

    #[test]
    fn test_order_by_sequence_matters() {
        let descriptor = DatasourceDescriptor::query(9);
        let a = RequestParameters::default()
            .with_order(OrderClause::asc("a"))
            .with_order(OrderClause::desc("b"));
        let b = RequestParameters::default()
            .with_order(OrderClause::desc("b"))
            .with_order(OrderClause::asc("a"));
        let empty = UserParameters::new();
        assert_ne!(
            derive_key(&descriptor, &a, &empty).unwrap().key,
            derive_key(&descriptor, &b, &empty).unwrap().key
        );
    }

    #[test]
    fn test_sources_are_distinguished() {
        let params = RequestParameters::default();
        let empty = UserParameters::new();
        let a = derive_key(&DatasourceDescriptor::remote(1, "/a"), &params, &empty).unwrap();
        let b = derive_key(&DatasourceDescriptor::remote(2, "/a"), &params, &empty).unwrap();
        assert_ne!(a.key.source, b.key.source);
        assert_eq!(a.key.source.to_string(), "remote:1:/a");
        assert_eq!(a.key.source.connection_id(), Some(1));
    }

    #[test]
    fn test_blank_search_equals_no_search() {
        let descriptor = DatasourceDescriptor::local_table(5);
        let empty = UserParameters::new();
        let blank = RequestParameters::default().with_search("   ");
        assert_eq!(
            derive_key(&descriptor, &blank, &empty).unwrap(),
            derive_key(&descriptor, &RequestParameters::default(), &empty).unwrap()
        );
    }

    #[test]
    fn test_incomplete_descriptor_is_config_error() {
        let descriptor: DatasourceDescriptor =
            serde_json::from_value(json!({"kind": "remote", "connectionId": 2})).unwrap();
        let err = derive_key(&descriptor, &RequestParameters::default(), &UserParameters::new())
            .unwrap_err();
        assert!(matches!(err, DashError::Config(_)));
    }
}
