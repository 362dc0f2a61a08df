//! Datasource service - resolves descriptors into paged results
//!
//! Remote and query sources go to the `RemoteApi` collaborator through the
//! query cache. Local tables are read from the bus and queried in memory;
//! they share the cache's single-flight but are never served from TTL.

use dashkit_core::{DashError, RemoteApi, Result};
use dashkit_types::{
    DatasourceDescriptor, PagedResult, ParameterMap, RequestParameters, UserParameters,
};
use log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;

use super::cache::{FetchPolicy, QueryCache};
use super::cache_key::{derive_key, SourceIdentity};
use super::local_query::{distinct_values, query_rows};
use super::local_table::LocalTableBus;

/// Single entry point for fetching card data
pub struct DatasourceService {
    api: Arc<dyn RemoteApi>,
    cache: Arc<QueryCache>,
    tables: Arc<LocalTableBus>,
    ready_timeout: Duration,
}

impl DatasourceService {
    pub fn new(api: Arc<dyn RemoteApi>, cache: Arc<QueryCache>, tables: Arc<LocalTableBus>) -> Self {
        let ready_timeout = tables.ready_timeout();
        Self {
            api,
            cache,
            tables,
            ready_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn tables(&self) -> &Arc<LocalTableBus> {
        &self.tables
    }

    /// Cache-first fetch
    pub async fn fetch(
        &self,
        descriptor: &DatasourceDescriptor,
        params: &RequestParameters,
        user_params: &UserParameters,
    ) -> Result<Arc<PagedResult>> {
        self.run(descriptor, params, user_params, FetchPolicy::CacheFirst)
            .await
    }

    /// Fetch skipping any cached entry; still joins an in-flight fetch
    pub async fn refresh(
        &self,
        descriptor: &DatasourceDescriptor,
        params: &RequestParameters,
        user_params: &UserParameters,
    ) -> Result<Arc<PagedResult>> {
        self.run(descriptor, params, user_params, FetchPolicy::Refresh)
            .await
    }

    async fn run(
        &self,
        descriptor: &DatasourceDescriptor,
        params: &RequestParameters,
        user_params: &UserParameters,
        policy: FetchPolicy,
    ) -> Result<Arc<PagedResult>> {
        if let DatasourceDescriptor::Entity(entity) = descriptor {
            return Err(DashError::Unsupported(format!(
                "entity datasource {}/{} has no fetch path",
                entity.context.as_deref().unwrap_or("?"),
                entity.entity_name.as_deref().unwrap_or("?")
            )));
        }

        let material = derive_key(descriptor, params, user_params)?;
        let policy = match descriptor {
            DatasourceDescriptor::LocalTable(_) => FetchPolicy::Refresh,
            _ => policy,
        };
        trace!("Fetching {} ({:?})", material.key, policy);

        let key = material.key.clone();
        let request = FetchRequest {
            api: Arc::clone(&self.api),
            tables: Arc::clone(&self.tables),
            ready_timeout: self.ready_timeout,
            descriptor: descriptor.clone(),
            params: params.clone(),
            user_params: user_params.clone(),
        };
        let result = self
            .cache
            .get_or_fetch(material, policy, move || request.execute())
            .await;

        if let Err(e) = &result {
            debug!("Fetch for {} failed: {}", key, e);
        }
        result
    }

    /// Distinct values of one column, for filter pickers
    pub async fn column_values(
        &self,
        descriptor: &DatasourceDescriptor,
        column: &str,
    ) -> Result<Vec<String>> {
        match SourceIdentity::of(descriptor)? {
            SourceIdentity::Remote {
                connection_id,
                route,
            } => Ok(self
                .api
                .column_values(connection_id, &route, column)
                .await?),
            SourceIdentity::LocalTable { card_id } => {
                let snapshot = self
                    .tables
                    .subscribe(card_id)?
                    .current()
                    .unwrap_or_default();
                Ok(distinct_values(&snapshot.data, column))
            }
            other => Err(DashError::Unsupported(format!(
                "column values for {} sources",
                other
            ))),
        }
    }
}

/// Everything a fetch needs, owned so it can run in the cache's leader task
struct FetchRequest {
    api: Arc<dyn RemoteApi>,
    tables: Arc<LocalTableBus>,
    ready_timeout: Duration,
    descriptor: DatasourceDescriptor,
    params: RequestParameters,
    user_params: UserParameters,
}

impl FetchRequest {
    async fn execute(self) -> Result<PagedResult> {
        match &self.descriptor {
            DatasourceDescriptor::Remote(remote) => {
                let connection_id = remote
                    .connection_id
                    .ok_or_else(|| DashError::config("remote datasource has no connection"))?;
                let route = remote
                    .route
                    .as_deref()
                    .ok_or_else(|| DashError::config("remote datasource has no route"))?;

                if remote.procedure_parameters.is_empty() {
                    Ok(self.api.fetch_page(connection_id, route, &self.params).await?)
                } else {
                    let merged = merge_parameters(&remote.procedure_parameters, &self.user_params);
                    Ok(self
                        .api
                        .execute_procedure(connection_id, route, &merged, &self.params)
                        .await?)
                }
            }
            DatasourceDescriptor::Query(query) => {
                let query_id = query
                    .query_id
                    .ok_or_else(|| DashError::config("query datasource has no query id"))?;
                let merged = merge_parameters(&query.procedure_parameters, &self.user_params);
                Ok(self
                    .api
                    .execute_query(query_id, &self.params, &merged)
                    .await?)
            }
            DatasourceDescriptor::LocalTable(local) => {
                let card_id = local
                    .source_card_id
                    .ok_or_else(|| DashError::config("local table datasource has no source card"))?;
                let snapshot = self.tables.await_ready(card_id, self.ready_timeout).await?;
                Ok(query_rows(
                    &snapshot.data,
                    &self.params,
                    local.columns.as_deref(),
                ))
            }
            DatasourceDescriptor::Entity(_) => {
                Err(DashError::Unsupported("entity datasource".to_string()))
            }
        }
    }
}

/// Procedure parameters overlaid with user parameters; user values win
pub fn merge_parameters(procedure: &ParameterMap, user: &UserParameters) -> ParameterMap {
    let mut merged = procedure.clone();
    merged.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
