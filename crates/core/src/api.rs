//! Remote API collaborator.
//!
//! The records/procedure/query endpoints live behind a network boundary;
//! retries and auth refresh are the implementor's business. This crate only
//! sees success or a typed `FetchError`.

use async_trait::async_trait;
use dashkit_types::{PagedResult, ParameterMap, RequestParameters, UserParameters};

use crate::error::FetchError;

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Paginated records of a route
    async fn fetch_page(
        &self,
        connection_id: u64,
        route: &str,
        params: &RequestParameters,
    ) -> Result<PagedResult, FetchError>;

    /// Execute a parametrized procedure behind a route
    async fn execute_procedure(
        &self,
        connection_id: u64,
        route: &str,
        procedure_parameters: &ParameterMap,
        params: &RequestParameters,
    ) -> Result<PagedResult, FetchError>;

    /// Run a saved server-side query
    async fn execute_query(
        &self,
        query_id: u64,
        params: &RequestParameters,
        user_params: &UserParameters,
    ) -> Result<PagedResult, FetchError>;

    /// Distinct values of one column, for filter pickers
    async fn column_values(
        &self,
        connection_id: u64,
        route: &str,
        column: &str,
    ) -> Result<Vec<String>, FetchError>;
}
