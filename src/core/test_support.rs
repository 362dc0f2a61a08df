//! Test doubles shared by the service tests

use async_trait::async_trait;
use dashkit_core::{FetchError, RemoteApi};
use dashkit_types::{PagedResult, ParameterMap, RequestParameters, UserParameters};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::local_query::{distinct_values, query_rows};

/// Serves a fixed row set for every route and counts calls
#[derive(Default)]
pub struct StubApi {
    rows: Mutex<Vec<Value>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StubApi {
    pub fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Default::default()
        })
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, params: &RequestParameters) -> Result<PagedResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection refused".into()));
        }
        Ok(query_rows(&self.rows.lock().unwrap(), params, None))
    }
}

#[async_trait]
impl RemoteApi for StubApi {
    async fn fetch_page(
        &self,
        _connection_id: u64,
        _route: &str,
        params: &RequestParameters,
    ) -> Result<PagedResult, FetchError> {
        self.answer(params)
    }

    async fn execute_procedure(
        &self,
        _connection_id: u64,
        _route: &str,
        _procedure_params: &ParameterMap,
        params: &RequestParameters,
    ) -> Result<PagedResult, FetchError> {
        self.answer(params)
    }

    async fn execute_query(
        &self,
        _query_id: u64,
        params: &RequestParameters,
        _user_params: &UserParameters,
    ) -> Result<PagedResult, FetchError> {
        self.answer(params)
    }

    async fn column_values(
        &self,
        _connection_id: u64,
        _route: &str,
        column: &str,
    ) -> Result<Vec<String>, FetchError> {
        Ok(distinct_values(&self.rows.lock().unwrap(), column))
    }
}
