//! Dashboard facade
//!
//! The surface the rendering layer talks to: card types, validation, data
//! fetching, local tables, auto-refresh and widget activation. One
//! `Dashboard` owns the cache, the local table bus and the refresh scheduler;
//! the card registry may be private or the process-wide one.

use dashkit_core::{
    CardDescriptor, CardInfo, CardRegistry, DashError, RegistryError, RemoteApi, Result,
    ValidationContext,
};
use dashkit_types::{
    CardConfig, CardId, DatasourceDescriptor, PagedResult, RequestParameters, TableSchema,
    TableSnapshot, UserParameters, ValidationResult,
};
use log::{debug, info};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cards;
use crate::config::{apply_card_defaults, AppConfig};
use crate::core::{
    validator, CacheStats, DatasourceService, ForeignKeyDisplayPolicy, LiveValue, LocalTableBus,
    QueryCache, RefreshScheduler, SourceIdentity, Widget,
};

pub struct Dashboard {
    config: AppConfig,
    registry: Arc<CardRegistry>,
    service: Arc<DatasourceService>,
    scheduler: Arc<RefreshScheduler>,
}

impl Dashboard {
    /// Dashboard with its own registry holding the built-in card types
    pub fn new(api: Arc<dyn RemoteApi>, config: AppConfig) -> std::result::Result<Self, RegistryError> {
        let registry = CardRegistry::new();
        let fk_policy = ForeignKeyDisplayPolicy::new(config.foreign_keys.display_hints.clone());
        cards::register_all_with(&registry, &fk_policy)?;
        Ok(Self::with_registry(api, config, Arc::new(registry)))
    }

    /// Dashboard over an existing registry (e.g. the global one after `init`)
    pub fn with_registry(api: Arc<dyn RemoteApi>, config: AppConfig, registry: Arc<CardRegistry>) -> Self {
        let cache = Arc::new(QueryCache::with_ttl(config.cache.ttl()));
        let tables = Arc::new(LocalTableBus::with_ready_timeout(
            config.local_tables.ready_timeout(),
        ));
        info!(
            "Dashboard ready: cache ttl {:?}, ready timeout {:?}, {} card types",
            cache.ttl(),
            tables.ready_timeout(),
            registry.len()
        );
        Self {
            config,
            registry,
            service: Arc::new(DatasourceService::new(api, cache, tables)),
            scheduler: Arc::new(RefreshScheduler::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CardRegistry> {
        &self.registry
    }

    pub fn service(&self) -> &Arc<DatasourceService> {
        &self.service
    }

    pub fn tables(&self) -> &Arc<LocalTableBus> {
        self.service.tables()
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    // Card types

    pub fn register_card_type(&self, descriptor: CardDescriptor) -> std::result::Result<(), RegistryError> {
        self.registry.register(descriptor)
    }

    pub fn lookup_card_type(&self, type_key: &str) -> std::result::Result<Arc<CardDescriptor>, RegistryError> {
        self.registry.lookup(type_key)
    }

    pub fn list_card_types(&self) -> Vec<CardInfo> {
        self.registry.list_info()
    }

    /// Default config for a new card, with configured overrides applied
    pub fn new_card_config(&self, type_key: &str) -> Result<CardConfig> {
        let base = self.registry.lookup(type_key)?.default_config();
        match self.config.card_defaults.get(type_key) {
            Some(overrides) => apply_card_defaults(base, overrides)
                .map_err(|e| DashError::config(format!("{:#}", e))),
            None => Ok(base),
        }
    }

    // Validation

    /// Validate a config. Without an explicit schema, a card bound to a
    /// local table is checked against that table's schema (registered or
    /// retained) when the bus knows it.
    pub fn validate_config(
        &self,
        type_key: &str,
        config: &CardConfig,
        schema: Option<&TableSchema>,
    ) -> ValidationResult {
        let resolved = self.bus_schema(config.datasource(), schema);
        let ctx = self.validation_context(schema.or(resolved.as_ref()));
        validator::validate_with(&self.registry, type_key, config, &ctx)
    }

    /// Validate raw JSON, decoding it first
    pub fn validate_value(&self, type_key: &str, value: &Value, schema: Option<&TableSchema>) -> ValidationResult {
        let datasource = value
            .get("datasource")
            .and_then(|d| serde_json::from_value::<DatasourceDescriptor>(d.clone()).ok());
        let resolved = self.bus_schema(datasource.as_ref(), schema);
        let ctx = self.validation_context(schema.or(resolved.as_ref()));
        validator::validate_value_with(&self.registry, type_key, value, &ctx)
    }

    /// Schema of the bound local table, when none was given
    fn bus_schema(
        &self,
        datasource: Option<&DatasourceDescriptor>,
        schema: Option<&TableSchema>,
    ) -> Option<TableSchema> {
        match schema {
            Some(_) => None,
            None => datasource
                .and_then(DatasourceDescriptor::local_table_id)
                .and_then(|id| self.tables().schema_of(id)),
        }
    }

    fn validation_context<'a>(&self, schema: Option<&'a TableSchema>) -> ValidationContext<'a> {
        ValidationContext {
            schema,
            min_refresh_interval_secs: self.config.refresh.min_interval_secs,
        }
    }

    // Data

    pub async fn fetch(
        &self,
        descriptor: &DatasourceDescriptor,
        params: &RequestParameters,
        user_params: &UserParameters,
    ) -> Result<Arc<PagedResult>> {
        self.service.fetch(descriptor, params, user_params).await
    }

    pub async fn refresh(
        &self,
        descriptor: &DatasourceDescriptor,
        params: &RequestParameters,
        user_params: &UserParameters,
    ) -> Result<Arc<PagedResult>> {
        self.service.refresh(descriptor, params, user_params).await
    }

    pub async fn column_values(&self, descriptor: &DatasourceDescriptor, column: &str) -> Result<Vec<String>> {
        self.service.column_values(descriptor, column).await
    }

    /// Drop cached results of one connection, e.g. after its settings changed
    pub fn invalidate_connection(&self, connection_id: u64) -> usize {
        self.service.cache().invalidate_connection(connection_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.service.cache().stats()
    }

    // Local tables

    pub fn register_local_table(&self, card_id: CardId, title: &str, schema: Option<TableSchema>) -> CardId {
        self.tables().register(card_id, title, schema)
    }

    /// Publish rows; returns whether subscribers were notified
    pub fn push_local_table(&self, card_id: CardId, snapshot: TableSnapshot) -> Result<bool> {
        let notified = self.tables().push(card_id, snapshot)?;
        if notified {
            self.service
                .cache()
                .invalidate_source(&SourceIdentity::LocalTable { card_id });
        }
        Ok(notified)
    }

    pub fn push_local_table_failed(&self, card_id: CardId, reason: &str) -> Result<()> {
        self.tables().push_failed(card_id, reason)
    }

    pub fn unregister_local_table(&self, card_id: CardId) -> bool {
        self.tables().unregister(card_id)
    }

    pub fn subscribe_local_table(&self, card_id: CardId) -> Result<LiveValue<Option<TableSnapshot>>> {
        self.tables().subscribe(card_id)
    }

    pub fn local_table_ready(&self, card_id: CardId) -> Result<LiveValue<bool>> {
        self.tables().wait_for_ready(card_id)
    }

    // Auto-refresh

    /// Run `callback` every `interval_secs` seconds for `widget_id`; 0 cancels
    pub fn schedule_auto_refresh<F, Fut>(&self, widget_id: &str, interval_secs: u64, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.scheduler
            .schedule(widget_id, Duration::from_secs(interval_secs), callback);
    }

    pub fn cancel_auto_refresh(&self, widget_id: &str) -> bool {
        self.scheduler.cancel(widget_id)
    }

    // Widgets

    /// Start a live widget for `config`
    pub fn activate(&self, card_id: CardId, config: CardConfig) -> Result<Widget> {
        let descriptor = self.registry.lookup(config.type_key())?;
        debug!("Activating {} card {}", descriptor.type_key, card_id);
        Ok(Widget::spawn(
            card_id,
            config,
            descriptor,
            Arc::clone(&self.service),
            Arc::clone(&self.scheduler),
        ))
    }

    /// Cancel every schedule and drop all cached results
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
        self.service.cache().clear();
        info!("Dashboard shut down");
    }
}
