//! Live card instances
//!
//! A `Widget` is one activated card: it owns the initial fetch, its refresh
//! schedule, the task that follows an upstream local table, and (for data
//! tables that expose themselves) its registration on the local table bus.
//! Tearing it down, explicitly or by dropping it, releases all of that.

use dashkit_core::{CardDescriptor, DashError, Result};
use dashkit_types::{
    CardConfig, CardId, DatasourceDescriptor, PagedResult, RequestParameters, TableSchema,
    TableSnapshot, UserParameters,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::cache::FetchPolicy;
use super::cache_key::SourceIdentity;
use super::datasource::DatasourceService;
use super::live::{LatestValue, LiveValue};
use super::refresh::RefreshScheduler;

/// What a widget currently has to show
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetData {
    Loading,
    Ready(Arc<PagedResult>),
    Failed(DashError),
}

impl WidgetData {
    pub fn page(&self) -> Option<&PagedResult> {
        match self {
            WidgetData::Ready(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WidgetData::Ready(_))
    }
}

/// Fetch state shared between the widget and its background tasks
struct Loader {
    widget_id: String,
    card_id: CardId,
    config: CardConfig,
    datasource: Option<DatasourceDescriptor>,
    request: Mutex<(RequestParameters, UserParameters)>,
    service: Arc<DatasourceService>,
    data: LatestValue<WidgetData>,
    /// Bus id this widget publishes under, once registered
    exposed_as: Mutex<Option<CardId>>,
}

impl Loader {
    fn exposes_table(&self) -> bool {
        matches!(&self.config, CardConfig::DataTable(t) if t.expose_as_local_table)
    }

    async fn load(&self, policy: FetchPolicy) -> Result<Arc<PagedResult>> {
        let Some(datasource) = &self.datasource else {
            return Err(DashError::config("card has no datasource"));
        };
        let (params, user_params) = self
            .request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let result = match policy {
            FetchPolicy::CacheFirst => self.service.fetch(datasource, &params, &user_params).await,
            FetchPolicy::Refresh => self.service.refresh(datasource, &params, &user_params).await,
        };

        match &result {
            Ok(page) => {
                self.data.publish(WidgetData::Ready(Arc::clone(page)));
                if self.exposes_table() {
                    self.publish_table(page);
                }
            }
            Err(e) => {
                warn!("Widget {} failed to load: {}", self.widget_id, e);
                self.data.publish(WidgetData::Failed(e.clone()));
                if let Some(id) = self.exposed_id() {
                    if let Err(err) = self.service.tables().push_failed(id, &e.to_string()) {
                        debug!("Could not record push failure for {}: {}", id, err);
                    }
                }
            }
        }
        result
    }

    fn exposed_id(&self) -> Option<CardId> {
        *self.exposed_as.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn title(&self) -> &str {
        match &self.config {
            CardConfig::DataTable(t) => &t.title,
            _ => "",
        }
    }

    /// Register on the bus, first time only
    fn register_table(&self, schema: TableSchema) -> CardId {
        let mut exposed = self.exposed_as.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = *exposed {
            return id;
        }
        let id = self
            .service
            .tables()
            .register(self.card_id, self.title(), Some(schema));
        *exposed = Some(id);
        id
    }

    fn publish_table(&self, page: &PagedResult) {
        let id = match self.exposed_id() {
            Some(id) => id,
            None => {
                let schema = match &self.config {
                    CardConfig::DataTable(t) => t.schema.clone(),
                    _ => None,
                };
                self.register_table(schema.unwrap_or_else(|| TableSchema::infer(&page.items)))
            }
        };
        let snapshot = TableSnapshot::new(page.items.clone());
        if let Err(e) = self.service.tables().push(id, snapshot) {
            warn!("Widget {} could not publish local table {}: {}", self.widget_id, id, e);
        }
        // Our own cached view of the bus table is stale now
        self.service
            .cache()
            .invalidate_source(&SourceIdentity::LocalTable { card_id: id });
    }
}

/// One activated card
pub struct Widget {
    id: Uuid,
    descriptor: Arc<CardDescriptor>,
    loader: Arc<Loader>,
    scheduler: Arc<RefreshScheduler>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl Widget {
    /// Start a widget. Must be called from within a tokio runtime.
    pub fn spawn(
        card_id: CardId,
        config: CardConfig,
        descriptor: Arc<CardDescriptor>,
        service: Arc<DatasourceService>,
        scheduler: Arc<RefreshScheduler>,
    ) -> Self {
        let id = Uuid::new_v4();
        let datasource = config.datasource().cloned();
        let params = match &config {
            CardConfig::DataTable(t) => RequestParameters::page(1, t.page_size),
            _ => RequestParameters::all(),
        };
        let initial = if datasource.is_some() {
            WidgetData::Loading
        } else {
            WidgetData::Ready(Arc::new(PagedResult::default()))
        };

        let loader = Arc::new(Loader {
            widget_id: id.to_string(),
            card_id,
            datasource,
            request: Mutex::new((params, UserParameters::new())),
            service,
            data: LatestValue::new(initial),
            exposed_as: Mutex::new(None),
            config,
        });

        let widget = Self {
            id,
            descriptor,
            loader,
            scheduler,
            tasks: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        };
        widget.start();
        widget
    }

    fn start(&self) {
        let loader = &self.loader;
        if loader.datasource.is_none() {
            debug!("Widget {} is static", self.id);
            return;
        }

        // A configured schema lets dependents wait for our rows instead of
        // failing with an unknown source
        if loader.exposes_table() {
            if let CardConfig::DataTable(t) = &loader.config {
                if let Some(schema) = &t.schema {
                    loader.register_table(schema.clone());
                }
            }
        }

        let initial = Arc::clone(loader);
        self.track(tokio::spawn(async move {
            let _ = initial.load(FetchPolicy::CacheFirst).await;
        }));

        if let Some(upstream) = loader.datasource.as_ref().and_then(|d| d.local_table_id()) {
            self.follow(upstream);
        }

        let interval = loader.config.refresh_interval_secs();
        if interval > 0 {
            let refresher = Arc::clone(loader);
            self.scheduler.schedule(
                &loader.widget_id,
                Duration::from_secs(interval),
                move || {
                    let loader = Arc::clone(&refresher);
                    async move { loader.load(FetchPolicy::Refresh).await.map(|_| ()) }
                },
            );
        }
        info!(
            "Activated {} widget {} for card {}",
            self.descriptor.type_key, self.id, loader.card_id
        );
    }

    /// Refetch whenever the upstream table publishes a new snapshot.
    ///
    /// Survives the upstream going away: once a table registers under the
    /// upstream id again, the widget resubscribes and refetches.
    fn follow(&self, upstream: CardId) {
        let bus = Arc::clone(self.loader.service.tables());
        let mut registrations = bus.registrations();
        registrations.skip_current();

        let mut snapshots = match bus.subscribe(upstream) {
            Ok(mut live) => {
                // The initial fetch already covers the current snapshot
                live.skip_current();
                Some(live)
            }
            Err(e) => {
                debug!("Widget {} waiting for upstream {}: {}", self.id, upstream, e);
                None
            }
        };

        let loader = Arc::clone(&self.loader);
        self.track(tokio::spawn(async move {
            loop {
                if let Some(mut live) = snapshots.take() {
                    while live.next().await.is_some() {
                        let _ = loader.load(FetchPolicy::Refresh).await;
                    }
                    debug!("Upstream table {} went away", upstream);
                }
                if registrations.next().await.is_none() {
                    break;
                }
                // A fresh subscription replays the current snapshot, which
                // triggers one refetch
                snapshots = bus.subscribe(upstream).ok();
                if snapshots.is_some() {
                    debug!("Widget {} resubscribed to upstream {}", loader.widget_id, upstream);
                }
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn card_id(&self) -> CardId {
        self.loader.card_id
    }

    pub fn config(&self) -> &CardConfig {
        &self.loader.config
    }

    /// Bus id of this widget's local table, once exposed
    pub fn local_table_id(&self) -> Option<CardId> {
        self.loader.exposed_id()
    }

    pub fn data(&self) -> LiveValue<WidgetData> {
        self.loader.data.subscribe()
    }

    pub fn current(&self) -> WidgetData {
        self.loader.data.get()
    }

    /// View model for the current data
    pub fn render(&self) -> Value {
        let data = self.loader.data.get();
        let page = match &self.loader.datasource {
            Some(_) => data.page(),
            None => None,
        };
        self.descriptor.renderer.render(&self.loader.config, page)
    }

    /// Manual refresh, bypassing the cache
    pub async fn retry(&self) -> Result<Arc<PagedResult>> {
        self.loader.load(FetchPolicy::Refresh).await
    }

    /// Change paging/search or user parameters and load with them
    pub async fn set_parameters(
        &self,
        params: RequestParameters,
        user_params: UserParameters,
    ) -> Result<Arc<PagedResult>> {
        *self
            .loader
            .request
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = (params, user_params);
        self.loader.load(FetchPolicy::CacheFirst).await
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Stop refreshing, abort background work and leave the bus
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.cancel(&self.loader.widget_id);
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        if let Some(id) = self.loader.exposed_id() {
            self.loader.service.tables().unregister(id);
        }
        debug!("Widget {} torn down", self.id);
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards;
    use crate::core::cache::QueryCache;
    use crate::core::local_table::LocalTableBus;
    use crate::core::test_support::StubApi;
    use dashkit_core::CardRegistry;
    use dashkit_types::{DataTableConfig, LabelConfig, TablePhase};
    use serde_json::json;

    struct Fixture {
        api: Arc<StubApi>,
        registry: CardRegistry,
        service: Arc<DatasourceService>,
        scheduler: Arc<RefreshScheduler>,
    }

    impl Fixture {
        fn new(rows: Vec<Value>) -> Self {
            let api = StubApi::new(rows);
            let registry = CardRegistry::new();
            cards::register_all(&registry).unwrap();
            let service = Arc::new(DatasourceService::new(
                api.clone(),
                Arc::new(QueryCache::new()),
                Arc::new(LocalTableBus::new()),
            ));
            Self {
                api,
                registry,
                service,
                scheduler: Arc::new(RefreshScheduler::new()),
            }
        }

        fn spawn(&self, card_id: CardId, config: CardConfig) -> Widget {
            let descriptor = self.registry.lookup(config.type_key()).unwrap();
            Widget::spawn(
                card_id,
                config,
                descriptor,
                Arc::clone(&self.service),
                Arc::clone(&self.scheduler),
            )
        }
    }

    async fn ready(widget: &Widget) -> Arc<PagedResult> {
        let data = widget
            .data()
            .wait_until(Duration::from_secs(5), |d| !matches!(d, WidgetData::Loading))
            .await
            .unwrap();
        match data {
            WidgetData::Ready(page) => page,
            other => panic!("widget not ready: {:?}", other),
        }
    }

    fn table(refresh_interval_secs: u64, expose: bool) -> CardConfig {
        CardConfig::DataTable(DataTableConfig {
            title: "Orders".into(),
            datasource: Some(DatasourceDescriptor::remote(1, "/orders")),
            refresh_interval_secs,
            expose_as_local_table: expose,
            ..Default::default()
        })
    }

    fn total_label(upstream: CardId) -> CardConfig {
        CardConfig::Label(LabelConfig {
            text: "Total {value}".into(),
            datasource: Some(DatasourceDescriptor::local_table(upstream)),
            value_column: Some("total".into()),
            ..Default::default()
        })
    }

    async fn wait_for_total(widget: &Widget, total: i64) {
        widget
            .data()
            .wait_until(Duration::from_secs(5), |d| {
                d.page().is_some_and(|p| p.items[0]["total"] == total)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initial_fetch_publishes_data() {
        let fx = Fixture::new(vec![json!({"id": 1}), json!({"id": 2})]);
        let widget = fx.spawn(1, table(0, false));
        let page = ready(&widget).await;
        assert_eq!(page.total, 2);
        assert_eq!(widget.render()["rows"].as_array().unwrap().len(), 2);
        assert_eq!(fx.api.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_then_retry() {
        let fx = Fixture::new(vec![json!({"id": 1})]);
        fx.api.set_failing(true);
        let widget = fx.spawn(1, table(0, false));
        let data = widget
            .data()
            .wait_until(Duration::from_secs(5), |d| !matches!(d, WidgetData::Loading))
            .await
            .unwrap();
        assert!(matches!(data, WidgetData::Failed(DashError::Fetch(_))));

        fx.api.set_failing(false);
        widget.retry().await.unwrap();
        assert!(widget.current().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_and_teardown() {
        let fx = Fixture::new(vec![json!({"id": 1})]);
        let widget = fx.spawn(1, table(10, false));
        ready(&widget).await;
        assert!(fx.scheduler.is_scheduled(&widget.id().to_string()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(fx.api.calls(), 2);

        widget.teardown();
        assert!(!fx.scheduler.is_scheduled(&widget.id().to_string()));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fx.api.calls(), 2);
    }

    #[tokio::test]
    async fn test_exposed_table_lifecycle() {
        let fx = Fixture::new(vec![json!({"name": "a", "qty": 1})]);
        let widget = fx.spawn(7, table(0, true));
        ready(&widget).await;

        let bus = fx.service.tables();
        assert_eq!(widget.local_table_id(), Some(7));
        let readiness = bus.readiness(7).unwrap().current();
        assert_eq!(readiness.phase, TablePhase::DataReady);
        assert!(bus.schema_of(7).unwrap().is_numeric("qty"));

        drop(widget);
        assert!(!bus.is_registered(7));
        assert!(bus.schema_of(7).is_some());
    }

    #[tokio::test]
    async fn test_follows_upstream_table() {
        let fx = Fixture::new(vec![json!({"total": 1})]);
        let upstream = fx.spawn(1, table(0, true));
        ready(&upstream).await;

        let label = fx.spawn(2, total_label(1));
        ready(&label).await;
        assert_eq!(label.render()["text"], "Total 1");

        fx.api.set_rows(vec![json!({"total": 5})]);
        upstream.retry().await.unwrap();
        wait_for_total(&label, 5).await;
        assert_eq!(label.render()["text"], "Total 5");
    }

    #[tokio::test]
    async fn test_dependent_follows_reregistered_upstream() {
        let fx = Fixture::new(vec![json!({"total": 1})]);
        let upstream = fx.spawn(1, table(0, true));
        ready(&upstream).await;
        let label = fx.spawn(2, total_label(1));
        ready(&label).await;
        assert_eq!(label.render()["text"], "Total 1");

        drop(upstream);
        fx.api.set_rows(vec![json!({"total": 5})]);
        // Same logical table under a new card id, on an uncached route
        let replacement = fx.spawn(
            9,
            CardConfig::DataTable(DataTableConfig {
                title: "Orders".into(),
                datasource: Some(DatasourceDescriptor::remote(1, "/orders/recent")),
                expose_as_local_table: true,
                ..Default::default()
            }),
        );
        ready(&replacement).await;
        assert_eq!(replacement.local_table_id(), Some(1));

        wait_for_total(&label, 5).await;
        assert_eq!(label.render()["text"], "Total 5");

        // Still following the new upstream
        fx.api.set_rows(vec![json!({"total": 8})]);
        replacement.retry().await.unwrap();
        wait_for_total(&label, 8).await;
    }

    #[tokio::test]
    async fn test_dependent_waits_for_late_upstream() {
        let fx = Fixture::new(vec![json!({"total": 3})]);
        let label = fx.spawn(2, total_label(4));
        let data = label
            .data()
            .wait_until(Duration::from_secs(5), |d| !matches!(d, WidgetData::Loading))
            .await
            .unwrap();
        assert!(matches!(data, WidgetData::Failed(DashError::SourceNotRegistered(4))));

        let upstream = fx.spawn(4, table(0, true));
        ready(&upstream).await;
        wait_for_total(&label, 3).await;
        assert_eq!(label.render()["text"], "Total 3");
    }

    #[tokio::test]
    async fn test_static_card_is_ready_immediately() {
        let fx = Fixture::new(Vec::new());
        let widget = fx.spawn(3, CardConfig::Label(LabelConfig::default()));
        assert!(widget.current().is_ready());
        assert_eq!(widget.render()["text"], "Label");
        assert_eq!(fx.api.calls(), 0);
    }
}
