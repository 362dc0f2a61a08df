//! Local table bus - table widgets publishing their rows to other widgets
//!
//! Each registration moves through `SchemaPending -> SchemaReady -> DataReady`
//! with an error slot alongside. Subscribers always get the latest snapshot
//! first, then later pushes in order. Pushing a snapshot equal to the current
//! one notifies nobody.
//!
//! Unregistering keeps the table's title and schema in a retained set, so
//! column pickers bound to it keep working and a table that comes back under
//! the same title gets its old id back.

use chrono::{DateTime, Utc};
use dashkit_core::{DashError, Result, LOCAL_TABLE_READY_TIMEOUT};
use dashkit_types::{CardId, Readiness, TablePhase, TableSchema, TableSnapshot};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::live::{LatestValue, LiveValue, WaitError};

/// Error recorded when a table registers without a schema
pub const SCHEMA_MISSING: &str = "schema missing";

struct RegisteredTable {
    title: String,
    schema: Option<TableSchema>,
    snapshot: LatestValue<Option<TableSnapshot>>,
    readiness: LatestValue<Readiness>,
    last_push_at: Option<DateTime<Utc>>,
}

impl RegisteredTable {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            schema: None,
            snapshot: LatestValue::new(None),
            readiness: LatestValue::new(Readiness::default()),
            last_push_at: None,
        }
    }

    fn has_data(&self) -> bool {
        self.snapshot.get().is_some()
    }

    fn apply_schema(&mut self, schema: TableSchema) {
        self.schema = Some(schema);
        let phase = if self.has_data() {
            TablePhase::DataReady
        } else {
            TablePhase::SchemaReady
        };
        self.readiness.modify(|r| {
            let before = r.clone();
            r.phase = phase;
            if r.error.as_deref() == Some(SCHEMA_MISSING) {
                r.error = None;
            }
            *r != before
        });
    }
}

struct RetainedTable {
    title: String,
    schema: Option<TableSchema>,
    /// Unregister order; the newest wins when titles collide
    seq: u64,
}

#[derive(Default)]
struct BusState {
    tables: HashMap<CardId, RegisteredTable>,
    retained: HashMap<CardId, RetainedTable>,
    next_seq: u64,
}

/// Diagnostic view of one registration
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub card_id: CardId,
    pub title: String,
    pub readiness: Readiness,
    pub rows: usize,
    pub last_push_at: Option<DateTime<Utc>>,
}

/// Registry of live tables keyed by card id
pub struct LocalTableBus {
    state: RwLock<BusState>,
    /// Bumped on every register and unregister
    generation: LatestValue<u64>,
    ready_timeout: Duration,
}

impl LocalTableBus {
    pub fn new() -> Self {
        Self::with_ready_timeout(LOCAL_TABLE_READY_TIMEOUT)
    }

    pub fn with_ready_timeout(ready_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            generation: LatestValue::new(0),
            ready_timeout,
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or re-register) a table and return the id it lives under.
    ///
    /// A table that is not currently registered but whose title matches a
    /// retained one takes over the retained id, so dependents bound to that
    /// id keep working. Without a schema the table stays `SchemaPending` and
    /// records `SCHEMA_MISSING`, unless a retained schema can stand in.
    pub fn register(&self, card_id: CardId, title: &str, schema: Option<TableSchema>) -> CardId {
        let mut state = self.write();

        let effective = if state.tables.contains_key(&card_id) || state.retained.contains_key(&card_id) {
            card_id
        } else if title.is_empty() {
            card_id
        } else {
            let reused = state
                .retained
                .iter()
                .filter(|(id, r)| r.title == title && !state.tables.contains_key(id))
                .max_by_key(|(_, r)| r.seq)
                .map(|(id, _)| *id);
            match reused {
                Some(previous) => {
                    info!(
                        "Local table '{}' re-registered as {}, reusing id {}",
                        title, card_id, previous
                    );
                    previous
                }
                None => card_id,
            }
        };

        let retained = state.retained.remove(&effective);
        let schema = schema.or_else(|| retained.and_then(|r| r.schema));

        let table = state
            .tables
            .entry(effective)
            .or_insert_with(|| RegisteredTable::new(title));
        table.title = title.to_string();

        match schema {
            Some(schema) => table.apply_schema(schema),
            None if table.schema.is_none() => {
                warn!("Local table {} registered without a schema", effective);
                table.readiness.modify(|r| {
                    r.phase = TablePhase::SchemaPending;
                    r.error = Some(SCHEMA_MISSING.to_string());
                    true
                });
            }
            None => {}
        }

        info!(
            "Registered local table {} '{}' ({:?})",
            effective,
            title,
            table.readiness.get().phase
        );
        self.bump_generation();
        effective
    }

    /// Provide or replace the schema of a registered table
    pub fn set_schema(&self, card_id: CardId, schema: TableSchema) -> Result<()> {
        let mut state = self.write();
        let table = state
            .tables
            .get_mut(&card_id)
            .ok_or(DashError::SourceNotRegistered(card_id))?;
        table.apply_schema(schema);
        debug!("Schema set for local table {}", card_id);
        Ok(())
    }

    /// Publish a new snapshot. Returns whether subscribers were notified,
    /// which they are not when the snapshot equals the current one.
    ///
    /// A successful push clears any recorded push failure.
    pub fn push(&self, card_id: CardId, snapshot: TableSnapshot) -> Result<bool> {
        let mut state = self.write();
        let table = state
            .tables
            .get_mut(&card_id)
            .ok_or(DashError::SourceNotRegistered(card_id))?;

        let rows = snapshot.len();
        let notified = table.snapshot.publish_if_changed(Some(snapshot));
        table.last_push_at = Some(Utc::now());

        let schema_known = table.schema.is_some();
        table.readiness.modify(|r| {
            let before = r.clone();
            if schema_known {
                r.phase = TablePhase::DataReady;
                r.error = None;
            } else if r.error.as_deref() != Some(SCHEMA_MISSING) {
                r.error = None;
            }
            *r != before
        });

        if notified {
            debug!("Local table {} pushed {} rows", card_id, rows);
        } else {
            debug!("Local table {} push unchanged, not forwarded", card_id);
        }
        Ok(notified)
    }

    /// Record a failed push. The registration and its last snapshot stay.
    pub fn push_failed(&self, card_id: CardId, reason: &str) -> Result<()> {
        let state = self.read();
        let table = state
            .tables
            .get(&card_id)
            .ok_or(DashError::SourceNotRegistered(card_id))?;
        warn!("Local table {} push failed: {}", card_id, reason);
        table.readiness.modify(|r| {
            r.error = Some(reason.to_string());
            true
        });
        Ok(())
    }

    /// Stop forwarding data for a table, retaining its title and schema.
    /// Current subscribers keep the last value and then see the stream end.
    pub fn unregister(&self, card_id: CardId) -> bool {
        let mut state = self.write();
        let Some(table) = state.tables.remove(&card_id) else {
            return false;
        };
        state.next_seq += 1;
        let seq = state.next_seq;
        state.retained.insert(
            card_id,
            RetainedTable {
                title: table.title.clone(),
                schema: table.schema.clone(),
                seq,
            },
        );
        info!("Unregistered local table {} '{}'", card_id, table.title);
        self.bump_generation();
        true
    }

    fn bump_generation(&self) {
        self.generation.modify(|g| {
            *g += 1;
            true
        });
    }

    /// Live counter that changes whenever any table registers or
    /// unregisters. Lets dependents resubscribe after their upstream
    /// comes back.
    pub fn registrations(&self) -> LiveValue<u64> {
        self.generation.subscribe()
    }

    /// Live snapshot stream, starting with the current snapshot
    pub fn subscribe(&self, card_id: CardId) -> Result<LiveValue<Option<TableSnapshot>>> {
        self.read()
            .tables
            .get(&card_id)
            .map(|t| t.snapshot.subscribe())
            .ok_or(DashError::SourceNotRegistered(card_id))
    }

    pub fn readiness(&self, card_id: CardId) -> Result<LiveValue<Readiness>> {
        self.read()
            .tables
            .get(&card_id)
            .map(|t| t.readiness.subscribe())
            .ok_or(DashError::SourceNotRegistered(card_id))
    }

    /// `schemaReady && dataReady && !error`, live
    pub fn wait_for_ready(&self, card_id: CardId) -> Result<LiveValue<bool>> {
        Ok(self.readiness(card_id)?.map(Readiness::is_ready))
    }

    /// Wait (bounded) until the table is ready and return its snapshot.
    ///
    /// A push failure fails fast with `TableFailed`. A missing schema keeps
    /// waiting, since the schema may still arrive, and turns into
    /// `SchemaMissing` on timeout.
    pub async fn await_ready(&self, card_id: CardId, timeout: Duration) -> Result<TableSnapshot> {
        let mut readiness = self.readiness(card_id)?;
        let settled = readiness
            .wait_until(timeout, |r| {
                r.is_ready() || r.error.as_deref().is_some_and(|e| e != SCHEMA_MISSING)
            })
            .await;

        match settled {
            Ok(r) if r.is_ready() => {}
            Ok(r) => {
                return Err(DashError::TableFailed {
                    card_id,
                    reason: r.error.unwrap_or_default(),
                })
            }
            Err(WaitError::Closed) => return Err(DashError::SourceNotRegistered(card_id)),
            Err(WaitError::TimedOut) => {
                let current = readiness.current();
                return Err(if current.error.as_deref() == Some(SCHEMA_MISSING) {
                    DashError::SchemaMissing(card_id)
                } else {
                    DashError::ReadyTimeout {
                        card_id,
                        waited: timeout,
                    }
                });
            }
        }

        self.subscribe(card_id)?
            .current()
            .ok_or(DashError::SourceNotRegistered(card_id))
    }

    /// Schema of a registered table, or the retained one after unregistering
    pub fn schema_of(&self, card_id: CardId) -> Option<TableSchema> {
        let state = self.read();
        state
            .tables
            .get(&card_id)
            .and_then(|t| t.schema.clone())
            .or_else(|| state.retained.get(&card_id).and_then(|r| r.schema.clone()))
    }

    pub fn title_of(&self, card_id: CardId) -> Option<String> {
        let state = self.read();
        state
            .tables
            .get(&card_id)
            .map(|t| t.title.clone())
            .or_else(|| state.retained.get(&card_id).map(|r| r.title.clone()))
    }

    pub fn is_registered(&self, card_id: CardId) -> bool {
        self.read().tables.contains_key(&card_id)
    }

    pub fn registered_ids(&self) -> Vec<CardId> {
        let mut ids: Vec<_> = self.read().tables.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn table_info(&self) -> Vec<TableInfo> {
        let state = self.read();
        let mut info: Vec<_> = state
            .tables
            .iter()
            .map(|(id, t)| TableInfo {
                card_id: *id,
                title: t.title.clone(),
                readiness: t.readiness.get(),
                rows: t.snapshot.get().map(|s| s.len()).unwrap_or(0),
                last_push_at: t.last_push_at,
            })
            .collect();
        info.sort_by_key(|i| i.card_id);
        info
    }

    /// Debug: print all registrations and their state
    pub fn debug_print_tables(&self) {
        let tables = self.table_info();
        info!("=== Local tables ({} registered) ===", tables.len());
        for t in tables {
            info!(
                "  {} '{}' : {:?}, error={:?}, rows={}, last_push={:?}",
                t.card_id, t.title, t.readiness.phase, t.readiness.error, t.rows, t.last_push_at
            );
        }
    }
}

impl Default for LocalTableBus {
    fn default() -> Self {
        Self::new()
    }
}
