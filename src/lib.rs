//! dashkit: the runtime core of a card-based dashboard
//!
//! This library provides:
//! - A registry of card types (renderer, config factory, default config)
//! - Field-addressed configuration validation
//! - Datasources over a remote API collaborator and live local tables
//! - A query cache with TTL and single-flight fetching
//! - Auto-refresh scheduling and live widget instances

pub mod cards;
pub mod config;
pub mod core;
pub mod dashboard;

use dashkit_core::{global_registry, RegistryError};
use once_cell::sync::OnceCell;

// Re-export commonly used types
pub use config::AppConfig;
pub use core::{DatasourceService, LocalTableBus, QueryCache, RefreshScheduler, Widget, WidgetData};
pub use dashboard::Dashboard;
pub use dashkit_core::{CardDescriptor, CardRegistry, DashError, FetchError, RemoteApi, Result};
pub use dashkit_types::{CardConfig, DatasourceDescriptor, PagedResult, RequestParameters};

static INIT: OnceCell<std::result::Result<(), RegistryError>> = OnceCell::new();

/// Register the built-in card types into the global registry.
///
/// Runs once per process; later calls return the first outcome.
pub fn init() -> std::result::Result<(), RegistryError> {
    init_with(&AppConfig::default())
}

/// Like [`init`], with the foreign-key display hints from `config`
pub fn init_with(config: &AppConfig) -> std::result::Result<(), RegistryError> {
    INIT.get_or_init(|| {
        let policy = core::ForeignKeyDisplayPolicy::new(config.foreign_keys.display_hints.clone());
        cards::register_all_with(&global_registry(), &policy)
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init().unwrap();
        init().unwrap();
        assert!(global_registry().contains("dataTable"));
        assert_eq!(global_registry().len(), 4);
    }
}
