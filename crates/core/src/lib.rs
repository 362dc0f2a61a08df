//! dashkit-core: Core traits, errors and the card registry.
//!
//! This crate contains the card plugin traits (CardRenderer, ConfigFactory),
//! the RemoteApi collaborator trait, the error taxonomy, the global
//! CardRegistry, and shared constants.

pub mod api;
pub mod card;
pub mod constants;
pub mod error;
pub mod registry;

pub use api::RemoteApi;
pub use card::{
    CardDescriptor, CardRenderer, ConfigFactory, ConfigOption, ConfigSchema, ValidationContext,
};
pub use constants::{
    CACHE_TTL, DEFAULT_DISPLAY_HINTS, LOCAL_TABLE_READY_TIMEOUT, MAX_PAGE_SIZE,
    MIN_REFRESH_INTERVAL_SECS,
};
pub use error::{DashError, FetchError, RegistryError, Result};
pub use registry::{global_registry, CardInfo, CardRegistry};

// Re-export types used in trait signatures for convenience
pub use dashkit_types::{CardConfig, PagedResult, TableSchema};
