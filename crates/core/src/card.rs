//! Card plugin traits and the descriptor the registry stores

use dashkit_types::{CardConfig, PagedResult, TableSchema, ValidationError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::constants::MIN_REFRESH_INTERVAL_SECS;

/// Configuration schema for a card option
#[derive(Debug, Clone)]
pub struct ConfigOption {
    /// Option key (camelCase, as serialized)
    pub key: String,
    /// Human-readable name
    pub name: String,
    /// Description
    pub description: String,
    /// Value type (e.g., "datasource", "color", "number", "string", "boolean", "columns")
    pub value_type: String,
    /// Default value
    pub default: Value,
}

impl ConfigOption {
    pub fn new(key: &str, name: &str, description: &str, value_type: &str, default: Value) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            value_type: value_type.to_string(),
            default,
        }
    }
}

/// Configuration schema for a card type
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    /// Available configuration options
    pub options: Vec<ConfigOption>,
}

/// What a rule set may consult besides the config itself
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Schema of the bound datasource, when known
    pub schema: Option<&'a TableSchema>,
    /// Smallest non-zero refresh interval accepted
    pub min_refresh_interval_secs: u64,
}

impl<'a> ValidationContext<'a> {
    pub fn new(schema: Option<&'a TableSchema>) -> Self {
        Self {
            schema,
            min_refresh_interval_secs: MIN_REFRESH_INTERVAL_SECS,
        }
    }
}

impl Default for ValidationContext<'_> {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Builds the editing form for a card and checks its configs
pub trait ConfigFactory: Send + Sync {
    /// Describes the options the editor should offer
    fn config_schema(&self) -> ConfigSchema;

    /// Card-specific rules. Generic rules (datasource presence and shape,
    /// refresh interval) run before these and need not be repeated.
    fn validate(&self, config: &CardConfig, ctx: &ValidationContext<'_>) -> Vec<ValidationError>;
}

/// Turns a config and its data into a view model.
///
/// The output is rendering-technology neutral JSON; the UI layer decides
/// how to draw it.
pub trait CardRenderer: Send + Sync {
    fn render(&self, config: &CardConfig, data: Option<&PagedResult>) -> Value;
}

/// Everything the registry knows about one card type
#[derive(Clone)]
pub struct CardDescriptor {
    /// Unique key, also the `type` tag of the card's config
    pub type_key: String,
    /// Human-readable name for palettes
    pub name: String,
    pub renderer: Arc<dyn CardRenderer>,
    pub config_factory: Arc<dyn ConfigFactory>,
    pub build_default_config: fn() -> CardConfig,
}

impl CardDescriptor {
    pub fn default_config(&self) -> CardConfig {
        (self.build_default_config)()
    }
}

impl fmt::Debug for CardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDescriptor")
            .field("type_key", &self.type_key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
