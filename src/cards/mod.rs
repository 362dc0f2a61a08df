//! Built-in card types
//!
//! Each card type supplies a renderer, a config factory (editor options and
//! card-specific validation rules) and a default config.

mod chart;
mod data_table;
mod html;
mod label;

pub use chart::ChartCard;
pub use data_table::DataTableCard;
pub use html::HtmlCard;
pub use label::LabelCard;

use crate::core::ForeignKeyDisplayPolicy;
use dashkit_core::{CardRegistry, RegistryError};

/// Register all built-in card types with the default foreign-key policy
pub fn register_all(registry: &CardRegistry) -> Result<(), RegistryError> {
    register_all_with(registry, &ForeignKeyDisplayPolicy::default())
}

/// Register all built-in card types. Stops at the first duplicate key.
pub fn register_all_with(
    registry: &CardRegistry,
    fk_policy: &ForeignKeyDisplayPolicy,
) -> Result<(), RegistryError> {
    registry.register(DataTableCard::descriptor(fk_policy.clone()))?;
    registry.register(ChartCard::descriptor())?;
    registry.register(LabelCard::descriptor())?;
    registry.register(HtmlCard::descriptor())?;
    Ok(())
}
