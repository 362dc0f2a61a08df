//! Configuration management

mod defaults;
mod settings;

pub use defaults::apply_card_defaults;
pub use settings::{
    AppConfig, CacheSettings, ForeignKeySettings, LocalTableSettings, RefreshSettings,
};
