//! Registry for card types
//!
//! Card types are registered once during bootstrap and never change
//! afterwards. Lookups load the current map through an `ArcSwap`, so readers
//! never take a lock; writers copy the map, insert and swap it in.

use arc_swap::ArcSwap;
use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::card::CardDescriptor;
use crate::error::RegistryError;

type CardMap = HashMap<String, Arc<CardDescriptor>>;

/// Summary of a registered card type for palettes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub type_key: String,
    pub name: String,
}

/// Registry for card types
pub struct CardRegistry {
    cards: ArcSwap<CardMap>,
    /// Serializes writers; readers never touch it
    write_lock: Mutex<()>,
}

impl CardRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            cards: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a card type.
    ///
    /// Registering a key twice is a programming error in the bootstrap code;
    /// callers are expected to abort startup on `AlreadyRegistered`.
    pub fn register(&self, descriptor: CardDescriptor) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.cards.load();
        if current.contains_key(&descriptor.type_key) {
            return Err(RegistryError::AlreadyRegistered(descriptor.type_key));
        }

        let mut next = CardMap::clone(&current);
        let key = descriptor.type_key.clone();
        next.insert(key.clone(), Arc::new(descriptor));
        self.cards.store(Arc::new(next));

        info!("Registered card type '{}'", key);
        Ok(())
    }

    /// Look up a card type by key
    pub fn lookup(&self, type_key: &str) -> Result<Arc<CardDescriptor>, RegistryError> {
        self.cards
            .load()
            .get(type_key)
            .cloned()
            .ok_or_else(|| {
                debug!("Lookup of unknown card type '{}'", type_key);
                RegistryError::NotFound(type_key.to_string())
            })
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.cards.load().contains_key(type_key)
    }

    /// All descriptors, sorted by key
    pub fn list_all(&self) -> Vec<Arc<CardDescriptor>> {
        let mut all: Vec<_> = self.cards.load().values().cloned().collect();
        all.sort_by(|a, b| a.type_key.cmp(&b.type_key));
        all
    }

    /// Key and display name of every card type, sorted by key
    pub fn list_info(&self) -> Vec<CardInfo> {
        self.list_all()
            .into_iter()
            .map(|d| CardInfo {
                type_key: d.type_key.clone(),
                name: d.name.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cards.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: Lazy<Arc<CardRegistry>> = Lazy::new(|| Arc::new(CardRegistry::new()));

/// Get the process-wide registry
pub fn global_registry() -> Arc<CardRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardRenderer, ConfigFactory, ConfigSchema, ValidationContext};
    use dashkit_types::{CardConfig, HtmlConfig, PagedResult, ValidationError};
    use serde_json::Value;

    struct Nothing;

    impl CardRenderer for Nothing {
        fn render(&self, _config: &CardConfig, _data: Option<&PagedResult>) -> Value {
            Value::Null
        }
    }

    impl ConfigFactory for Nothing {
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::default()
        }

        fn validate(&self, _config: &CardConfig, _ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
            Vec::new()
        }
    }

    fn descriptor(key: &str) -> CardDescriptor {
        CardDescriptor {
            type_key: key.to_string(),
            name: key.to_uppercase(),
            renderer: Arc::new(Nothing),
            config_factory: Arc::new(Nothing),
            build_default_config: || CardConfig::Html(HtmlConfig::default()),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = CardRegistry::new();
        registry.register(descriptor("html")).unwrap();

        let found = registry.lookup("html").unwrap();
        assert_eq!(found.name, "HTML");
        assert_eq!(found.default_config().type_key(), "html");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = CardRegistry::new();
        registry.register(descriptor("html")).unwrap();
        assert_eq!(
            registry.register(descriptor("html")),
            Err(RegistryError::AlreadyRegistered("html".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_returns_not_found() {
        let registry = CardRegistry::new();
        assert_eq!(
            registry.lookup("gauge").unwrap_err(),
            RegistryError::NotFound("gauge".to_string())
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = CardRegistry::new();
        for key in ["label", "chart", "html"] {
            registry.register(descriptor(key)).unwrap();
        }
        let keys: Vec<_> = registry.list_info().into_iter().map(|i| i.type_key).collect();
        assert_eq!(keys, vec!["chart", "html", "label"]);
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = Arc::new(CardRegistry::new());
        registry.register(descriptor("html")).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || (0..1000).all(|_| registry.contains("html")))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
