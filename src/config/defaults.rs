//! Per card type defaults applied to new card configs

use anyhow::{Context, Result};
use dashkit_types::CardConfig;
use log::warn;
use serde_json::Value;

/// Merge `overrides` over `base` and decode the result.
///
/// Objects merge key by key at every depth; any other value replaces the
/// base value. The `type` tag cannot be overridden.
pub fn apply_card_defaults(base: CardConfig, overrides: &Value) -> Result<CardConfig> {
    let type_key = base.type_key();
    let mut merged = serde_json::to_value(&base)?;
    merge_json(&mut merged, overrides);

    if let Value::Object(obj) = &mut merged {
        if obj.get("type").and_then(Value::as_str) != Some(type_key) {
            warn!("Ignoring 'type' in {} card defaults", type_key);
            obj.insert("type".to_string(), Value::String(type_key.to_string()));
        }
    }

    serde_json::from_value(merged)
        .with_context(|| format!("invalid card defaults for '{}'", type_key))
}

fn merge_json(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkit_types::{DataTableConfig, LabelConfig};
    use serde_json::json;

    #[test]
    fn test_overrides_merge_over_defaults() {
        let base = CardConfig::DataTable(DataTableConfig::default());
        let merged = apply_card_defaults(base, &json!({"pageSize": 50, "title": "New table"})).unwrap();
        let CardConfig::DataTable(table) = merged else {
            panic!("wrong variant");
        };
        assert_eq!(table.page_size, 50);
        assert_eq!(table.title, "New table");
        assert!(!table.expose_as_local_table);
    }

    #[test]
    fn test_type_tag_is_kept() {
        let base = CardConfig::Label(LabelConfig::default());
        let merged = apply_card_defaults(base, &json!({"type": "chart", "color": "#FF0000"})).unwrap();
        assert_eq!(merged.type_key(), "label");
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let base = CardConfig::DataTable(DataTableConfig::default());
        assert!(apply_card_defaults(base, &json!({"pageSize": "lots"})).is_err());
    }
}
