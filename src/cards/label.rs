//! Label card - static text or a single value from a datasource

use dashkit_core::{
    CardDescriptor, CardRenderer, ConfigFactory, ConfigOption, ConfigSchema, ValidationContext,
};
use dashkit_types::{
    codes, is_hex_rgb, CardConfig, FieldPath, LabelConfig, PagedResult, ValidationError,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::local_query::cell_text;

/// Placeholder replaced by the bound value
const VALUE_PLACEHOLDER: &str = "{value}";

#[derive(Debug, Default)]
pub struct LabelCard;

impl LabelCard {
    pub fn descriptor() -> CardDescriptor {
        let card = Arc::new(LabelCard);
        CardDescriptor {
            type_key: "label".to_string(),
            name: "Label".to_string(),
            renderer: card.clone(),
            config_factory: card,
            build_default_config: || CardConfig::Label(LabelConfig::default()),
        }
    }
}

impl CardRenderer for LabelCard {
    fn render(&self, config: &CardConfig, data: Option<&PagedResult>) -> Value {
        let CardConfig::Label(config) = config else {
            return Value::Null;
        };

        let text = match (&config.datasource, &config.value_column) {
            (Some(_), Some(column)) => {
                let value = data
                    .and_then(|d| d.items.first())
                    .and_then(|row| row.get(column))
                    .map(cell_text)
                    .unwrap_or_default();
                if config.text.contains(VALUE_PLACEHOLDER) {
                    config.text.replace(VALUE_PLACEHOLDER, &value)
                } else if config.text.is_empty() {
                    value
                } else {
                    format!("{} {}", config.text, value)
                }
            }
            _ => config.text.clone(),
        };

        json!({
            "kind": "label",
            "text": text,
            "color": config.color,
            "loading": config.datasource.is_some() && data.is_none(),
        })
    }
}

impl ConfigFactory for LabelCard {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            options: vec![
                ConfigOption::new("text", "Text", "Shown text; {value} is replaced by the bound value", "string", json!("Label")),
                ConfigOption::new("color", "Color", "Text color as #RRGGBB", "color", Value::Null),
                ConfigOption::new("datasource", "Datasource", "Optional value source", "datasource", Value::Null),
                ConfigOption::new("valueColumn", "Value Column", "Column read from the first row", "column", Value::Null),
                ConfigOption::new("refreshIntervalSecs", "Refresh Interval", "Seconds between refreshes; 0 disables", "number", json!(0)),
            ],
        }
    }

    fn validate(&self, config: &CardConfig, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let CardConfig::Label(config) = config else {
            return Vec::new();
        };
        let mut errors = Vec::new();

        if let Some(color) = &config.color {
            if !is_hex_rgb(color) {
                errors.push(ValidationError::new(
                    codes::INVALID_COLOR,
                    format!("'{}' is not a #RRGGBB color", color),
                    &FieldPath::new("color"),
                ));
            }
        }

        if config.datasource.is_some() {
            let path = FieldPath::new("valueColumn");
            match config.value_column.as_deref().map(str::trim) {
                None | Some("") => errors.push(ValidationError::required(&path)),
                Some(column) => {
                    if let Some(schema) = ctx.schema {
                        if !schema.has_column(column) {
                            errors.push(ValidationError::new(
                                codes::UNKNOWN_COLUMN,
                                format!("no column '{}' in the datasource", column),
                                &path,
                            ));
                        }
                    }
                }
            }
        } else if config.text.trim().is_empty() {
            errors.push(ValidationError::required(&FieldPath::new("text")));
        }

        errors
    }
}
