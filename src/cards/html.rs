//! Static HTML block

use dashkit_core::{
    CardDescriptor, CardRenderer, ConfigFactory, ConfigOption, ConfigSchema, ValidationContext,
};
use dashkit_types::{CardConfig, FieldPath, HtmlConfig, PagedResult, ValidationError};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct HtmlCard;

impl HtmlCard {
    pub fn descriptor() -> CardDescriptor {
        let card = Arc::new(HtmlCard);
        CardDescriptor {
            type_key: "html".to_string(),
            name: "HTML Block".to_string(),
            renderer: card.clone(),
            config_factory: card,
            build_default_config: || {
                CardConfig::Html(HtmlConfig {
                    content: "<p></p>".to_string(),
                })
            },
        }
    }
}

impl CardRenderer for HtmlCard {
    fn render(&self, config: &CardConfig, _data: Option<&PagedResult>) -> Value {
        match config {
            CardConfig::Html(config) => json!({"kind": "html", "content": config.content}),
            _ => Value::Null,
        }
    }
}

impl ConfigFactory for HtmlCard {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            options: vec![ConfigOption::new(
                "content",
                "Content",
                "HTML markup, rendered as-is",
                "html",
                json!("<p></p>"),
            )],
        }
    }

    fn validate(&self, config: &CardConfig, _ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        match config {
            CardConfig::Html(config) if config.content.trim().is_empty() => {
                vec![ValidationError::required(&FieldPath::new("content"))]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_passthrough_and_rule() {
        let config = CardConfig::Html(HtmlConfig {
            content: "<b>x</b>".into(),
        });
        assert_eq!(HtmlCard.render(&config, None)["content"], "<b>x</b>");
        assert!(HtmlCard.validate(&config, &ValidationContext::default()).is_empty());

        let empty = CardConfig::Html(HtmlConfig::default());
        let errors = HtmlCard.validate(&empty, &ValidationContext::default());
        assert_eq!(errors[0].field_path, "content");
    }
}
