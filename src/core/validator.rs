//! Card configuration validation
//!
//! Generic rules run first (card type, datasource presence and shape, refresh
//! interval), then the card type's own rules from its `ConfigFactory`.
//! Validation never fails; every problem becomes a `ValidationError` with a
//! field path the editor can point at.

use dashkit_core::{CardRegistry, ValidationContext};
use dashkit_types::{
    codes, CardConfig, DatasourceDescriptor, FieldPath, TableSchema, ValidationError,
    ValidationResult,
};
use log::debug;
use serde_json::Value;

/// Validate a typed config against the card type `type_key`
pub fn validate(
    registry: &CardRegistry,
    type_key: &str,
    config: &CardConfig,
    schema: Option<&TableSchema>,
) -> ValidationResult {
    validate_with(registry, type_key, config, &ValidationContext::new(schema))
}

/// Like [`validate`] with an explicit context (schema and refresh minimum)
pub fn validate_with(
    registry: &CardRegistry,
    type_key: &str,
    config: &CardConfig,
    ctx: &ValidationContext<'_>,
) -> ValidationResult {
    let type_path = FieldPath::new("type");

    let descriptor = match registry.lookup(type_key) {
        Ok(d) => d,
        Err(e) => {
            return ValidationResult::from_errors(vec![ValidationError::new(
                codes::UNKNOWN_CARD_TYPE,
                e.to_string(),
                &type_path,
            )])
        }
    };

    if config.type_key() != type_key {
        return ValidationResult::from_errors(vec![ValidationError::new(
            codes::TYPE_MISMATCH,
            format!(
                "config is a '{}' config, expected '{}'",
                config.type_key(),
                type_key
            ),
            &type_path,
        )]);
    }

    let mut errors = Vec::new();

    match config.datasource() {
        Some(datasource) => check_datasource(datasource, &FieldPath::new("datasource"), &mut errors),
        None if config.requires_datasource() => {
            errors.push(ValidationError::new(
                codes::REQUIRED,
                format!("a {} card needs a datasource", descriptor.name),
                &FieldPath::new("datasource"),
            ));
        }
        None => {}
    }

    let interval = config.refresh_interval_secs();
    if interval != 0 && interval < ctx.min_refresh_interval_secs {
        errors.push(ValidationError::new(
            codes::OUT_OF_RANGE,
            format!(
                "refresh interval must be 0 (off) or at least {} seconds",
                ctx.min_refresh_interval_secs
            ),
            &FieldPath::new("refreshIntervalSecs"),
        ));
    }

    errors.extend(descriptor.config_factory.validate(config, ctx));

    if !errors.is_empty() {
        debug!("{} config has {} validation errors", type_key, errors.len());
    }
    ValidationResult::from_errors(errors)
}

/// Validate raw JSON. A missing `type` tag is taken from `type_key`.
pub fn validate_value(
    registry: &CardRegistry,
    type_key: &str,
    value: &Value,
    schema: Option<&TableSchema>,
) -> ValidationResult {
    validate_value_with(registry, type_key, value, &ValidationContext::new(schema))
}

/// Like [`validate_value`] with an explicit context
pub fn validate_value_with(
    registry: &CardRegistry,
    type_key: &str,
    value: &Value,
    ctx: &ValidationContext<'_>,
) -> ValidationResult {
    if !registry.contains(type_key) {
        return ValidationResult::from_errors(vec![ValidationError::new(
            codes::UNKNOWN_CARD_TYPE,
            format!("unknown card type '{}'", type_key),
            &FieldPath::new("type"),
        )]);
    }

    let mut value = value.clone();
    if let Value::Object(obj) = &mut value {
        obj.entry("type")
            .or_insert_with(|| Value::String(type_key.to_string()));
    }

    match serde_json::from_value::<CardConfig>(value) {
        Ok(config) => validate_with(registry, type_key, &config, ctx),
        Err(e) => ValidationResult::from_errors(vec![ValidationError::new(
            codes::MALFORMED,
            format!("config could not be decoded: {}", e),
            &FieldPath::root(),
        )]),
    }
}

fn check_datasource(
    datasource: &DatasourceDescriptor,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) {
    match datasource {
        DatasourceDescriptor::Remote(remote) => {
            if remote.connection_id.is_none() {
                errors.push(ValidationError::required(&path.field("connectionId")));
            }
            if remote.route.as_deref().map_or(true, |r| r.trim().is_empty()) {
                errors.push(ValidationError::required(&path.field("route")));
            }
        }
        DatasourceDescriptor::Entity(entity) => {
            if entity.context.as_deref().map_or(true, str::is_empty) {
                errors.push(ValidationError::required(&path.field("context")));
            }
            if entity.entity_name.as_deref().map_or(true, str::is_empty) {
                errors.push(ValidationError::required(&path.field("entityName")));
            }
        }
        DatasourceDescriptor::Query(query) => {
            if query.query_id.is_none() {
                errors.push(ValidationError::required(&path.field("queryId")));
            }
        }
        DatasourceDescriptor::LocalTable(local) => {
            if local.source_card_id.is_none() {
                errors.push(ValidationError::required(&path.field("sourceCardId")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards;
    use dashkit_types::{
        ChartConfig, ColumnType, DataTableConfig, HtmlConfig, LabelConfig, SeriesConfig,
    };
    use serde_json::json;

    fn registry() -> CardRegistry {
        let registry = CardRegistry::new();
        cards::register_all(&registry).unwrap();
        registry
    }

    #[test]
    fn test_data_table_without_datasource() {
        let config = CardConfig::DataTable(DataTableConfig::default());
        let result = validate(&registry(), "dataTable", &config, None);
        assert!(!result.is_valid);
        let error = result.error_at("datasource").unwrap();
        assert_eq!(error.code, codes::REQUIRED);
    }

    #[test]
    fn test_unknown_card_type() {
        let config = CardConfig::Html(HtmlConfig::default());
        let result = validate(&registry(), "sparkline", &config, None);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, codes::UNKNOWN_CARD_TYPE);
        assert_eq!(result.errors[0].field_path, "type");
    }

    #[test]
    fn test_type_mismatch() {
        let config = CardConfig::Html(HtmlConfig {
            content: "<b>hi</b>".into(),
        });
        let result = validate(&registry(), "chart", &config, None);
        assert_eq!(result.error_at("type").unwrap().code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn test_datasource_shape_errors_have_nested_paths() {
        let config: CardConfig = serde_json::from_value(json!({
            "type": "dataTable",
            "datasource": {"kind": "remote", "connectionId": 3, "route": "  "},
        }))
        .unwrap();
        let result = validate(&registry(), "dataTable", &config, None);
        assert!(result.error_at("datasource.route").is_some());
        assert!(result.error_at("datasource.connectionId").is_none());

        let config: CardConfig = serde_json::from_value(json!({
            "type": "label",
            "text": "x",
            "datasource": {"kind": "localTable"},
            "valueColumn": "n",
        }))
        .unwrap();
        let result = validate(&registry(), "label", &config, None);
        assert!(result.error_at("datasource.sourceCardId").is_some());
    }

    #[test]
    fn test_refresh_interval_range() {
        let mut table = DataTableConfig {
            datasource: Some(DatasourceDescriptor::query(1)),
            refresh_interval_secs: 2,
            ..Default::default()
        };
        let result = validate(&registry(), "dataTable", &CardConfig::DataTable(table.clone()), None);
        assert_eq!(
            result.error_at("refreshIntervalSecs").unwrap().code,
            codes::OUT_OF_RANGE
        );

        table.refresh_interval_secs = 0;
        assert!(validate(&registry(), "dataTable", &CardConfig::DataTable(table.clone()), None).is_valid);
        table.refresh_interval_secs = 30;
        assert!(validate(&registry(), "dataTable", &CardConfig::DataTable(table), None).is_valid);
    }

    #[test]
    fn test_chart_rules_use_schema() {
        let schema = TableSchema::with_columns([
            ("month", ColumnType::String),
            ("revenue", ColumnType::Number),
        ]);
        let config = CardConfig::Chart(ChartConfig {
            datasource: Some(DatasourceDescriptor::local_table(1)),
            label_column: "month".into(),
            series: vec![
                SeriesConfig {
                    data_column: "revenue".into(),
                    ..Default::default()
                },
                SeriesConfig {
                    data_column: "month".into(),
                    color: Some("red".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let result = validate(&registry(), "chart", &config, Some(&schema));
        assert!(result.error_at("series.0.dataColumn").is_none());
        assert_eq!(
            result.error_at("series.1.dataColumn").unwrap().code,
            codes::NOT_NUMERIC
        );
        assert_eq!(
            result.error_at("series.1.color").unwrap().code,
            codes::INVALID_COLOR
        );
    }

    #[test]
    fn test_static_label_is_valid_without_datasource() {
        let config = CardConfig::Label(LabelConfig::default());
        assert!(validate(&registry(), "label", &config, None).is_valid);
    }

    #[test]
    fn test_validate_value_decodes_and_fills_type() {
        let registry = registry();
        let result = validate_value(&registry, "html", &json!({"content": "hello"}), None);
        assert!(result.is_valid);

        let result = validate_value(&registry, "chart", &json!({"series": "nope"}), None);
        assert_eq!(result.errors[0].code, codes::MALFORMED);

        let result = validate_value(&registry, "nope", &json!({}), None);
        assert_eq!(result.errors[0].code, codes::UNKNOWN_CARD_TYPE);
    }

    #[test]
    fn test_validate_value_with_uses_refresh_minimum() {
        let registry = registry();
        let value = json!({
            "datasource": {"kind": "query", "queryId": 4},
            "refreshIntervalSecs": 10,
        });
        assert!(validate_value(&registry, "dataTable", &value, None).is_valid);

        let ctx = ValidationContext {
            schema: None,
            min_refresh_interval_secs: 60,
        };
        let result = validate_value_with(&registry, "dataTable", &value, &ctx);
        assert_eq!(
            result.error_at("refreshIntervalSecs").unwrap().code,
            codes::OUT_OF_RANGE
        );
    }
}
