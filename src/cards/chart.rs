//! Chart card

use dashkit_core::{
    CardDescriptor, CardRenderer, ConfigFactory, ConfigOption, ConfigSchema, ValidationContext,
};
use dashkit_types::{
    codes, is_hex_rgb, palette_color, CardConfig, ChartConfig, ChartKind, FieldPath, PagedResult,
    ValidationError,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::local_query::cell_text;

#[derive(Debug, Default)]
pub struct ChartCard;

impl ChartCard {
    pub fn descriptor() -> CardDescriptor {
        let card = Arc::new(ChartCard);
        CardDescriptor {
            type_key: "chart".to_string(),
            name: "Chart".to_string(),
            renderer: card.clone(),
            config_factory: card,
            build_default_config: || CardConfig::Chart(ChartConfig::default()),
        }
    }
}

fn numeric(cell: Option<&Value>) -> Value {
    match cell {
        Some(Value::Number(n)) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Value::from).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

impl CardRenderer for ChartCard {
    fn render(&self, config: &CardConfig, data: Option<&PagedResult>) -> Value {
        let CardConfig::Chart(config) = config else {
            return Value::Null;
        };
        let rows: &[Value] = data.map(|d| d.items.as_slice()).unwrap_or(&[]);

        let labels: Vec<String> = rows
            .iter()
            .map(|row| row.get(&config.label_column).map(cell_text).unwrap_or_default())
            .collect();

        let series: Vec<Value> = config
            .series
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let points: Vec<Value> = rows.iter().map(|row| numeric(row.get(&s.data_column))).collect();
                json!({
                    "name": s.name.clone().unwrap_or_else(|| s.data_column.clone()),
                    "color": s.color.clone().unwrap_or_else(|| palette_color(i).to_string()),
                    "points": points,
                })
            })
            .collect();

        json!({
            "kind": "chart",
            "chartKind": config.chart_kind,
            "labels": labels,
            "series": series,
            "loading": data.is_none(),
        })
    }
}

impl ConfigFactory for ChartCard {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            options: vec![
                ConfigOption::new("datasource", "Datasource", "Where the points come from", "datasource", Value::Null),
                ConfigOption::new("chartKind", "Chart Type", "bar, line, area or pie", "string", json!("bar")),
                ConfigOption::new("labelColumn", "Label Column", "Column used for the category axis", "column", json!("")),
                ConfigOption::new("series", "Series", "Numeric columns to plot", "series", json!([])),
                ConfigOption::new("refreshIntervalSecs", "Refresh Interval", "Seconds between refreshes; 0 disables", "number", json!(0)),
            ],
        }
    }

    fn validate(&self, config: &CardConfig, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let CardConfig::Chart(config) = config else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        let series_path = FieldPath::new("series");

        if config.series.is_empty() {
            errors.push(ValidationError::new(
                codes::REQUIRED,
                "a chart needs at least one series",
                &series_path,
            ));
        } else if config.chart_kind == ChartKind::Pie && config.series.len() > 1 {
            errors.push(ValidationError::new(
                codes::TOO_MANY,
                "a pie chart takes exactly one series",
                &series_path,
            ));
        }

        let label_path = FieldPath::new("labelColumn");
        if config.label_column.trim().is_empty() {
            errors.push(ValidationError::required(&label_path));
        } else if let Some(schema) = ctx.schema {
            if !schema.has_column(&config.label_column) {
                errors.push(ValidationError::new(
                    codes::UNKNOWN_COLUMN,
                    format!("no column '{}' in the datasource", config.label_column),
                    &label_path,
                ));
            }
        }

        for (i, series) in config.series.iter().enumerate() {
            let item = series_path.index(i);
            let column_path = item.field("dataColumn");

            if series.data_column.trim().is_empty() {
                errors.push(ValidationError::required(&column_path));
            } else if let Some(schema) = ctx.schema {
                if !schema.has_column(&series.data_column) {
                    errors.push(ValidationError::new(
                        codes::UNKNOWN_COLUMN,
                        format!("no column '{}' in the datasource", series.data_column),
                        &column_path,
                    ));
                } else if !schema.is_numeric(&series.data_column) {
                    errors.push(ValidationError::new(
                        codes::NOT_NUMERIC,
                        format!("column '{}' is not numeric", series.data_column),
                        &column_path,
                    ));
                }
            }

            if let Some(color) = &series.color {
                if !is_hex_rgb(color) {
                    errors.push(ValidationError::new(
                        codes::INVALID_COLOR,
                        format!("'{}' is not a #RRGGBB color", color),
                        &item.field("color"),
                    ));
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkit_types::{ColumnType, SeriesConfig, TableSchema};

    fn series(column: &str) -> SeriesConfig {
        SeriesConfig {
            data_column: column.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_labels_and_points() {
        let config = CardConfig::Chart(ChartConfig {
            label_column: "month".into(),
            series: vec![
                series("revenue"),
                SeriesConfig {
                    data_column: "cost".into(),
                    name: Some("Costs".into()),
                    color: Some("#112233".into()),
                },
            ],
            ..Default::default()
        });
        let data = PagedResult::from_items(vec![
            json!({"month": "Jan", "revenue": 10, "cost": "4.5"}),
            json!({"month": "Feb", "revenue": null, "cost": 3}),
        ]);

        let view = ChartCard.render(&config, Some(&data));
        assert_eq!(view["chartKind"], "bar");
        assert_eq!(view["labels"], json!(["Jan", "Feb"]));
        assert_eq!(view["series"][0]["name"], "revenue");
        assert_eq!(view["series"][0]["color"], palette_color(0));
        assert_eq!(view["series"][0]["points"], json!([10.0, null]));
        assert_eq!(view["series"][1]["name"], "Costs");
        assert_eq!(view["series"][1]["points"], json!([4.5, 3.0]));
    }

    #[test]
    fn test_series_required_and_pie_takes_one() {
        let mut config = ChartConfig {
            label_column: "m".into(),
            ..Default::default()
        };
        let errors = ChartCard.validate(&CardConfig::Chart(config.clone()), &ValidationContext::default());
        assert_eq!(errors[0].field_path, "series");
        assert_eq!(errors[0].code, codes::REQUIRED);

        config.chart_kind = ChartKind::Pie;
        config.series = vec![series("a"), series("b")];
        let errors = ChartCard.validate(&CardConfig::Chart(config), &ValidationContext::default());
        assert_eq!(errors[0].code, codes::TOO_MANY);
    }

    #[test]
    fn test_columns_checked_against_schema() {
        let schema = TableSchema::with_columns([
            ("month", ColumnType::String),
            ("revenue", ColumnType::Integer),
        ]);
        let config = CardConfig::Chart(ChartConfig {
            label_column: "week".into(),
            series: vec![series("revenue"), series("profit"), series("")],
            ..Default::default()
        });
        let errors = ChartCard.validate(&config, &ValidationContext::new(Some(&schema)));
        let paths: Vec<_> = errors.iter().map(|e| (e.field_path.as_str(), e.code.as_str())).collect();
        assert_eq!(
            paths,
            vec![
                ("labelColumn", codes::UNKNOWN_COLUMN),
                ("series.1.dataColumn", codes::UNKNOWN_COLUMN),
                ("series.2.dataColumn", codes::REQUIRED),
            ]
        );
    }
}
