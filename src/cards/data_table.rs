//! Data table card

use crate::core::local_query::cell_text;
use crate::core::ForeignKeyDisplayPolicy;
use dashkit_core::{
    CardDescriptor, CardRenderer, ConfigFactory, ConfigOption, ConfigSchema, ValidationContext,
    MAX_PAGE_SIZE,
};
use dashkit_types::{
    codes, CardConfig, DataTableConfig, FieldPath, PagedResult, TableSchema, ValidationError,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Tabular view of a datasource, optionally republished as a local table
pub struct DataTableCard {
    fk_policy: ForeignKeyDisplayPolicy,
}

impl DataTableCard {
    pub fn new(fk_policy: ForeignKeyDisplayPolicy) -> Self {
        Self { fk_policy }
    }

    pub fn descriptor(fk_policy: ForeignKeyDisplayPolicy) -> CardDescriptor {
        let card = Arc::new(Self::new(fk_policy));
        CardDescriptor {
            type_key: "dataTable".to_string(),
            name: "Data Table".to_string(),
            renderer: card.clone(),
            config_factory: card,
            build_default_config: || CardConfig::DataTable(DataTableConfig::default()),
        }
    }

    /// Visible (field, header) pairs. No configured columns means every
    /// column: the schema's when known, else the first row's.
    fn visible_columns(config: &DataTableConfig, data: Option<&PagedResult>) -> Vec<(String, String)> {
        if !config.columns.is_empty() {
            return config
                .columns
                .iter()
                .filter(|c| c.visible)
                .map(|c| (c.field.clone(), c.header.clone().unwrap_or_else(|| c.field.clone())))
                .collect();
        }

        if let Some(schema) = &config.schema {
            return schema
                .properties
                .iter()
                .map(|(name, col)| (name.clone(), col.title.clone().unwrap_or_else(|| name.clone())))
                .collect();
        }

        data.and_then(|d| d.items.first())
            .and_then(Value::as_object)
            .map(|row| row.keys().map(|k| (k.clone(), k.clone())).collect())
            .unwrap_or_default()
    }

    fn display_cell(&self, schema: Option<&TableSchema>, data: &PagedResult, field: &str, cell: &Value) -> Value {
        let reference = schema
            .and_then(|s| s.column(field))
            .and_then(|c| c.foreign_key.as_ref());
        let (Some(reference), Some(fk_data)) = (reference, data.foreign_key_data.as_ref()) else {
            return cell.clone();
        };
        let rows = fk_data.get(field).or_else(|| fk_data.get(&reference.table));
        rows.and_then(|rows| self.fk_policy.resolve(reference, cell, rows))
            .unwrap_or_else(|| cell.clone())
    }
}

impl CardRenderer for DataTableCard {
    fn render(&self, config: &CardConfig, data: Option<&PagedResult>) -> Value {
        let CardConfig::DataTable(config) = config else {
            return Value::Null;
        };
        let columns = Self::visible_columns(config, data);
        let schema = config.schema.as_ref();

        let rows: Vec<Value> = data
            .map(|d| {
                d.items
                    .iter()
                    .map(|row| {
                        let cells: Vec<Value> = columns
                            .iter()
                            .map(|(field, _)| {
                                let cell = row.get(field).unwrap_or(&Value::Null);
                                self.display_cell(schema, d, field, cell)
                            })
                            .collect();
                        Value::Array(cells)
                    })
                    .collect()
            })
            .unwrap_or_default();

        json!({
            "kind": "dataTable",
            "title": config.title,
            "columns": columns
                .iter()
                .map(|(field, header)| json!({"field": field, "header": header}))
                .collect::<Vec<_>>(),
            "rows": rows,
            "total": data.map(|d| d.total).unwrap_or(0),
            "pageSize": config.page_size,
            "loading": data.is_none(),
        })
    }
}

impl ConfigFactory for DataTableCard {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            options: vec![
                ConfigOption::new("datasource", "Datasource", "Where the rows come from", "datasource", Value::Null),
                ConfigOption::new("title", "Title", "Heading shown above the table", "string", json!("")),
                ConfigOption::new("columns", "Columns", "Visible columns; empty shows all", "columns", json!([])),
                ConfigOption::new("pageSize", "Page Size", "Rows per page", "number", json!(25)),
                ConfigOption::new("refreshIntervalSecs", "Refresh Interval", "Seconds between refreshes; 0 disables", "number", json!(0)),
                ConfigOption::new("exposeAsLocalTable", "Expose as Local Table", "Let other cards use these rows", "boolean", json!(false)),
            ],
        }
    }

    fn validate(&self, config: &CardConfig, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let CardConfig::DataTable(config) = config else {
            return Vec::new();
        };
        let mut errors = Vec::new();

        if config.page_size == 0 || config.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError::new(
                codes::OUT_OF_RANGE,
                format!("page size must be between 1 and {}", MAX_PAGE_SIZE),
                &FieldPath::new("pageSize"),
            ));
        }

        let schema = ctx.schema.or(config.schema.as_ref());
        let columns = FieldPath::new("columns");
        for (i, column) in config.columns.iter().enumerate() {
            let path = columns.index(i).field("field");
            if column.field.trim().is_empty() {
                errors.push(ValidationError::required(&path));
            } else if let Some(schema) = schema {
                if !schema.has_column(&column.field) {
                    errors.push(ValidationError::new(
                        codes::UNKNOWN_COLUMN,
                        format!("no column '{}' in the datasource", column.field),
                        &path,
                    ));
                }
            }
        }

        errors
    }
}

/// Text of each visible cell, for exports and tests
pub fn row_texts(view: &Value) -> Vec<Vec<String>> {
    view["rows"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_text).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}
