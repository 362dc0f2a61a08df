//! Column metadata describing what a table-shaped result provides

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Type of data a column contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    /// Anything the schema service reports that we don't interpret
    #[serde(other)]
    Unknown,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Number | ColumnType::Integer)
    }

    /// Best guess of the column type from a single cell value
    fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Number),
            Value::String(_) => Some(ColumnType::String),
            Value::Array(_) | Value::Object(_) => Some(ColumnType::Unknown),
        }
    }
}

/// Reference from a column to the table it points into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    /// Referenced table (also the key into `PagedResult::foreign_key_data`)
    pub table: String,
    /// Key column in the referenced table
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

fn default_key_column() -> String {
    "id".to_string()
}

/// Metadata describing a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnSchema {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            title: None,
            foreign_key: None,
        }
    }
}

/// Schema of a table: `{"properties": {"name": {"type": "string"}}}`
///
/// Properties are kept in key order, so "first column" always means the
/// alphabetically first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, ColumnSchema>,
}

impl TableSchema {
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            properties: columns
                .into_iter()
                .map(|(name, ty)| (name.into(), ColumnSchema::new(ty)))
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.properties.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.column(name)
            .map(|c| c.column_type.is_numeric())
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Derive a schema from row objects.
    ///
    /// A column takes the type of its first non-null cell; integer and float
    /// cells in the same column widen to `Number`, other conflicts become
    /// `Unknown`. Columns that are null everywhere are typed `String`.
    pub fn infer(rows: &[Value]) -> Self {
        let mut properties: BTreeMap<String, Option<ColumnType>> = BTreeMap::new();
        for row in rows {
            let Some(obj) = row.as_object() else { continue };
            for (name, cell) in obj {
                let seen = properties.entry(name.clone()).or_insert(None);
                let Some(ty) = ColumnType::of_value(cell) else { continue };
                *seen = Some(match *seen {
                    None => ty,
                    Some(prev) if prev == ty => prev,
                    Some(prev) if prev.is_numeric() && ty.is_numeric() => ColumnType::Number,
                    Some(_) => ColumnType::Unknown,
                });
            }
        }
        Self {
            properties: properties
                .into_iter()
                .map(|(name, ty)| (name, ColumnSchema::new(ty.unwrap_or(ColumnType::String))))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_json_shape() {
        let schema: TableSchema =
            serde_json::from_value(json!({"properties": {"name": {"type": "string"}}})).unwrap();
        assert_eq!(
            schema.column("name").map(|c| c.column_type),
            Some(ColumnType::String)
        );
        let unknown: TableSchema =
            serde_json::from_value(json!({"properties": {"blob": {"type": "binary"}}})).unwrap();
        assert_eq!(unknown.properties["blob"].column_type, ColumnType::Unknown);
    }

    #[test]
    fn test_infer_widens_numbers() {
        let rows = vec![
            json!({"name": "a", "qty": 1, "note": null}),
            json!({"name": "b", "qty": 2.5, "active": true}),
        ];
        let schema = TableSchema::infer(&rows);
        assert_eq!(schema.properties["name"].column_type, ColumnType::String);
        assert_eq!(schema.properties["qty"].column_type, ColumnType::Number);
        assert_eq!(schema.properties["active"].column_type, ColumnType::Boolean);
        assert_eq!(schema.properties["note"].column_type, ColumnType::String);
        assert!(schema.is_numeric("qty"));
        assert!(!schema.is_numeric("name"));
    }
}
