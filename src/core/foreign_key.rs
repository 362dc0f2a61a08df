//! Display column choice for foreign-key references

use dashkit_core::DEFAULT_DISPLAY_HINTS;
use dashkit_types::{ColumnType, ForeignKeyRef, TableSchema};
use serde_json::Value;

/// Picks which column of a referenced table to show instead of its key
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDisplayPolicy {
    /// Words looked for in column names, in priority order
    pub display_hints: Vec<String>,
}

impl ForeignKeyDisplayPolicy {
    pub fn new<I, S>(hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            display_hints: hints.into_iter().map(Into::into).collect(),
        }
    }

    /// First string column whose name contains a hint (hints in order,
    /// case-insensitive), else the first string column, else none.
    pub fn display_column(&self, schema: &TableSchema) -> Option<String> {
        let string_columns: Vec<&String> = schema
            .properties
            .iter()
            .filter(|(_, c)| c.column_type == ColumnType::String)
            .map(|(name, _)| name)
            .collect();

        for hint in &self.display_hints {
            let hint = hint.to_lowercase();
            if let Some(name) = string_columns
                .iter()
                .find(|name| name.to_lowercase().contains(&hint))
            {
                return Some((*name).clone());
            }
        }
        string_columns.first().map(|name| (*name).clone())
    }

    /// Display value for `key` among the referenced table's rows.
    /// The display column is chosen from the rows' inferred schema.
    pub fn resolve(&self, reference: &ForeignKeyRef, key: &Value, rows: &[Value]) -> Option<Value> {
        let row = rows
            .iter()
            .find(|row| row.get(&reference.key_column) == Some(key))?;
        let column = self.display_column(&TableSchema::infer(rows))?;
        row.get(&column).cloned()
    }
}

impl Default for ForeignKeyDisplayPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_HINTS.iter().copied())
    }
}
