//! In-memory querying of a local table snapshot

use dashkit_types::{ColumnSearch, OrderClause, PagedResult, RequestParameters, SortDirection};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Text form of a cell used for searching and distinct values
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_matches_search(row: &Value, needle: &str) -> bool {
    match row {
        Value::Object(obj) => obj
            .values()
            .any(|cell| cell_text(cell).to_lowercase().contains(needle)),
        other => cell_text(other).to_lowercase().contains(needle),
    }
}

fn row_matches_columns(row: &Value, searches: &[ColumnSearch]) -> bool {
    searches.iter().all(|search| {
        let needle = search.value.to_lowercase();
        row.get(&search.column)
            .map(|cell| cell_text(cell).to_lowercase().contains(&needle))
            .unwrap_or(false)
    })
}

// Nulls first, then booleans, numbers, strings, anything else
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON cells
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if type_rank(a) == type_rank(b) => cell_text(a).cmp(&cell_text(b)),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_rows(a: &Value, b: &Value, order_by: &[OrderClause]) -> Ordering {
    for clause in order_by {
        let left = a.get(&clause.column).unwrap_or(&Value::Null);
        let right = b.get(&clause.column).unwrap_or(&Value::Null);
        let ordering = match clause.direction {
            SortDirection::Asc => compare_cells(left, right),
            SortDirection::Desc => compare_cells(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn project(row: Value, columns: &[String]) -> Value {
    match row {
        Value::Object(mut obj) => {
            let mut projected = Map::new();
            for column in columns {
                if let Some(cell) = obj.remove(column) {
                    projected.insert(column.clone(), cell);
                }
            }
            Value::Object(projected)
        }
        other => other,
    }
}

/// Filter, sort, page and project snapshot rows.
///
/// `total` counts the rows that passed the filters, before paging.
/// Pages are 1-based; a page size of 0 returns every row.
pub fn query_rows(rows: &[Value], params: &RequestParameters, columns: Option<&[String]>) -> PagedResult {
    let needle = params
        .global_search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matched: Vec<&Value> = rows
        .iter()
        .filter(|row| needle.as_deref().map_or(true, |n| row_matches_search(row, n)))
        .filter(|row| row_matches_columns(row, &params.column_searches))
        .collect();

    if !params.order_by.is_empty() {
        // Stable, so ties keep snapshot order
        matched.sort_by(|a, b| compare_rows(a, b, &params.order_by));
    }

    let total = matched.len() as u64;
    let page: Vec<&Value> = if params.page_size == 0 {
        matched
    } else {
        let size = params.page_size as usize;
        let start = (params.page_number.max(1) as usize - 1).saturating_mul(size);
        matched.into_iter().skip(start).take(size).collect()
    };

    let items = page
        .into_iter()
        .cloned()
        .map(|row| match columns {
            Some(columns) => project(row, columns),
            None => row,
        })
        .collect();

    PagedResult::new(items, total)
}

/// Distinct non-empty text values of one column, sorted
pub fn distinct_values(rows: &[Value], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .map(cell_text)
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
