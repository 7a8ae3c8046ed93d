//! Result normalization.
//!
//! List-typed properties come back from the graph in several shapes (null,
//! list, `;`-joined string, bare scalar). Everything downstream sees a list.

use std::sync::Arc;

use crate::model::{Row, Value};
use crate::storage::RawResult;
use crate::validator::GraphSchema;

/// Turns raw records into rows with list columns coerced to lists.
#[derive(Debug, Clone)]
pub struct RowNormalizer {
    schema: Arc<GraphSchema>,
}

impl RowNormalizer {
    pub fn new(schema: Arc<GraphSchema>) -> Self {
        Self { schema }
    }

    /// Whether `column` holds a list property. Unaliased projections such
    /// as `r.ref_sources` are matched on the property part.
    pub fn is_list_column(&self, column: &str) -> bool {
        let property = column.rsplit('.').next().unwrap_or(column);
        self.schema.is_list_property(property)
    }

    pub fn normalize(&self, raw: RawResult) -> Vec<Row> {
        let RawResult { columns, records } = raw;
        records
            .into_iter()
            .map(|record| {
                let mut values = record.into_iter();
                let mut row = Row::with_capacity(columns.len());
                for column in &columns {
                    match values.next() {
                        Some(json) => row.insert(column.as_str(), Value::from_json(json)),
                        None if self.is_list_column(column) => row.insert(column.as_str(), Value::List(Vec::new())),
                        None => {}
                    }
                }
                self.normalize_row(row)
            })
            .collect()
    }

    /// Coerce list columns in place; other columns are untouched.
    pub fn normalize_row(&self, mut row: Row) -> Row {
        for (column, value) in row.iter_mut() {
            if self.is_list_column(column) {
                let taken = std::mem::replace(value, Value::Null);
                *value = coerce_list(taken);
            }
        }
        row
    }
}

/// `null` → `[]`, list → list, string → `;`-split trimmed non-empty items,
/// any other scalar → `[scalar]`.
pub fn coerce_list(value: Value) -> Value {
    match value {
        Value::Null => Value::List(Vec::new()),
        Value::List(items) => Value::List(items),
        Value::String(s) => Value::List(
            s.split(';')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Value::from)
                .collect(),
        ),
        other => Value::List(vec![other]),
    }
}
