use std::collections::HashMap;

use polars::prelude::*;
use serde_json::Value;

use crate::errors::ParserError;
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Empty,
    Boolean,
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    fn observe(self, value: &Value) -> Self {
        let seen = match value {
            Value::Null => return self,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Number(number) if number.is_i64() => ColumnKind::Integer,
            Value::Number(_) => ColumnKind::Float,
            Value::String(_) | Value::Array(_) | Value::Object(_) => ColumnKind::Text,
        };

        match (self, seen) {
            (ColumnKind::Empty, kind) => kind,
            (current, kind) if current == kind => current,
            (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        }
    }
}

/// Builds a table from flattened records.
///
/// Columns are the union of all record keys in first-seen order. A key absent from a record is
/// null in that row. Integer-only columns become `Int64`, numeric columns mixing integers and
/// floats become `Float64`, boolean columns `Boolean`, and everything else `String` (non-string
/// JSON values keep their JSON text). Columns holding nothing but nulls are typed `String`.
pub fn records_to_frame(records: &[Record]) -> Result<DataFrame, ParserError> {
    let mut order: Vec<&str> = Vec::new();
    let mut kinds: HashMap<&str, ColumnKind> = HashMap::new();

    for record in records {
        for (name, value) in record.fields() {
            let kind = kinds.entry(name).or_insert_with(|| {
                order.push(name);
                ColumnKind::Empty
            });
            *kind = kind.observe(value);
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(order.len());
    for name in order {
        let kind = kinds.get(name).copied().unwrap_or(ColumnKind::Empty);
        columns.push(build_column(name, kind, records).into());
    }

    Ok(DataFrame::new(columns)?)
}

fn build_column(name: &str, kind: ColumnKind, records: &[Record]) -> Series {
    let values = records.iter().map(|record| record.get(name));

    match kind {
        ColumnKind::Integer => Series::new(
            name.into(),
            values
                .map(|value| value.and_then(Value::as_i64))
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Float => Series::new(
            name.into(),
            values
                .map(|value| value.and_then(Value::as_f64))
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Boolean => Series::new(
            name.into(),
            values
                .map(|value| value.and_then(Value::as_bool))
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Text => Series::new(
            name.into(),
            values
                .map(|value| value.and_then(value_to_string))
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Empty => {
            Series::full_null(name.into(), records.len(), &DataType::String)
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
