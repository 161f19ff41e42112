use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What to do with a review line that is not a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Record the line as skipped and keep going.
    #[default]
    Skip,
    /// Fail the whole batch on the first bad line.
    Abort,
}

impl fmt::Display for MalformedLinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedLinePolicy::Skip => f.write_str("skip"),
            MalformedLinePolicy::Abort => f.write_str("abort"),
        }
    }
}

/// A single source object with nested objects flattened into `parent_child` keys.
///
/// Field order follows the flattened key order of the source object and is stable for a given
/// input, which keeps the derived column order deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut record = Record::default();
        for (key, value) in object {
            record.flatten_into(key, value);
        }
        record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn flatten_into(&mut self, key: String, value: Value) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (child, nested) in map {
                    self.flatten_into(format!("{key}_{child}"), nested);
                }
            }
            Value::Object(_) => self.insert(key, Value::Null),
            other => self.insert(key, other),
        }
    }

    fn insert(&mut self, key: String, value: Value) {
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number in the source file.
    pub line_number: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewBatch {
    pub records: Vec<Record>,
    pub skipped: Vec<SkippedLine>,
}
