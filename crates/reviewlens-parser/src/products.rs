use serde_json::Value;

use crate::errors::ParserError;
use crate::jsonl::kind_name;
use crate::model::Record;

/// Parses a product catalog payload: a JSON array whose elements are all objects.
pub fn parse_product_array(body: &str) -> Result<Vec<Record>, ParserError> {
    let value: Value = serde_json::from_str(body).map_err(|err| ParserError::NotAnArray {
        message: err.to_string(),
    })?;

    let Value::Array(items) = value else {
        return Err(ParserError::NotAnArray {
            message: format!("found {}", kind_name(&value)),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(object) => Ok(Record::from_object(object)),
            _ => Err(ParserError::NotAnObject { index }),
        })
        .collect()
}
