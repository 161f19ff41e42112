use serde_json::Value;

use crate::errors::ParserError;
use crate::model::{MalformedLinePolicy, Record, ReviewBatch, SkippedLine};

/// Parses newline-delimited review objects.
///
/// Blank lines are ignored. A line that is not UTF-8 or not a JSON object is either recorded in
/// [`ReviewBatch::skipped`] or aborts the batch, depending on `policy`.
pub fn parse_review_lines(
    content: impl AsRef<[u8]>,
    policy: MalformedLinePolicy,
) -> Result<ReviewBatch, ParserError> {
    let mut batch = ReviewBatch::default();

    for (idx, raw_line) in content.as_ref().split(|byte| *byte == b'\n').enumerate() {
        let line_number = idx + 1;
        let line = match std::str::from_utf8(raw_line) {
            Ok(line) => line.trim(),
            Err(err) => {
                let message = format!("line is not valid UTF-8: {err}");
                match policy {
                    MalformedLinePolicy::Skip => {
                        batch.skipped.push(SkippedLine {
                            line_number,
                            message,
                        });
                        continue;
                    }
                    MalformedLinePolicy::Abort => {
                        return Err(ParserError::MalformedLine {
                            line_number,
                            message,
                        })
                    }
                }
            }
        };
        if line.is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => Ok(Record::from_object(object)),
            Ok(other) => Err(format!("expected a JSON object, found {}", kind_name(&other))),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(record) => batch.records.push(record),
            Err(message) => match policy {
                MalformedLinePolicy::Skip => batch.skipped.push(SkippedLine {
                    line_number,
                    message,
                }),
                MalformedLinePolicy::Abort => {
                    return Err(ParserError::MalformedLine {
                        line_number,
                        message,
                    })
                }
            },
        }
    }

    Ok(batch)
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
