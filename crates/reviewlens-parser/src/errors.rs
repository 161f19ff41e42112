use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("line {line_number} is not a valid review record: {message}")]
    MalformedLine { line_number: usize, message: String },

    #[error("product payload is not a JSON array: {message}")]
    NotAnArray { message: String },

    #[error("product payload element {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}
