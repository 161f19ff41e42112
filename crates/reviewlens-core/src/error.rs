use std::path::PathBuf;

use polars::error::PolarsError;
use reviewlens_parser::ParserError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::join::JoinError;
use crate::publish::PublishError;
use crate::sentiment::InferenceError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("review source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("malformed review record at line {line_number}: {message}")]
    MalformedRecord { line_number: usize, message: String },

    #[error("product endpoint {url} unavailable after {attempts} attempt(s): {reason}")]
    UpstreamUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    /// Stable name of the error category, used in run reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceNotFound { .. } => "SourceNotFoundError",
            PipelineError::MalformedRecord { .. } => "MalformedRecordError",
            PipelineError::UpstreamUnavailable { .. } => "UpstreamUnavailableError",
            PipelineError::Join(JoinError::KeyTypeMismatch { .. }) => "JoinKeyTypeMismatchError",
            PipelineError::Join(_) | PipelineError::Schema(_) => "SchemaError",
            PipelineError::Inference(_) => "InferenceFailure",
            PipelineError::Publish(_) => "PublishError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Io { .. } => "IoError",
            PipelineError::Polars(_) => "DataFrameError",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ParserError> for PipelineError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::MalformedLine {
                line_number,
                message,
            } => PipelineError::MalformedRecord {
                line_number,
                message,
            },
            ParserError::Polars(err) => PipelineError::Polars(err),
            other => PipelineError::Schema(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
