//! Sentiment classification seam.
//!
//! The model behind a classifier is opaque: anything that maps a text to one of the fixed
//! [`SentimentLabel`]s plus a confidence in `[0, 1]` can be plugged into the pipeline.

mod lexicon;
mod remote;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifierConfig;

pub use lexicon::LexiconClassifier;
pub use remote::RemoteClassifier;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("classifier returned confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("classifier returned unknown label '{0}'")]
    UnknownLabel(String),
    #[error("inference request failed: {0}")]
    Transport(String),
    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response invalid: {0}")]
    InvalidResponse(String),
    #[error("classifier returned {returned} predictions for {expected} inputs")]
    BatchSize { expected: usize, returned: usize },
    #[error("classifier configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 2] = [SentimentLabel::Positive, SentimentLabel::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = InferenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "label_1" => Ok(SentimentLabel::Positive),
            "negative" | "neg" | "label_0" => Ok(SentimentLabel::Negative),
            _ => Err(InferenceError::UnknownLabel(value.to_string())),
        }
    }
}

/// A validated classifier output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    label: SentimentLabel,
    confidence: f64,
}

impl Prediction {
    pub fn new(label: SentimentLabel, confidence: f64) -> Result<Self, InferenceError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(InferenceError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self { label, confidence })
    }

    pub fn label(&self) -> SentimentLabel {
        self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

pub type BatchPredictions = Vec<Result<Prediction, InferenceError>>;

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Prediction, InferenceError>;

    /// Classifies several texts at once. An `Err` means the whole batch failed; otherwise the
    /// result holds one entry per input, in input order.
    async fn classify_batch(&self, texts: &[String]) -> Result<BatchPredictions, InferenceError> {
        let mut predictions = Vec::with_capacity(texts.len());
        for text in texts {
            predictions.push(self.classify(text).await);
        }
        Ok(predictions)
    }
}

pub fn build_classifier(
    config: &ClassifierConfig,
) -> Result<Arc<dyn SentimentClassifier>, InferenceError> {
    match config {
        ClassifierConfig::Lexicon => Ok(Arc::new(LexiconClassifier::new())),
        ClassifierConfig::Remote { url, timeout_secs } => Ok(Arc::new(RemoteClassifier::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )?)),
    }
}
