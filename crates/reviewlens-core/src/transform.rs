use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TransformConfig;
use crate::error::{PipelineError, Result};
use crate::inference::{score_texts, InferenceFailure, InferenceOptions};
use crate::join::{left_join_products, JoinKeys, INFERENCE_COLUMNS};
use crate::sentiment::SentimentClassifier;

#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub review_key: String,
    pub product_key: String,
    pub text_column: String,
    pub inference: InferenceOptions,
}

impl From<&TransformConfig> for TransformSettings {
    fn from(config: &TransformConfig) -> Self {
        Self {
            review_key: config.review_key.clone(),
            product_key: config.product_key.clone(),
            text_column: config.text_column.clone(),
            inference: InferenceOptions {
                batch_size: config.batch_size,
                concurrency: config.concurrency,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformSummary {
    pub rows: usize,
    pub matched_products: usize,
    pub unmatched_products: usize,
    pub duplicate_product_keys: usize,
    pub scored: usize,
    pub empty_text: usize,
    pub inference_failures: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<InferenceFailure>,
    pub sentiment_counts: BTreeMap<&'static str, usize>,
}

#[derive(Debug)]
pub struct TransformOutput {
    pub frame: DataFrame,
    pub summary: TransformSummary,
}

/// Joins products onto reviews and appends `sentiment` and `confidence`.
///
/// The output has exactly one row per review, in review order. Columns named `sentiment` or
/// `confidence` in the review source are replaced by the inference output.
pub async fn transform(
    reviews: &DataFrame,
    products: &DataFrame,
    settings: &TransformSettings,
    classifier: &dyn SentimentClassifier,
) -> Result<TransformOutput> {
    let joined = left_join_products(
        reviews,
        products,
        JoinKeys {
            review_key: &settings.review_key,
            product_key: &settings.product_key,
        },
    )?;
    let mut frame = joined.frame;

    let text_column = if frame.height() == 0 {
        None
    } else {
        let column = frame.column(&settings.text_column).map_err(|_| {
            PipelineError::Schema(format!(
                "reviews table has no text column '{}'",
                settings.text_column
            ))
        })?;
        Some(column.cast(&DataType::String)?)
    };
    let texts: Vec<Option<&str>> = match &text_column {
        Some(column) => column.str()?.into_iter().collect(),
        None => Vec::new(),
    };

    let scores = score_texts(classifier, &texts, settings.inference).await;

    for name in INFERENCE_COLUMNS {
        if frame.column(name).is_ok() {
            warn!(column = name, "Replacing source column with inference output");
            frame = frame.drop(name)?;
        }
    }

    let labels: Vec<Option<&str>> = scores
        .labels
        .iter()
        .map(|label| label.map(|label| label.as_str()))
        .collect();
    frame.with_column(Series::new("sentiment".into(), labels))?;
    frame.with_column(Series::new("confidence".into(), scores.confidences.clone()))?;

    if frame.height() != reviews.height() {
        return Err(PipelineError::Schema(format!(
            "combined table has {} rows but {} reviews were extracted",
            frame.height(),
            reviews.height()
        )));
    }

    let mut sentiment_counts = BTreeMap::new();
    for label in scores.labels.iter().flatten() {
        *sentiment_counts.entry(label.as_str()).or_insert(0) += 1;
    }

    let summary = TransformSummary {
        rows: frame.height(),
        matched_products: joined.matched,
        unmatched_products: joined.unmatched,
        duplicate_product_keys: joined.duplicate_product_keys,
        scored: scores.scored(),
        empty_text: scores.empty_text,
        inference_failures: scores.failures.len(),
        failures: scores.failures,
        sentiment_counts,
    };

    info!(
        rows = summary.rows,
        matched = summary.matched_products,
        unmatched = summary.unmatched_products,
        scored = summary.scored,
        empty_text = summary.empty_text,
        inference_failures = summary.inference_failures,
        "Transformed reviews"
    );

    Ok(TransformOutput { frame, summary })
}
