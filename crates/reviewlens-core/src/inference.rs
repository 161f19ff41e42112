use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::sentiment::{InferenceError, SentimentClassifier, SentimentLabel};

#[derive(Debug, Clone, Copy)]
pub struct InferenceOptions {
    pub batch_size: usize,
    /// Maximum number of batches in flight at once.
    pub concurrency: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceFailure {
    pub row: usize,
    pub message: String,
}

/// Per-row inference results aligned with the input texts.
#[derive(Debug, Default)]
pub struct Scores {
    pub labels: Vec<Option<SentimentLabel>>,
    pub confidences: Vec<Option<f64>>,
    pub empty_text: usize,
    pub failures: Vec<InferenceFailure>,
}

impl Scores {
    pub fn scored(&self) -> usize {
        self.labels.iter().filter(|label| label.is_some()).count()
    }
}

/// Runs the classifier over every non-blank text.
///
/// Null or blank texts are never sent and stay unscored. Texts are grouped into batches of
/// `batch_size`; up to `concurrency` batches run at once but results are consumed in input
/// order, so the output is identical to classifying row by row. A failed record, or every
/// record of a failed batch, stays unscored and is reported in [`Scores::failures`].
pub async fn score_texts(
    classifier: &dyn SentimentClassifier,
    texts: &[Option<&str>],
    options: InferenceOptions,
) -> Scores {
    let rows = texts.len();
    let mut scores = Scores {
        labels: vec![None; rows],
        confidences: vec![None; rows],
        empty_text: 0,
        failures: Vec::new(),
    };

    let pending: Vec<(usize, String)> = texts
        .iter()
        .enumerate()
        .filter_map(|(row, text)| match text {
            Some(text) if !text.trim().is_empty() => Some((row, text.to_string())),
            _ => None,
        })
        .collect();
    scores.empty_text = rows - pending.len();

    let batches: Vec<(Vec<usize>, Vec<String>)> = pending
        .chunks(options.batch_size.max(1))
        .map(|chunk| chunk.iter().cloned().unzip())
        .collect();
    debug!(
        classifier = classifier.name(),
        texts = pending.len(),
        batches = batches.len(),
        "Scoring review texts"
    );

    let outcomes: Vec<_> = stream::iter(batches)
        .map(|(batch_rows, inputs)| async move {
            let outcome = classifier.classify_batch(&inputs).await;
            (batch_rows, outcome)
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    for (batch_rows, outcome) in outcomes {
        let predictions = match outcome {
            Ok(predictions) if predictions.len() == batch_rows.len() => predictions,
            Ok(predictions) => {
                let err = InferenceError::BatchSize {
                    expected: batch_rows.len(),
                    returned: predictions.len(),
                };
                record_batch_failure(&mut scores, &batch_rows, &err);
                continue;
            }
            Err(err) => {
                record_batch_failure(&mut scores, &batch_rows, &err);
                continue;
            }
        };

        for (row, prediction) in batch_rows.into_iter().zip(predictions) {
            match prediction {
                Ok(prediction) => {
                    scores.labels[row] = Some(prediction.label());
                    scores.confidences[row] = Some(prediction.confidence());
                }
                Err(err) => scores.failures.push(InferenceFailure {
                    row,
                    message: err.to_string(),
                }),
            }
        }
    }

    if !scores.failures.is_empty() {
        warn!(
            classifier = classifier.name(),
            failures = scores.failures.len(),
            "Some reviews could not be scored"
        );
    }

    scores
}

fn record_batch_failure(scores: &mut Scores, rows: &[usize], err: &InferenceError) {
    warn!(rows = rows.len(), error = %err, "Inference batch failed");
    scores
        .failures
        .extend(rows.iter().map(|&row| InferenceFailure {
            row,
            message: err.to_string(),
        }));
}
