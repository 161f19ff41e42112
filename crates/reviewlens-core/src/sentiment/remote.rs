use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{BatchPredictions, InferenceError, Prediction, SentimentClassifier};

/// Client for an out-of-process text-classification service.
///
/// Sends `{"inputs": [..]}` and expects one element per input, either `{"label", "score"}` or a
/// list of those (the highest score wins).
pub struct RemoteClassifier {
    http: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseItem {
    Single(LabelScore),
    Ranked(Vec<LabelScore>),
}

impl ResponseItem {
    fn into_prediction(self) -> Result<Prediction, InferenceError> {
        let best = match self {
            ResponseItem::Single(candidate) => candidate,
            ResponseItem::Ranked(candidates) => candidates
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .ok_or_else(|| InferenceError::InvalidResponse("empty candidate list".into()))?,
        };
        Prediction::new(best.label.parse()?, best.score)
    }
}

impl RemoteClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SentimentClassifier for RemoteClassifier {
    fn name(&self) -> &str {
        "remote"
    }

    async fn classify(&self, text: &str) -> Result<Prediction, InferenceError> {
        let mut predictions = self.classify_batch(&[text.to_string()]).await?;
        predictions.pop().unwrap_or_else(|| {
            Err(InferenceError::BatchSize {
                expected: 1,
                returned: 0,
            })
        })
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<BatchPredictions, InferenceError> {
        debug!(url = %self.url, batch = texts.len(), "Sending inference batch");

        let response = self
            .http
            .post(&self.url)
            .json(&InferenceRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let items: Vec<Value> = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        if items.len() != texts.len() {
            return Err(InferenceError::BatchSize {
                expected: texts.len(),
                returned: items.len(),
            });
        }

        Ok(items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<ResponseItem>(item)
                    .map_err(|e| InferenceError::InvalidResponse(e.to_string()))
                    .and_then(ResponseItem::into_prediction)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sentiment::SentimentLabel;

    #[test]
    fn ranked_candidates_pick_highest_score() {
        let item: ResponseItem = serde_json::from_value(json!([
            {"label": "NEGATIVE", "score": 0.12},
            {"label": "POSITIVE", "score": 0.88}
        ]))
        .unwrap();
        let prediction = item.into_prediction().unwrap();
        assert_eq!(prediction.label(), SentimentLabel::Positive);
        assert_eq!(prediction.confidence(), 0.88);
    }

    #[test]
    fn unknown_label_is_an_inference_error() {
        let item: ResponseItem =
            serde_json::from_value(json!({"label": "NEUTRAL", "score": 0.7})).unwrap();
        assert!(matches!(
            item.into_prediction(),
            Err(InferenceError::UnknownLabel(_))
        ));
    }
}
