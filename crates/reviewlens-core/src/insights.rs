//! Read side of the combined dataset: the filters and aggregates a dashboard shows.
//!
//! Every optional column (`sentiment`, `confidence`, `category`, `price`, `id`) may be missing;
//! filters on a missing column are ignored and metrics that need it come back as `None`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;

use crate::error::{PipelineError, Result};

const POSITIVE: &str = "POSITIVE";

pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(frame)
}

#[derive(Debug, Clone, Default)]
pub struct DatasetFilter {
    /// Empty keeps every label.
    pub sentiments: Vec<String>,
    /// Empty keeps every category.
    pub categories: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl DatasetFilter {
    pub fn is_empty(&self) -> bool {
        self.sentiments.is_empty()
            && self.categories.is_empty()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    pub fn apply(&self, frame: &DataFrame) -> Result<DataFrame> {
        let mut filtered = frame.clone();

        if !self.sentiments.is_empty() {
            filtered = keep_values(&filtered, "sentiment", &self.sentiments)?;
        }
        if !self.categories.is_empty() {
            filtered = keep_values(&filtered, "category", &self.categories)?;
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            if let Some(prices) = float_values(&filtered, "price")? {
                let low = self.min_price.unwrap_or(f64::NEG_INFINITY);
                let high = self.max_price.unwrap_or(f64::INFINITY);
                let mask: BooleanChunked = prices
                    .iter()
                    .map(|price| price.is_some_and(|p| p >= low && p <= high))
                    .collect();
                filtered = filtered.filter(&mask)?;
            }
        }

        Ok(filtered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInsights {
    pub reviews: usize,
    pub products: usize,
    pub positivity_pct: Option<f64>,
    /// Percentage points relative to the unfiltered dataset.
    pub positivity_delta: Option<f64>,
    pub average_confidence: Option<f64>,
    pub top_category: Option<String>,
    pub sentiment_counts: Option<BTreeMap<String, usize>>,
    pub confidence_by_sentiment: Option<BTreeMap<String, f64>>,
}

/// Aggregates `frame`, comparing positivity against `overall`.
pub fn summarize(frame: &DataFrame, overall: &DataFrame) -> Result<DatasetInsights> {
    let sentiments = string_values(frame, "sentiment")?;
    let confidences = float_values(frame, "confidence")?;

    let products = match string_values(frame, "id")? {
        Some(ids) => ids.iter().flatten().collect::<HashSet<_>>().len(),
        None => frame.height(),
    };

    let positivity_pct = sentiments
        .as_deref()
        .and_then(|labels| positivity(labels, frame.height()));
    let overall_positivity = string_values(overall, "sentiment")?
        .as_deref()
        .and_then(|labels| positivity(labels, overall.height()));
    let positivity_delta = positivity_pct
        .zip(overall_positivity)
        .map(|(slice, all)| slice - all);

    let average_confidence = confidences
        .as_deref()
        .and_then(|values| mean(values.iter().flatten().copied()));

    let top_category = string_values(frame, "category")?.and_then(|categories| {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for category in categories.into_iter().flatten() {
            *counts.entry(category).or_insert(0) += 1;
        }
        let max = counts.values().copied().max()?;
        counts
            .into_iter()
            .find(|(_, count)| *count == max)
            .map(|(category, _)| category)
    });

    let sentiment_counts = sentiments.as_deref().map(|labels| {
        let mut counts = BTreeMap::new();
        for label in labels.iter().flatten() {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    });

    let confidence_by_sentiment = match (&sentiments, &confidences) {
        (Some(labels), Some(values)) => {
            let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for (label, value) in labels.iter().zip(values) {
                if let (Some(label), Some(value)) = (label, value) {
                    groups.entry(label.clone()).or_default().push(*value);
                }
            }
            Some(
                groups
                    .into_iter()
                    .filter_map(|(label, values)| mean(values.into_iter()).map(|m| (label, m)))
                    .collect(),
            )
        }
        _ => None,
    };

    Ok(DatasetInsights {
        reviews: frame.height(),
        products,
        positivity_pct,
        positivity_delta,
        average_confidence,
        top_category,
        sentiment_counts,
        confidence_by_sentiment,
    })
}

fn positivity(labels: &[Option<String>], rows: usize) -> Option<f64> {
    if rows == 0 {
        return None;
    }
    let positive = labels
        .iter()
        .filter(|label| label.as_deref() == Some(POSITIVE))
        .count();
    Some(positive as f64 / rows as f64 * 100.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn keep_values(frame: &DataFrame, column: &str, allowed: &[String]) -> Result<DataFrame> {
    let Some(values) = string_values(frame, column)? else {
        return Ok(frame.clone());
    };
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let mask: BooleanChunked = values
        .iter()
        .map(|value| value.as_deref().is_some_and(|v| allowed.contains(v)))
        .collect();
    Ok(frame.filter(&mask)?)
}

fn string_values(frame: &DataFrame, column: &str) -> Result<Option<Vec<Option<String>>>> {
    let Ok(column) = frame.column(column) else {
        return Ok(None);
    };
    let cast = column.cast(&DataType::String)?;
    let values = cast
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(Some(values))
}

fn float_values(frame: &DataFrame, column: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(column) = frame.column(column) else {
        return Ok(None);
    };
    let cast = column.cast(&DataType::Float64)?;
    Ok(Some(cast.f64()?.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> DataFrame {
        df![
            "id" => &[Some(1i64), Some(1), Some(2), None],
            "category" => &[Some("electronics"), Some("electronics"), Some("jewelery"), None],
            "price" => &[Some(29.99f64), Some(29.99), Some(150.0), None],
            "sentiment" => &[Some("POSITIVE"), Some("NEGATIVE"), Some("POSITIVE"), None],
            "confidence" => &[Some(0.9f64), Some(0.7), Some(0.5), None],
        ]
        .unwrap()
    }

    #[test]
    fn summarizes_full_dataset() {
        let df = dataset();
        let insights = summarize(&df, &df).unwrap();

        assert_eq!(insights.reviews, 4);
        assert_eq!(insights.products, 2);
        assert_eq!(insights.positivity_pct, Some(50.0));
        assert_eq!(insights.positivity_delta, Some(0.0));
        assert!((insights.average_confidence.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(insights.top_category.as_deref(), Some("electronics"));

        let counts = insights.sentiment_counts.unwrap();
        assert_eq!(counts["POSITIVE"], 2);
        assert_eq!(counts["NEGATIVE"], 1);
        let by_label = insights.confidence_by_sentiment.unwrap();
        assert!((by_label["POSITIVE"] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn filters_compare_against_overall() {
        let df = dataset();
        let filter = DatasetFilter {
            categories: vec!["electronics".into()],
            max_price: Some(100.0),
            ..Default::default()
        };
        let slice = filter.apply(&df).unwrap();
        assert_eq!(slice.height(), 2);

        let insights = summarize(&slice, &df).unwrap();
        assert_eq!(insights.positivity_pct, Some(50.0));
        assert_eq!(insights.positivity_delta, Some(0.0));

        let negatives = DatasetFilter {
            sentiments: vec!["NEGATIVE".into()],
            ..Default::default()
        }
        .apply(&df)
        .unwrap();
        let insights = summarize(&negatives, &df).unwrap();
        assert_eq!(insights.positivity_pct, Some(0.0));
        assert_eq!(insights.positivity_delta, Some(-50.0));
    }

    #[test]
    fn missing_columns_degrade_to_none() {
        let df = df!["review_text" => &["fine", "bad"]].unwrap();
        let filter = DatasetFilter {
            sentiments: vec!["POSITIVE".into()],
            categories: vec!["electronics".into()],
            min_price: Some(10.0),
            max_price: None,
        };
        let filtered = filter.apply(&df).unwrap();
        assert_eq!(filtered.height(), 2);

        let insights = summarize(&filtered, &df).unwrap();
        assert_eq!(insights.products, 2);
        assert_eq!(insights.positivity_pct, None);
        assert_eq!(insights.positivity_delta, None);
        assert_eq!(insights.average_confidence, None);
        assert_eq!(insights.top_category, None);
        assert_eq!(insights.sentiment_counts, None);
        assert_eq!(insights.confidence_by_sentiment, None);
    }
}
