use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{InferenceError, Prediction, SentimentClassifier, SentimentLabel};

/// Tokens that flip the polarity of an opinion word within the next two tokens.
const NEGATORS: [&str; 10] = [
    "not", "no", "never", "isn't", "wasn't", "don't", "doesn't", "didn't", "won't", "hardly",
];
const NEGATION_WINDOW: usize = 2;

static POSITIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "amazing", "awesome", "beautiful", "best", "comfortable", "comfy", "cute", "durable",
        "easy", "elegant", "excellent", "fantastic", "fast", "favorite", "fine", "fits",
        "flawless", "glad", "good", "gorgeous", "great", "happy", "helpful", "impressed",
        "impressive", "love", "loved", "lovely", "loves", "nice", "perfect", "perfectly",
        "pleased", "quality", "recommend", "recommended", "reliable", "satisfied", "soft",
        "solid", "stylish", "sturdy", "superb", "warm", "wonderful", "worth", "worthy",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "awful", "bad", "broke", "broken", "cheap", "cheaply", "complaint", "damaged",
        "defective", "disappointed", "disappointing", "faded", "fake", "flimsy", "hate",
        "hated", "horrible", "itchy", "junk", "late", "leaked", "missing", "poor", "poorly",
        "refund", "return", "returned", "ripped", "rough", "scratched", "shrank", "slow",
        "small", "terrible", "tight", "torn", "uncomfortable", "useless", "waste", "worse",
        "worst", "wrong",
    ]
    .into_iter()
    .collect()
});

/// Deterministic opinion-lexicon classifier.
///
/// Confidence is the Laplace-smoothed share of the winning polarity, so it stays in `[0.5, 1)`
/// and grows with the number of agreeing opinion words. Ties resolve to `POSITIVE` at 0.5.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, text: &str) -> (usize, usize) {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|token| !token.is_empty())
            .collect();

        let mut positive = 0usize;
        let mut negative = 0usize;
        for (idx, token) in tokens.iter().enumerate() {
            let is_positive = if POSITIVE_WORDS.contains(*token) {
                true
            } else if NEGATIVE_WORDS.contains(*token) {
                false
            } else {
                continue;
            };

            let negated = tokens[idx.saturating_sub(NEGATION_WINDOW)..idx]
                .iter()
                .any(|prev| NEGATORS.contains(prev));

            if is_positive != negated {
                positive += 1;
            } else {
                negative += 1;
            }
        }

        (positive, negative)
    }
}

#[async_trait]
impl SentimentClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<Prediction, InferenceError> {
        let (positive, negative) = self.score(text);
        let (label, winning) = if negative > positive {
            (SentimentLabel::Negative, negative)
        } else {
            (SentimentLabel::Positive, positive)
        };
        let confidence = (winning as f64 + 1.0) / ((positive + negative) as f64 + 2.0);
        Prediction::new(label, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn positive_review_is_positive() {
        let prediction = LexiconClassifier::new()
            .classify("Great backpack, fits my laptop perfectly and feels durable.")
            .await
            .unwrap();
        assert_eq!(prediction.label(), SentimentLabel::Positive);
        assert!(prediction.confidence() > 0.5 && prediction.confidence() < 1.0);
    }

    #[tokio::test]
    async fn negation_flips_polarity() {
        let classifier = LexiconClassifier::new();
        assert_eq!(classifier.score("not worth the money"), (0, 1));

        let prediction = classifier
            .classify("Not worth the money, the fabric is cheap.")
            .await
            .unwrap();
        assert_eq!(prediction.label(), SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn text_without_opinion_words_is_a_coin_flip() {
        let prediction = LexiconClassifier::new()
            .classify("Arrived on Tuesday.")
            .await
            .unwrap();
        assert_eq!(prediction.label(), SentimentLabel::Positive);
        assert_eq!(prediction.confidence(), 0.5);
    }
}
