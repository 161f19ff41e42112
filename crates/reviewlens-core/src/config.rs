use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reviewlens_parser::MalformedLinePolicy;

use crate::catalog::MAX_ATTEMPTS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a pipeline run needs, passed explicitly into each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extract: ExtractConfig,
    pub transform: TransformConfig,
    pub output: OutputConfig,
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub reviews_path: PathBuf,
    pub malformed_lines: MalformedLinePolicy,
    pub products: ProductSourceConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            reviews_path: PathBuf::from("data/raw/product_reviews_sales.jsonl"),
            malformed_lines: MalformedLinePolicy::Skip,
            products: ProductSourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSourceConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for ProductSourceConfig {
    fn default() -> Self {
        Self {
            url: "https://fakestoreapi.com/products".to_string(),
            timeout_secs: 20,
            retry: RetryConfig::default(),
        }
    }
}

impl ProductSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub review_key: String,
    pub product_key: String,
    pub text_column: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub classifier: ClassifierConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            review_key: "product_id".to_string(),
            product_key: "id".to_string(),
            text_column: "review_text".to_string(),
            batch_size: 32,
            concurrency: 4,
            classifier: ClassifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Built-in opinion lexicon scorer.
    #[default]
    Lexicon,
    /// Out-of-process inference service speaking the text-classification JSON shape.
    Remote {
        url: String,
        #[serde(default = "default_classifier_timeout")]
        timeout_secs: u64,
    },
}

fn default_classifier_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/processed/reviews_products_with_sentiment.csv"),
        }
    }
}

impl OutputConfig {
    /// The artifact's parent directory, if the path names one explicitly.
    pub fn parent_directory(&self) -> Option<PathBuf> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub remote_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    /// Overrides the output file's parent directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

impl PublishConfig {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            branch: default_branch(),
            commit_message: default_commit_message(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            directory: None,
            timeout_secs: default_publish_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_commit_message() -> String {
    "Update processed review dataset".to_string()
}

fn default_author_name() -> String {
    "reviewlens".to_string()
}

fn default_author_email() -> String {
    "reviewlens@localhost".to_string()
}

fn default_publish_timeout() -> u64 {
    60
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let products = &self.extract.products;
        if products.url.trim().is_empty() {
            return Err(ConfigError::Invalid("extract.products.url is empty".into()));
        }
        if products.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "extract.products.timeout_secs must be greater than zero".into(),
            ));
        }
        if products.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "extract.products.retry.max_attempts must be at least 1".into(),
            ));
        }
        if products.retry.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "extract.products.retry.max_attempts must be at most {MAX_ATTEMPTS}"
            )));
        }
        let multiplier = products.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "extract.products.retry.backoff_multiplier must be a finite number >= 1.0".into(),
            ));
        }
        if self.transform.batch_size == 0 || self.transform.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "transform.batch_size and transform.concurrency must be at least 1".into(),
            ));
        }
        if let ClassifierConfig::Remote { url, timeout_secs } = &self.transform.classifier {
            if url.trim().is_empty() || *timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "remote classifier needs a url and a non-zero timeout".into(),
                ));
            }
        }
        if let Some(publish) = &self.publish {
            if publish.remote_url.trim().is_empty() || publish.branch.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "publish.remote_url and publish.branch must be set".into(),
                ));
            }
            if publish.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "publish.timeout_secs must be greater than zero".into(),
                ));
            }
            if publish.directory.is_none() && self.output.parent_directory().is_none() {
                return Err(ConfigError::Invalid(
                    "publishing needs publish.directory or an output.path inside a directory"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// Directory handed to the publisher: `publish.directory`, else the output's parent.
    ///
    /// Never falls back to the working directory.
    pub fn publish_directory(&self) -> Option<PathBuf> {
        self.publish
            .as_ref()
            .and_then(|publish| publish.directory.clone())
            .or_else(|| self.output.parent_directory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").expect("parse");
        assert_eq!(config.transform.review_key, "product_id");
        assert_eq!(config.transform.product_key, "id");
        assert_eq!(config.extract.malformed_lines, MalformedLinePolicy::Skip);
        assert!(config.publish.is_none());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn parses_remote_classifier_and_publish_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [extract]
            reviews_path = "input/reviews.jsonl"
            malformed_lines = "abort"

            [extract.products.retry]
            max_attempts = 3

            [transform.classifier]
            kind = "remote"
            url = "http://localhost:8080/predict"

            [output]
            path = "out/combined.csv"

            [publish]
            remote_url = "git@example.com:team/data.git"
            "#,
        )
        .expect("parse");

        assert_eq!(config.extract.malformed_lines, MalformedLinePolicy::Abort);
        assert_eq!(config.extract.products.retry.max_attempts, 3);
        assert_eq!(config.extract.products.timeout_secs, 20);
        assert!(matches!(
            config.transform.classifier,
            ClassifierConfig::Remote { timeout_secs: 30, .. }
        ));
        let publish = config.publish.as_ref().expect("publish section");
        assert_eq!(publish.branch, "main");
        assert_eq!(config.publish_directory(), Some(PathBuf::from("out")));
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = PipelineConfig::default();
        config.extract.products.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unbounded_retry_settings() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [extract.products.retry]
            max_attempts = 3
            backoff_multiplier = inf
            "#,
        )
        .expect("parse");
        assert!(config.extract.products.retry.backoff_multiplier.is_infinite());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.extract.products.retry.max_attempts = 70;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.extract.products.retry.max_attempts = MAX_ATTEMPTS;
        config.validate().expect("upper bound is allowed");
    }

    #[test]
    fn publishing_a_bare_output_file_needs_a_directory() {
        let mut config = PipelineConfig::default();
        config.output.path = PathBuf::from("combined.csv");
        config.publish = Some(PublishConfig::new("git@example.com:team/data.git"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.publish_directory(), None);

        config.publish.as_mut().unwrap().directory = Some(PathBuf::from("dist"));
        config.validate().expect("explicit directory is fine");
        assert_eq!(config.publish_directory(), Some(PathBuf::from("dist")));

        config.publish = None;
        config.validate().expect("no publishing, no directory needed");
    }

    #[test]
    fn example_config_is_valid() {
        let config =
            PipelineConfig::from_toml_str(include_str!("../../../reviewlens.example.toml"))
                .expect("parse example");
        config.validate().expect("example is valid");
        assert_eq!(config.extract.products.retry.max_attempts, 3);
        assert!(matches!(config.transform.classifier, ClassifierConfig::Lexicon));
    }
}
