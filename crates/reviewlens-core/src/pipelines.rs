use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reviewlens_parser::SkippedLine;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::CatalogClient;
use crate::config::{ConfigError, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::extract::extract;
use crate::outputs::{write_csv_atomic, OutputArtifact};
use crate::publish::{GitPublisher, PublishOutcome, Publisher};
use crate::sentiment::{build_classifier, SentimentClassifier};
use crate::transform::{transform, TransformSettings, TransformSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Transform,
    Load,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub reviews: usize,
    pub products: usize,
    pub skipped_lines: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishStatus {
    /// No publisher configured.
    Disabled,
    /// An earlier stage failed.
    NotRun,
    NothingToPublish,
    Published { commit: String, committed: bool },
    Failed,
}

impl From<PublishOutcome> for PublishStatus {
    fn from(outcome: PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::NothingToPublish => PublishStatus::NothingToPublish,
            PublishOutcome::Published { commit, committed } => {
                PublishStatus::Published { commit, committed }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub failed_stage: Option<Stage>,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub extraction: Option<ExtractionSummary>,
    pub transform: Option<TransformSummary>,
    pub output: Option<OutputArtifact>,
    pub publish: PublishStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn started(publish: PublishStatus) -> Self {
        let now = Utc::now();
        Self {
            status: RunStatus::Success,
            failed_stage: None,
            error_kind: None,
            error: None,
            extraction: None,
            transform: None,
            output: None,
            publish,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    fn fail(&mut self, stage: Stage, err: &PipelineError) {
        self.status = RunStatus::Failed;
        self.failed_stage = Some(stage);
        self.error_kind = Some(err.kind());
        self.error = Some(err.to_string());
        if stage == Stage::Publish {
            self.publish = PublishStatus::Failed;
        } else if self.publish != PublishStatus::Disabled {
            self.publish = PublishStatus::NotRun;
        }
    }
}

type StageResult<T> = std::result::Result<T, (Stage, PipelineError)>;

fn at<T>(stage: Stage, result: Result<T>) -> StageResult<T> {
    result.map_err(|err| (stage, err))
}

/// Extract, transform, load and publish, strictly in that order.
///
/// A failure in any stage stops the run before the next one starts. The only state a run leaves
/// behind is the output artifact, replaced atomically in the load stage, and the remote branch
/// updated by the publisher.
pub struct Pipeline {
    config: PipelineConfig,
    classifier: Arc<dyn SentimentClassifier>,
    publisher: Option<Box<dyn Publisher>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, classifier: Arc<dyn SentimentClassifier>) -> Self {
        Self {
            config,
            classifier,
            publisher: None,
        }
    }

    /// Builds the classifier and, when `[publish]` is configured, a git publisher.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = build_classifier(&config.transform.classifier)?;
        let publisher = config
            .publish
            .clone()
            .map(|publish| Box::new(GitPublisher::new(publish)) as Box<dyn Publisher>);
        Ok(Self {
            config,
            classifier,
            publisher,
        })
    }

    pub fn with_publisher(mut self, publisher: Box<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn without_publisher(mut self) -> Self {
        self.publisher = None;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> RunReport {
        let publish = match self.publisher {
            Some(_) => PublishStatus::NotRun,
            None => PublishStatus::Disabled,
        };
        let mut report = RunReport::started(publish);
        info!(
            reviews = %self.config.extract.reviews_path.display(),
            products = %self.config.extract.products.url,
            output = %self.config.output.path.display(),
            classifier = self.classifier.name(),
            "Starting pipeline run"
        );

        match self.execute(&mut report).await {
            Ok(()) => {
                info!(
                    rows = report.output.as_ref().map(|o| o.rows),
                    "Pipeline run succeeded"
                );
            }
            Err((stage, err)) => {
                error!(stage = %stage, kind = err.kind(), error = %err, "Pipeline run failed");
                report.fail(stage, &err);
            }
        }

        report.finished_at = Utc::now();
        report
    }

    async fn execute(&self, report: &mut RunReport) -> StageResult<()> {
        at(Stage::Extract, self.config.validate().map_err(Into::into))?;

        let catalog = at(
            Stage::Extract,
            CatalogClient::from_config(&self.config.extract.products),
        )?;
        let extracted = at(Stage::Extract, extract(&self.config.extract, &catalog).await)?;
        report.extraction = Some(ExtractionSummary {
            reviews: extracted.reviews.height(),
            products: extracted.products.height(),
            skipped_lines: extracted.skipped_lines.len(),
            skipped: extracted.skipped_lines.clone(),
        });

        let settings = TransformSettings::from(&self.config.transform);
        let transformed = at(
            Stage::Transform,
            transform(
                &extracted.reviews,
                &extracted.products,
                &settings,
                self.classifier.as_ref(),
            )
            .await,
        )?;
        if transformed.summary.inference_failures > 0 {
            warn!(
                failures = transformed.summary.inference_failures,
                "Some reviews could not be scored"
            );
        }
        report.transform = Some(transformed.summary);

        let artifact = at(
            Stage::Load,
            write_csv_atomic(&transformed.frame, &self.config.output.path),
        )?;
        report.output = Some(artifact);

        if let Some(publisher) = &self.publisher {
            let directory = self.config.publish_directory().ok_or_else(|| {
                let err = ConfigError::Invalid(
                    "publishing needs publish.directory or an output.path inside a directory"
                        .into(),
                );
                (Stage::Publish, PipelineError::from(err))
            })?;
            let outcome = publisher
                .publish(&directory)
                .await
                .map_err(|err| (Stage::Publish, PipelineError::from(err)))?;
            report.publish = outcome.into();
        }

        Ok(())
    }
}
