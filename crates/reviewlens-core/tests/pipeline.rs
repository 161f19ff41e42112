mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{fixture, fixture_path, ProductServer};
use reviewlens_core::config::PipelineConfig;
use reviewlens_core::insights::load_dataset;
use reviewlens_core::pipelines::{Pipeline, PublishStatus, RunStatus, Stage};
use reviewlens_core::publish::{PublishError, PublishOutcome, Publisher};
use reviewlens_core::sentiment::LexiconClassifier;
use reviewlens_core::MalformedLinePolicy;

fn config(products_url: &str, output: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.extract.reviews_path = fixture_path("reviews_sample.jsonl");
    config.extract.products.url = products_url.to_string();
    config.extract.products.timeout_secs = 5;
    config.output.path = output.to_path_buf();
    config
}

fn pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(config, Arc::new(LexiconClassifier::new()))
}

fn output_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("processed").join("reviews_products_with_sentiment.csv")
}

/// Reports a fixed outcome after the first call.
struct FakePublisher {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, local_dir: &Path) -> Result<PublishOutcome, PublishError> {
        assert!(local_dir.is_dir());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PublishError::Git {
                step: "push",
                code: Some(128),
                stderr: "fatal: Authentication failed".into(),
            });
        }
        Ok(if call == 0 {
            PublishOutcome::Published {
                commit: "abc123".into(),
                committed: true,
            }
        } else {
            PublishOutcome::NothingToPublish
        })
    }
}

#[tokio::test]
async fn lenient_run_writes_one_row_per_valid_review() {
    let server = ProductServer::healthy().await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);

    let report = pipeline(config(&server.url, &output)).run().await;

    assert_eq!(report.status, RunStatus::Success, "{:?}", report.error);
    assert_eq!(report.publish, PublishStatus::Disabled);
    let extraction = report.extraction.as_ref().unwrap();
    assert_eq!(extraction.reviews, 9);
    assert_eq!(extraction.products, 4);
    assert_eq!(extraction.skipped_lines, 1);

    let summary = report.transform.as_ref().unwrap();
    assert_eq!(summary.rows, 9);
    assert_eq!(summary.unmatched_products, 1);
    assert_eq!(summary.empty_text, 1);
    assert_eq!(summary.scored, 8);

    let dataset = load_dataset(&output).unwrap();
    assert_eq!(dataset.height(), 9);
    assert_eq!(report.output.as_ref().unwrap().rows, 9);

    let sentiment = dataset.column("sentiment").unwrap().str().unwrap();
    for label in sentiment.into_iter().flatten() {
        assert!(label == "POSITIVE" || label == "NEGATIVE", "{label}");
    }
    let confidence = dataset.column("confidence").unwrap().f64().unwrap();
    for value in confidence.into_iter().flatten() {
        assert!((0.0..=1.0).contains(&value));
    }

    // R006 references product 99, which the catalog does not have
    let review_ids = dataset.column("review_id").unwrap().str().unwrap();
    let category = dataset.column("category").unwrap().str().unwrap();
    let row = review_ids
        .into_iter()
        .position(|id| id == Some("R006"))
        .unwrap();
    assert_eq!(category.get(row), None);
    assert_eq!(category.get(0), Some("men's clothing"));
}

#[tokio::test]
async fn strict_run_fails_before_writing() {
    let server = ProductServer::healthy().await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let mut config = config(&server.url, &output);
    config.extract.malformed_lines = MalformedLinePolicy::Abort;

    let report = pipeline(config).run().await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(Stage::Extract));
    assert_eq!(report.error_kind, Some("MalformedRecordError"));
    assert!(report.transform.is_none());
    assert!(!output.exists());
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn missing_source_stops_the_run() {
    let server = ProductServer::healthy().await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let mut config = config(&server.url, &output);
    config.extract.reviews_path = dir.path().join("nope.jsonl");
    let calls = Arc::new(AtomicUsize::new(0));

    let report = pipeline(config)
        .with_publisher(Box::new(FakePublisher {
            calls: calls.clone(),
            fail: false,
        }))
        .run()
        .await;

    assert_eq!(report.error_kind, Some("SourceNotFoundError"));
    assert_eq!(report.publish, PublishStatus::NotRun);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn upstream_failure_keeps_previous_artifact() {
    let server = ProductServer::start(
        fixture("products_sample.json"),
        usize::MAX,
        StatusCode::SERVICE_UNAVAILABLE,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, "previous,run\n1,2\n").unwrap();

    let report = pipeline(config(&server.url, &output)).run().await;

    assert_eq!(report.failed_stage, Some(Stage::Extract));
    assert_eq!(report.error_kind, Some("UpstreamUnavailableError"));
    assert!(report.output.is_none());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous,run\n1,2\n");
}

#[tokio::test]
async fn rerun_is_byte_identical_and_publishes_nothing() {
    let server = ProductServer::healthy().await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(config(&server.url, &output)).with_publisher(Box::new(FakePublisher {
        calls: calls.clone(),
        fail: false,
    }));

    let first = pipeline.run().await;
    let first_bytes = std::fs::read(&output).unwrap();
    let second = pipeline.run().await;
    let second_bytes = std::fs::read(&output).unwrap();

    assert!(first.is_success() && second.is_success());
    assert_eq!(first_bytes, second_bytes);
    assert!(first.output.as_ref().unwrap().changed);
    assert!(!second.output.as_ref().unwrap().changed);
    assert_eq!(
        first.output.as_ref().unwrap().blake3,
        second.output.as_ref().unwrap().blake3
    );
    assert!(matches!(first.publish, PublishStatus::Published { .. }));
    assert_eq!(second.publish, PublishStatus::NothingToPublish);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn publish_failure_keeps_written_artifact() {
    let server = ProductServer::healthy().await;
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);

    let report = pipeline(config(&server.url, &output))
        .with_publisher(Box::new(FakePublisher {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }))
        .run()
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(Stage::Publish));
    assert_eq!(report.error_kind, Some("PublishError"));
    assert_eq!(report.publish, PublishStatus::Failed);
    assert_eq!(report.output.as_ref().unwrap().rows, 9);
    assert_eq!(load_dataset(&output).unwrap().height(), 9);
}

#[tokio::test]
async fn report_serializes_stage_and_kind() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let mut config = config("http://127.0.0.1:9/products", &output);
    config.extract.reviews_path = dir.path().join("missing.jsonl");

    let report = pipeline(config).run().await;
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["status"], "failed");
    assert_eq!(value["failed_stage"], "extract");
    assert_eq!(value["error_kind"], "SourceNotFoundError");
    assert_eq!(value["publish"]["status"], "disabled");
}
