use std::io::ErrorKind;
use std::path::Path;

use polars::prelude::DataFrame;
use reviewlens_parser::{parse_review_lines, records_to_frame, MalformedLinePolicy, SkippedLine};
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::config::ExtractConfig;
use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct ReviewFrame {
    pub frame: DataFrame,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug)]
pub struct ExtractedData {
    pub reviews: DataFrame,
    pub products: DataFrame,
    pub skipped_lines: Vec<SkippedLine>,
}

/// Reads the newline-delimited review file into a table.
pub fn load_reviews(path: &Path, policy: MalformedLinePolicy) -> Result<ReviewFrame> {
    let content = std::fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => PipelineError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::io(path, err),
    })?;

    let batch = parse_review_lines(&content, policy)?;
    for skipped in &batch.skipped {
        warn!(
            path = %path.display(),
            line = skipped.line_number,
            reason = %skipped.message,
            "Skipping malformed review line"
        );
    }

    let frame = records_to_frame(&batch.records)?;
    info!(
        path = %path.display(),
        reviews = frame.height(),
        skipped = batch.skipped.len(),
        "Loaded reviews"
    );

    Ok(ReviewFrame {
        frame,
        skipped: batch.skipped,
    })
}

/// Loads reviews, then products. A missing or strict-invalid review file fails before the
/// product endpoint is contacted.
pub async fn extract(config: &ExtractConfig, catalog: &CatalogClient) -> Result<ExtractedData> {
    let reviews = load_reviews(&config.reviews_path, config.malformed_lines)?;
    let products = catalog.fetch_products().await?;

    Ok(ExtractedData {
        reviews: reviews.frame,
        products,
        skipped_lines: reviews.skipped,
    })
}
