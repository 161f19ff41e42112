use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Suffix of in-progress artifact files; they never replace the target until fully written.
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Serialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub blake3: String,
    /// False when the new artifact is byte-identical to the one it replaced.
    pub changed: bool,
}

/// Writes `frame` as CSV with a header row, replacing `path` atomically.
///
/// The CSV is written to a hidden sibling file, flushed to disk, and renamed over the target, so
/// readers see either the previous artifact or the complete new one. On failure the temporary
/// file is removed and the previous artifact is left untouched.
pub fn write_csv_atomic(frame: &DataFrame, path: &Path) -> Result<OutputArtifact> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory).map_err(|e| PipelineError::io(&directory, e))?;

    let file_name = path.file_name().ok_or_else(|| {
        PipelineError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"),
        )
    })?;
    let temp_path = directory.join(format!(
        ".{}.{}{}",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ));

    let previous = previous_digest(path);
    let result = render_csv(frame).and_then(|bytes| {
        persist(&temp_path, &bytes)?;
        fs::rename(&temp_path, path).map_err(|e| PipelineError::io(path, e))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    });

    let digest = match result {
        Ok(digest) => digest,
        Err(err) => {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }
    };

    let artifact = OutputArtifact {
        path: path.to_path_buf(),
        rows: frame.height(),
        columns: frame.width(),
        changed: previous.as_deref() != Some(digest.as_str()),
        blake3: digest,
    };
    info!(
        path = %artifact.path.display(),
        rows = artifact.rows,
        columns = artifact.columns,
        changed = artifact.changed,
        "Wrote combined dataset"
    );
    Ok(artifact)
}

fn render_csv(frame: &DataFrame) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut frame = frame.clone();
    CsvWriter::new(&mut bytes)
        .include_header(true)
        .finish(&mut frame)?;
    Ok(bytes)
}

fn persist(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path).map_err(|e| PipelineError::io(temp_path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PipelineError::io(temp_path, e))
}

fn previous_digest(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| blake3::hash(&bytes).to_hex().to_string())
}
