//! Distribution of the processed directory to a git remote.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PublishConfig;
use crate::outputs::TEMP_SUFFIX;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to run git {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("git {step} failed (exit code {code:?}): {stderr}")]
    Git {
        step: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("git {step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },
    #[error("failed to update {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The remote branch already matches the local contents.
    NothingToPublish,
    /// The remote branch now points at `commit`; `committed` tells whether a new commit was made.
    Published { commit: String, committed: bool },
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, local_dir: &Path) -> Result<PublishOutcome, PublishError>;
}

/// Publishes a directory by committing it and pushing one branch with the `git` CLI.
///
/// Running it again without changes reports [`PublishOutcome::NothingToPublish`]. If a push fails
/// the local commit is kept and pushed by the next run.
pub struct GitPublisher {
    config: PublishConfig,
}

impl GitPublisher {
    pub fn new(config: PublishConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        dir: &Path,
        step: &'static str,
        args: &[&str],
    ) -> Result<Output, PublishError> {
        debug!(step, ?args, dir = %dir.display(), "Running git");
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        match tokio::time::timeout(self.config.timeout(), command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(PublishError::Spawn { step, source }),
            Err(_) => Err(PublishError::Timeout {
                step,
                secs: self.config.timeout_secs,
            }),
        }
    }

    async fn git(&self, dir: &Path, step: &'static str, args: &[&str]) -> Result<String, PublishError> {
        let output = self.run(dir, step, args).await?;
        if !output.status.success() {
            return Err(PublishError::Git {
                step,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn ensure_repository(&self, dir: &Path) -> Result<(), PublishError> {
        if !dir.join(".git").exists() {
            info!(dir = %dir.display(), "Initializing git repository");
            self.git(dir, "init", &["init"]).await?;
        }
        exclude_temp_files(dir)?;

        let remote = self.run(dir, "remote get-url", &["remote", "get-url", "origin"]).await?;
        let url = self.config.remote_url.as_str();
        if !remote.status.success() {
            self.git(dir, "remote add", &["remote", "add", "origin", url])
                .await?;
        } else if String::from_utf8_lossy(&remote.stdout).trim() != url {
            self.git(dir, "remote set-url", &["remote", "set-url", "origin", url])
                .await?;
        }
        Ok(())
    }

    async fn ensure_branch(&self, dir: &Path) -> Result<(), PublishError> {
        let branch = self.config.branch.as_str();
        let current = self
            .run(dir, "symbolic-ref", &["symbolic-ref", "--short", "HEAD"])
            .await?;
        if current.status.success() && String::from_utf8_lossy(&current.stdout).trim() == branch {
            return Ok(());
        }

        let local_ref = format!("refs/heads/{branch}");
        let exists = self
            .run(dir, "rev-parse", &["rev-parse", "--verify", "--quiet", &local_ref])
            .await?
            .status
            .success();
        if exists {
            self.git(dir, "checkout", &["checkout", branch]).await?;
        } else {
            self.git(dir, "checkout", &["checkout", "-b", branch]).await?;
        }
        Ok(())
    }

    async fn commit_changes(&self, dir: &Path) -> Result<bool, PublishError> {
        self.git(dir, "add", &["add", "--all"]).await?;
        let status = self.git(dir, "status", &["status", "--porcelain"]).await?;
        if status.is_empty() {
            return Ok(false);
        }

        let name = format!("user.name={}", self.config.author_name);
        let email = format!("user.email={}", self.config.author_email);
        self.git(
            dir,
            "commit",
            &[
                "-c",
                &name,
                "-c",
                &email,
                "commit",
                "--quiet",
                "-m",
                &self.config.commit_message,
            ],
        )
        .await?;
        Ok(true)
    }

    async fn remote_tip(&self, dir: &Path) -> Result<Option<String>, PublishError> {
        let remote_ref = format!("refs/heads/{}", self.config.branch);
        let listing = self
            .git(dir, "ls-remote", &["ls-remote", "origin", &remote_ref])
            .await?;
        Ok(listing
            .lines()
            .find_map(|line| line.split_whitespace().next())
            .map(str::to_string))
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, local_dir: &Path) -> Result<PublishOutcome, PublishError> {
        if !local_dir.is_dir() {
            return Err(PublishError::MissingDirectory(local_dir.to_path_buf()));
        }

        self.ensure_repository(local_dir).await?;
        self.ensure_branch(local_dir).await?;
        let committed = self.commit_changes(local_dir).await?;

        let head = self
            .run(local_dir, "rev-parse", &["rev-parse", "--verify", "--quiet", "HEAD"])
            .await?;
        if !head.status.success() {
            info!(dir = %local_dir.display(), "Nothing to publish: directory is empty");
            return Ok(PublishOutcome::NothingToPublish);
        }
        let head = String::from_utf8_lossy(&head.stdout).trim().to_string();

        let remote_tip = self.remote_tip(local_dir).await?;
        if !committed && remote_tip.as_deref() == Some(head.as_str()) {
            info!(branch = %self.config.branch, commit = %head, "Nothing to publish");
            return Ok(PublishOutcome::NothingToPublish);
        }

        let refspec = format!("{0}:{0}", self.config.branch);
        self.git(local_dir, "push", &["push", "--quiet", "origin", &refspec])
            .await?;
        info!(
            branch = %self.config.branch,
            commit = %head,
            committed,
            "Published processed dataset"
        );

        Ok(PublishOutcome::Published {
            commit: head,
            committed,
        })
    }
}

/// Keeps half-written artifacts out of commits.
fn exclude_temp_files(dir: &Path) -> Result<(), PublishError> {
    let pattern = format!(".*{TEMP_SUFFIX}");
    let info_dir = dir.join(".git").join("info");
    let exclude_path = info_dir.join("exclude");
    let io_err = |source| PublishError::Io {
        path: exclude_path.clone(),
        source,
    };

    let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }

    fs::create_dir_all(&info_dir).map_err(io_err)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude_path)
        .map_err(io_err)?;
    let separator = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{separator}{pattern}").map_err(io_err)
}
