//! Ingestion orchestrator: one upload event in, one notification out.
//!
//! A run moves linearly through
//! `Received → Validated → Downloaded → Extracted → Committed → Published`
//! and ends by notifying the channel. Any failing stage jumps straight to an
//! error notification and the failure is returned to the caller; nothing is
//! retried.
//!
//! # Scratch storage
//! Every local path a run creates (the downloaded archive and the extraction
//! root) is registered in a [`ScratchSpace`] as soon as its name is known and
//! removed once the run has finished, whatever the outcome. Removal failures
//! are logged and never mask the run's own result.
//!
//! # Concurrency
//! Runs share no mutable state. Archive names, extraction roots and branch
//! names are freshly generated per run, so concurrent runs never touch the same
//! path or ref.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::archive;
use crate::commit::CommitBuilder;
use crate::config::{IngestConfig, RepositoryTarget};
use crate::contract::{MessageSystem, RepositoryHost};
use crate::error::{ExtractError, IngestError, ValidationError};
use crate::model::{
    AssetFile, BranchName, CommitFile, ExtractedFile, FileDescriptor, FileUploadEvent,
    Notification,
};
use crate::publish::PullRequestPublisher;

pub const ALLOWED_EXTENSION: &str = "zip";

/// Last stage a run completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Validated,
    Downloaded,
    Extracted,
    Committed,
    Published,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Received => "received",
            IngestStage::Validated => "validated",
            IngestStage::Downloaded => "downloaded",
            IngestStage::Extracted => "extracted",
            IngestStage::Committed => "committed",
            IngestStage::Published => "published",
        };
        f.write_str(name)
    }
}

pub struct AssetIngestor<M, R> {
    messages: M,
    commits: CommitBuilder<R>,
    publisher: PullRequestPublisher<R>,
    config: IngestConfig,
    ignore: fn(&str) -> bool,
}

impl<M, R> AssetIngestor<M, R>
where
    M: MessageSystem,
    R: RepositoryHost,
{
    pub fn new(
        messages: M,
        repository: Arc<R>,
        target: RepositoryTarget,
        config: IngestConfig,
    ) -> Self {
        Self {
            messages,
            commits: CommitBuilder::new(Arc::clone(&repository), target.author),
            publisher: PullRequestPublisher::new(repository, target.owner),
            config,
            ignore: archive::ignore_underscore_prefixed,
        }
    }

    /// Replace the default `_`-prefix ignore predicate.
    pub fn with_ignore_predicate(mut self, ignore: fn(&str) -> bool) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Validate the event's file count, then ingest its single file.
    ///
    /// Returns the pull request URL on success.
    pub async fn handle_event(&self, event: &FileUploadEvent) -> Result<String, IngestError> {
        info!(
            files = event.files.len(),
            channel = event.channel.as_deref().unwrap_or("-"),
            user = event.user.as_deref().unwrap_or("-"),
            "[INGEST] Event received"
        );
        match single_file(&event.files) {
            Ok(file) => self.process(AssetFile::from(file)).await,
            Err(e) => {
                let e = IngestError::from(e);
                self.report_failure(IngestStage::Received, &e).await;
                Err(e)
            }
        }
    }

    /// Run the whole pipeline for one asset and notify the outcome.
    pub async fn process(&self, asset: AssetFile) -> Result<String, IngestError> {
        let mut scratch = ScratchSpace::default();
        let mut stage = IngestStage::Received;

        let result = match self.run_pipeline(&asset, &mut scratch, &mut stage).await {
            Ok(url) => match self.messages.publish_message(&Notification::success(&url)).await {
                Ok(()) => {
                    info!(url = %url, "[INGEST] Asset processed with success");
                    Ok(url)
                }
                Err(e) => {
                    error!(error = %e, url = %url, "[INGEST] Failed to publish success notification");
                    Err(IngestError::from(e))
                }
            },
            Err(e) => {
                self.report_failure(stage, &e).await;
                Err(e)
            }
        };

        scratch.release().await;
        result
    }

    async fn run_pipeline(
        &self,
        asset: &AssetFile,
        scratch: &mut ScratchSpace,
        stage: &mut IngestStage,
    ) -> Result<String, IngestError> {
        validate_asset(asset)?;
        *stage = IngestStage::Validated;

        let archive_path = self.messages.download_file(asset).await?;
        scratch.track(archive_path.clone());
        *stage = IngestStage::Downloaded;

        let root = archive::extraction_root(&self.config.scratch_dir);
        scratch.track(root.clone());
        let extracted = extract_blocking(archive_path, root, self.ignore).await?;
        *stage = IngestStage::Extracted;

        let files = to_commit_files(extracted, self.ignore);
        let branch = BranchName::generate(&self.config.branch_prefix);
        info!(branch = %branch, files = files.len(), "[INGEST] Committing assets");

        self.commits
            .create_commit(
                branch.as_str(),
                &self.config.base_branch,
                &self.config.commit_message,
                &files,
            )
            .await?;
        *stage = IngestStage::Committed;

        let url = self
            .publisher
            .create_pull_request(
                branch.as_str(),
                &self.config.base_branch,
                &self.config.pr_title,
                &self.config.pr_description,
            )
            .await?;
        *stage = IngestStage::Published;

        Ok(url)
    }

    async fn report_failure(&self, stage: IngestStage, e: &IngestError) {
        error!(error = %e, failed_after = %stage, "[INGEST] Asset ingestion failed");
        if let Err(notify_err) = self.messages.publish_message(&Notification::error(e)).await {
            warn!(error = %notify_err, "[INGEST] Failed to publish error notification");
        }
    }
}

/// Exactly one file per event.
pub fn single_file(files: &[FileDescriptor]) -> Result<&FileDescriptor, ValidationError> {
    match files {
        [] => Err(ValidationError::MinNumberOfFiles),
        [file] => Ok(file),
        _ => Err(ValidationError::MaxNumberOfFiles),
    }
}

pub fn validate_asset(asset: &AssetFile) -> Result<(), ValidationError> {
    if asset.url.is_empty() {
        return Err(ValidationError::InvalidUrl);
    }
    if asset.extension != ALLOWED_EXTENSION {
        return Err(ValidationError::InvalidFileExtension);
    }
    Ok(())
}

pub fn to_commit_files(extracted: Vec<ExtractedFile>, ignore: fn(&str) -> bool) -> Vec<CommitFile> {
    extracted
        .into_iter()
        .filter(|file| !ignore(&file.remote_path))
        .map(CommitFile::from)
        .collect()
}

async fn extract_blocking(
    archive_path: PathBuf,
    root: PathBuf,
    ignore: fn(&str) -> bool,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let join_root = root.clone();
    tokio::task::spawn_blocking(move || archive::extract(&archive_path, &root, ignore))
        .await
        .map_err(|e| ExtractError::Io {
            path: join_root,
            source: io::Error::new(io::ErrorKind::Other, e),
        })?
}

/// Local paths owned by one run.
#[derive(Debug, Default)]
struct ScratchSpace {
    paths: Vec<PathBuf>,
}

impl ScratchSpace {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    async fn release(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = remove_path(&path).await {
                warn!(error = %e, path = %path.display(), "[INGEST] Failed to remove scratch path");
            }
        }
    }
}

impl Drop for ScratchSpace {
    // Runs only when the pipeline future is dropped before `release`.
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let _ = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
        }
    }
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
