//! Error taxonomy for the ingestion pipeline.
//!
//! Every stage returns its own typed error. [`IngestError`] is the transparent
//! union the orchestrator reports: its `Display` output is exactly the text sent
//! to the channel in the error notification.

use std::path::PathBuf;

/// Input validation failures, detected before any I/O.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid number of files. One file is required")]
    MinNumberOfFiles,

    #[error("invalid number of files. Only one file is allowed")]
    MaxNumberOfFiles,

    #[error("invalid url to file. The url is required")]
    InvalidUrl,

    #[error("invalid file format. The format allowed is only zip")]
    InvalidFileExtension,
}

/// Failure while downloading a remote archive to scratch storage.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to download file: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to download file: server answered {status}")]
    Status { status: u16 },

    #[error("failed to store downloaded file at {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while unpacking an archive. Any error aborts the whole extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry {entry:?} resolves outside of the extraction directory")]
    PathTraversal { entry: String },

    #[error("failed to extract archive at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by the repository host.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("repository host answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response from repository host: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("the pr base and head branch are the same, it is not allowed")]
    SameBranch,

    #[error("the pr base branch is required")]
    InvalidBaseBranch,

    #[error("the base branch {0} does not exist")]
    BaseBranchNotFound(String),

    #[error("invalid local path. The local path can't be empty")]
    InvalidLocalPath,

    #[error("invalid remote path. The remote path can't be empty")]
    InvalidRemotePath,

    #[error("failed to read {}: {source}", .path.display())]
    ReadLocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("the pr title is required")]
    InvalidPrTitle,

    #[error("the pr head branch is required")]
    InvalidHeadBranch,

    #[error("the pr base branch is required")]
    InvalidBaseBranch,

    #[error("the pr base and head branch are the same, it is not allowed")]
    SameBranch,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failure delivering a notification to the chat channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to publish message: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to publish message: server answered {status}")]
    Status { status: u16 },

    #[error("message rejected by chat platform: {0}")]
    Rejected(String),
}

/// Any failure of one ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}
