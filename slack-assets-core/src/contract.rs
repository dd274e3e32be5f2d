//! # contract: collaborator interfaces of the ingestion pipeline
//!
//! The pipeline talks to the outside world through exactly two traits:
//!
//! - [`MessageSystem`]: the chat platform. Publishes status messages and
//!   downloads the uploaded file with the platform's credentials.
//! - [`RepositoryHost`]: the version-control host. A thin view of the git data
//!   API (refs, commits, trees) plus pull request creation, bound to a single
//!   repository.
//!
//! Both are annotated for `mockall`; with the `test-export-mocks` feature the
//! generated `MockMessageSystem` and `MockRepositoryHost` are public so that
//! integration tests can script every remote call.

use async_trait::async_trait;
use std::path::PathBuf;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{FetchError, NotifyError, RepositoryError};
use crate::model::{
    AssetFile, GitCommit, GitRef, GitTree, NewCommit, NewPullRequest, Notification, PullRequest,
    TreeEntry,
};

/// Outbound side of the chat platform.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MessageSystem: Send + Sync {
    /// Post a status message to the configured channel.
    async fn publish_message(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Download the referenced file into scratch storage and return its path.
    ///
    /// The caller owns the returned file and removes it.
    async fn download_file(&self, file: &AssetFile) -> Result<PathBuf, FetchError>;
}

/// Git data API of one hosted repository.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Look up `refs/heads/{branch}`. `Ok(None)` when the branch does not exist.
    async fn get_ref(&self, branch: &str) -> Result<Option<GitRef>, RepositoryError>;

    /// Create `refs/heads/{branch}` pointing at `sha`.
    async fn create_ref(&self, branch: &str, sha: &str) -> Result<GitRef, RepositoryError>;

    /// Move `refs/heads/{branch}` to `sha`. With `force == false` the host must
    /// reject anything but a fast-forward.
    async fn update_ref(
        &self,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, RepositoryError>;

    async fn get_commit(&self, sha: &str) -> Result<GitCommit, RepositoryError>;

    /// Create one tree from `entries`, layered on top of `base_tree`.
    async fn create_tree(
        &self,
        base_tree: &str,
        entries: Vec<TreeEntry>,
    ) -> Result<GitTree, RepositoryError>;

    async fn create_commit(&self, commit: NewCommit) -> Result<GitCommit, RepositoryError>;

    async fn create_pull_request(
        &self,
        request: NewPullRequest,
    ) -> Result<PullRequest, RepositoryError>;
}
