//! Branch/commit builder.
//!
//! Builds exactly one commit from a file manifest against the host's git data
//! API, in strict sequence:
//!
//! 1. resolve `refs/heads/{commit_branch}`, creating it from the base branch tip
//!    when absent
//! 2. fetch the commit that ref points at (the parent)
//! 3. create one tree holding every file, layered on the parent's tree
//! 4. create a single-parent commit for that tree
//! 5. fast-forward the ref to the new commit (never forced)
//!
//! A failure at any step stops the sequence. Objects created by earlier steps
//! are left in place, including a freshly created ref.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AuthorIdentity;
use crate::contract::RepositoryHost;
use crate::error::CommitError;
use crate::model::{CommitAuthor, CommitFile, GitCommit, GitRef, NewCommit, TreeEntry, TreeEntryMode};

pub struct CommitBuilder<R> {
    host: Arc<R>,
    author: AuthorIdentity,
}

impl<R: RepositoryHost> CommitBuilder<R> {
    pub fn new(host: Arc<R>, author: AuthorIdentity) -> Self {
        Self { host, author }
    }

    /// Commit `files` onto `commit_branch` (branched off `base_branch` if needed)
    /// and return the new commit.
    pub async fn create_commit(
        &self,
        commit_branch: &str,
        base_branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<GitCommit, CommitError> {
        // Path checks are local, so run them before anything is created remotely.
        validate_files(files)?;

        let branch_ref = self.resolve_ref(commit_branch, base_branch).await?;

        let parent = self.host.get_commit(&branch_ref.sha).await.map_err(|e| {
            error!(error = %e, sha = %branch_ref.sha, "[COMMIT] Failed to fetch parent commit");
            e
        })?;

        let entries = stage_entries(files).await?;
        let entry_count = entries.len();
        let tree = self
            .host
            .create_tree(&parent.tree_sha, entries)
            .await
            .map_err(|e| {
                error!(error = %e, branch = %commit_branch, "[COMMIT] Failed to create tree");
                e
            })?;
        info!(tree = %tree.sha, entries = entry_count, "[COMMIT] Tree created");

        let new_commit = NewCommit {
            message: message.to_string(),
            author: CommitAuthor {
                name: self.author.name.clone(),
                email: self.author.email.clone(),
                date: Utc::now(),
            },
            tree_sha: tree.sha,
            parents: vec![parent.sha],
        };
        let commit = self.host.create_commit(new_commit).await.map_err(|e| {
            error!(error = %e, branch = %commit_branch, "[COMMIT] Failed to create commit");
            e
        })?;
        info!(commit = %commit.sha, "[COMMIT] Commit created");

        self.host
            .update_ref(commit_branch, &commit.sha, false)
            .await
            .map_err(|e| {
                error!(error = %e, branch = %commit_branch, commit = %commit.sha, "[COMMIT] Failed to update ref");
                e
            })?;
        info!(branch = %commit_branch, commit = %commit.sha, "[COMMIT] Branch updated");

        Ok(commit)
    }

    /// Return the commit branch ref if it exists, otherwise create it at the
    /// base branch tip.
    async fn resolve_ref(
        &self,
        commit_branch: &str,
        base_branch: &str,
    ) -> Result<GitRef, CommitError> {
        if let Some(existing) = self.host.get_ref(commit_branch).await? {
            info!(branch = %commit_branch, sha = %existing.sha, "[COMMIT] Reusing existing branch");
            return Ok(existing);
        }

        if commit_branch == base_branch {
            return Err(CommitError::SameBranch);
        }
        if base_branch.is_empty() {
            return Err(CommitError::InvalidBaseBranch);
        }

        let base = match self.host.get_ref(base_branch).await? {
            Some(base) => base,
            None => {
                error!(branch = %base_branch, "[COMMIT] Base branch does not exist");
                return Err(CommitError::BaseBranchNotFound(base_branch.to_string()));
            }
        };

        let created = self.host.create_ref(commit_branch, &base.sha).await?;
        info!(branch = %commit_branch, base = %base_branch, sha = %created.sha, "[COMMIT] Branch created");
        Ok(created)
    }
}

fn validate_files(files: &[CommitFile]) -> Result<(), CommitError> {
    for file in files {
        if file.local_path.as_os_str().is_empty() {
            return Err(CommitError::InvalidLocalPath);
        }
        if file.remote_path.is_empty() {
            return Err(CommitError::InvalidRemotePath);
        }
    }
    Ok(())
}

async fn stage_entries(files: &[CommitFile]) -> Result<Vec<TreeEntry>, CommitError> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let content = tokio::fs::read(&file.local_path)
            .await
            .map_err(|source| CommitError::ReadLocalFile {
                path: file.local_path.clone(),
                source,
            })?;
        entries.push(TreeEntry {
            path: file.remote_path.clone(),
            mode: TreeEntryMode::RegularFile,
            content,
        });
    }
    Ok(entries)
}
