//! Plain data types shared by the pipeline stages and the collaborator contracts.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// One file attached to an inbound upload event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub download_url: String,
    pub file_type: String,
}

/// An inbound upload event, already stripped of transport details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUploadEvent {
    pub channel: Option<String>,
    pub user: Option<String>,
    pub files: Vec<FileDescriptor>,
}

/// Reference to the remote archive to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub url: String,
    pub extension: String,
}

impl From<&FileDescriptor> for AssetFile {
    fn from(file: &FileDescriptor) -> Self {
        AssetFile {
            url: file.download_url.clone(),
            extension: file.file_type.clone(),
        }
    }
}

/// One archive member written to scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub local_path: PathBuf,
    /// Archive-relative entry name, used as the path inside the repository.
    pub remote_path: String,
}

/// One file of the commit file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub local_path: PathBuf,
    pub remote_path: String,
}

impl From<ExtractedFile> for CommitFile {
    fn from(file: ExtractedFile) -> Self {
        CommitFile {
            local_path: file.local_path,
            remote_path: file.remote_path,
        }
    }
}

/// Freshly generated branch name, unique per ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    pub fn generate(prefix: &str) -> Self {
        BranchName(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStyle {
    Success,
    Error,
}

/// A status message for the chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub style: NotificationStyle,
}

impl Notification {
    pub fn success(pull_request_url: &str) -> Self {
        Notification {
            title: "Asset processed with success".to_string(),
            body: format!("You can see the PR opened in :arrow_right: {pull_request_url}"),
            style: NotificationStyle::Success,
        }
    }

    pub fn error(error: &dyn std::error::Error) -> Self {
        Notification {
            title: "Error to process the asset".to_string(),
            body: error.to_string(),
            style: NotificationStyle::Error,
        }
    }
}

// Repository host object model.

/// A branch reference and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub branch: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub tree_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTree {
    pub sha: String,
}

/// Git file mode of a tree entry. Only regular files are ever staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryMode {
    RegularFile,
}

impl TreeEntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeEntryMode::RegularFile => "100644",
        }
    }
}

/// A staged file for tree creation, content embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: TreeEntryMode,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub author: CommitAuthor,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    /// Head reference in `owner:branch` form.
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_branch_names_carry_the_prefix() {
        let branch = BranchName::generate("asset");
        assert!(branch.as_str().starts_with("asset-"));
        assert_eq!(branch.as_str().len(), "asset-".len() + 36);
    }

    #[test]
    fn generated_branch_names_do_not_collide() {
        let names: HashSet<BranchName> = (0..10_000).map(|_| BranchName::generate("asset")).collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn error_notification_uses_error_text_as_body() {
        let n = Notification::error(&crate::error::ValidationError::InvalidFileExtension);
        assert_eq!(n.style, NotificationStyle::Error);
        assert_eq!(n.body, "invalid file format. The format allowed is only zip");
    }
}
