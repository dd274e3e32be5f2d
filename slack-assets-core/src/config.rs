use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_BRANCH_PREFIX: &str = "asset";
pub const DEFAULT_COMMIT_MESSAGE: &str = "bot: add new assets";
pub const DEFAULT_PR_TITLE: &str = ":robot: New assets";
pub const DEFAULT_PR_DESCRIPTION: &str = "\n## Description\n- Adds the new assets using the slack bot.\n";

/// Fixed templates and scratch location of one ingestor. Deserialized from the
/// `ingest` config section; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub base_branch: String,
    pub branch_prefix: String,
    pub commit_message: String,
    pub pr_title: String,
    pub pr_description: String,
    /// Parent directory for downloaded archives and extraction roots.
    pub scratch_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            pr_title: DEFAULT_PR_TITLE.to_string(),
            pr_description: DEFAULT_PR_DESCRIPTION.to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl IngestConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_branch = %self.base_branch,
            branch_prefix = %self.branch_prefix,
            scratch_dir = %self.scratch_dir.display(),
            "Loaded IngestConfig"
        );
        debug!(?self, "IngestConfig loaded (full debug)");
    }
}

/// Commit author used for every generated commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorIdentity {
    pub name: String,
    pub email: String,
}

/// Where commits and pull requests land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    /// Repository owner, used for `owner:branch` pull request heads.
    pub owner: String,
    pub author: AuthorIdentity,
}
