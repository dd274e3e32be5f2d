//! Merge request publisher: opens the pull request for an ingested branch.

use std::sync::Arc;
use tracing::{error, info};

use crate::contract::RepositoryHost;
use crate::error::PublishError;
use crate::model::NewPullRequest;

pub struct PullRequestPublisher<R> {
    host: Arc<R>,
    owner: String,
}

impl<R: RepositoryHost> PullRequestPublisher<R> {
    pub fn new(host: Arc<R>, owner: impl Into<String>) -> Self {
        Self {
            host,
            owner: owner.into(),
        }
    }

    /// Open a pull request from `head_branch` into `base_branch` and return its
    /// web URL.
    pub async fn create_pull_request(
        &self,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        description: &str,
    ) -> Result<String, PublishError> {
        if title.is_empty() {
            return Err(PublishError::InvalidPrTitle);
        }
        if head_branch.is_empty() {
            return Err(PublishError::InvalidHeadBranch);
        }
        if base_branch.is_empty() {
            return Err(PublishError::InvalidBaseBranch);
        }
        if head_branch == base_branch {
            return Err(PublishError::SameBranch);
        }

        let request = NewPullRequest {
            title: title.to_string(),
            head: format!("{}:{}", self.owner, head_branch),
            base: base_branch.to_string(),
            body: description.to_string(),
            maintainer_can_modify: true,
        };

        let pull_request = self.host.create_pull_request(request).await.map_err(|e| {
            error!(error = %e, head = %head_branch, base = %base_branch, "[PUBLISH] Failed to open pull request");
            e
        })?;

        info!(
            number = pull_request.number,
            url = %pull_request.html_url,
            "[PUBLISH] Pull request opened"
        );
        Ok(pull_request.html_url)
    }
}
