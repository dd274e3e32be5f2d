//! # GitHub binding of [`RepositoryHost`]
//!
//! Thin REST v3 client over the git data API of one repository
//! (`/repos/{owner}/{repository}/git/...`) plus `/pulls`.
//!
//! Tree entries are always regular files (`100644`, type `blob`). Content that is
//! valid UTF-8 is embedded inline in the tree request; anything else is first
//! uploaded as a base64 blob and referenced by its sha.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use slack_assets_core::contract::RepositoryHost;
use slack_assets_core::error::RepositoryError;
use slack_assets_core::model::{
    GitCommit, GitRef, GitTree, NewCommit, NewPullRequest, PullRequest, TreeEntry,
};
use tracing::{debug, error, info};

use crate::load_config::GithubSettings;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("slack-assets-bot/", env!("CARGO_PKG_VERSION"));

pub struct GithubClient {
    http: reqwest::Client,
    repo_url: String,
    headers: HeaderMap,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    full_ref: String,
    object: ObjectSha,
}

#[derive(Debug, Deserialize)]
struct ObjectSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ObjectSha,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    full_ref: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntryRequest>,
}

#[derive(Debug, Serialize)]
struct TreeEntryRequest {
    path: String,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest {
    message: String,
    tree: String,
    parents: Vec<String>,
    author: AuthorRequest,
}

#[derive(Debug, Serialize)]
struct AuthorRequest {
    name: String,
    email: String,
    date: String,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, settings: &GithubSettings) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        match HeaderValue::from_str(&format!("Bearer {}", settings.token)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                error!(error = %e, "GitHub token is not a valid header value; requests go out unauthenticated");
            }
        }
        info!(
            owner = %settings.owner,
            repository = %settings.repository,
            api_base_url = %settings.api_base_url,
            "Initialized GithubClient"
        );
        GithubClient {
            http,
            repo_url: format!(
                "{}/repos/{}/{}",
                settings.api_base_url, settings.owner, settings.repository
            ),
            headers,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.repo_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RepositoryError> {
        let response = request.headers(self.headers.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            error!(operation, status = %status, message = %message, "[GITHUB] Request failed");
            return Err(RepositoryError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            error!(operation, error = %e, "[GITHUB] Undecodable response");
            RepositoryError::Decode(format!("{operation}: {e}"))
        })
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String, RepositoryError> {
        let request = CreateBlobRequest {
            content: STANDARD.encode(content),
            encoding: "base64",
        };
        let blob: ObjectSha = self
            .send("create_blob", self.http.post(self.url("git/blobs")).json(&request))
            .await?;
        debug!(sha = %blob.sha, bytes = content.len(), "[GITHUB] Blob created");
        Ok(blob.sha)
    }

    async fn tree_entry(&self, entry: TreeEntry) -> Result<TreeEntryRequest, RepositoryError> {
        let mode = entry.mode.as_str();
        match String::from_utf8(entry.content) {
            Ok(text) => Ok(TreeEntryRequest {
                path: entry.path,
                mode,
                kind: "blob",
                content: Some(text),
                sha: None,
            }),
            Err(e) => {
                let sha = self.create_blob(e.as_bytes()).await?;
                Ok(TreeEntryRequest {
                    path: entry.path,
                    mode,
                    kind: "blob",
                    content: None,
                    sha: Some(sha),
                })
            }
        }
    }
}

async fn error_message(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(body) => match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(ErrorResponse {
                message: Some(message),
            }) => message,
            _ => String::from_utf8_lossy(&body).into_owned(),
        },
        Err(e) => e.to_string(),
    }
}

fn git_ref(response: RefResponse) -> GitRef {
    let branch = response
        .full_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(&response.full_ref)
        .to_string();
    GitRef {
        branch,
        sha: response.object.sha,
    }
}

#[async_trait]
impl RepositoryHost for GithubClient {
    async fn get_ref(&self, branch: &str) -> Result<Option<GitRef>, RepositoryError> {
        let request = self.http.get(self.url(&format!("git/ref/heads/{branch}")));
        match self.send::<RefResponse>("get_ref", request).await {
            Ok(response) => Ok(Some(git_ref(response))),
            Err(RepositoryError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                debug!(branch = %branch, "[GITHUB] Branch not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<GitRef, RepositoryError> {
        let request = CreateRefRequest {
            full_ref: format!("refs/heads/{branch}"),
            sha,
        };
        let response: RefResponse = self
            .send("create_ref", self.http.post(self.url("git/refs")).json(&request))
            .await?;
        info!(branch = %branch, sha = %sha, "[GITHUB] Branch created");
        Ok(git_ref(response))
    }

    async fn update_ref(
        &self,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, RepositoryError> {
        let request = UpdateRefRequest { sha, force };
        let response: RefResponse = self
            .send(
                "update_ref",
                self.http
                    .patch(self.url(&format!("git/refs/heads/{branch}")))
                    .json(&request),
            )
            .await?;
        info!(branch = %branch, sha = %sha, "[GITHUB] Branch updated");
        Ok(git_ref(response))
    }

    async fn get_commit(&self, sha: &str) -> Result<GitCommit, RepositoryError> {
        let response: CommitResponse = self
            .send(
                "get_commit",
                self.http.get(self.url(&format!("git/commits/{sha}"))),
            )
            .await?;
        Ok(GitCommit {
            sha: response.sha,
            tree_sha: response.tree.sha,
        })
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        entries: Vec<TreeEntry>,
    ) -> Result<GitTree, RepositoryError> {
        let mut tree = Vec::with_capacity(entries.len());
        for entry in entries {
            tree.push(self.tree_entry(entry).await?);
        }
        let request = CreateTreeRequest { base_tree, tree };
        let response: ObjectSha = self
            .send("create_tree", self.http.post(self.url("git/trees")).json(&request))
            .await?;
        info!(sha = %response.sha, base_tree = %base_tree, "[GITHUB] Tree created");
        Ok(GitTree { sha: response.sha })
    }

    async fn create_commit(&self, commit: NewCommit) -> Result<GitCommit, RepositoryError> {
        let request = CreateCommitRequest {
            message: commit.message,
            tree: commit.tree_sha,
            parents: commit.parents,
            author: AuthorRequest {
                name: commit.author.name,
                email: commit.author.email,
                date: commit.author.date.to_rfc3339(),
            },
        };
        let response: CommitResponse = self
            .send(
                "create_commit",
                self.http.post(self.url("git/commits")).json(&request),
            )
            .await?;
        info!(sha = %response.sha, "[GITHUB] Commit created");
        Ok(GitCommit {
            sha: response.sha,
            tree_sha: response.tree.sha,
        })
    }

    async fn create_pull_request(
        &self,
        request: NewPullRequest,
    ) -> Result<PullRequest, RepositoryError> {
        #[derive(Serialize)]
        struct Body<'a> {
            title: &'a str,
            head: &'a str,
            base: &'a str,
            body: &'a str,
            maintainer_can_modify: bool,
        }

        let body = Body {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: &request.body,
            maintainer_can_modify: request.maintainer_can_modify,
        };
        let response: PullResponse = self
            .send("create_pull_request", self.http.post(self.url("pulls")).json(&body))
            .await?;
        Ok(PullRequest {
            number: response.number,
            html_url: response.html_url,
        })
    }
}
