//! `load_config` module: loads the static YAML config and injects secrets from the environment.
//!
//! This is the only place where the user-supplied YAML is parsed and mapped to the typed
//! [`AppConfig`] handed to the bindings and the ingestion orchestrator.
//!
//! # Responsibilities
//! - Parse the YAML file given via `--config` (no secrets in it)
//! - Fill optional sections with their defaults
//! - Read `SLACK_AUTH_TOKEN`, `SLACK_SIGNING_SECRET` and `GITHUB_TOKEN` from the environment
//! - Fail with a message that names the missing or broken piece
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use reqwest::header::HeaderValue;
use slack_assets_core::config::{AuthorIdentity, IngestConfig, RepositoryTarget};
use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const SLACK_AUTH_TOKEN_ENV: &str = "SLACK_AUTH_TOKEN";
pub const SLACK_SIGNING_SECRET_ENV: &str = "SLACK_SIGNING_SECRET";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// Fully resolved runtime configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub slack: SlackSettings,
    pub github: GithubSettings,
    pub ingest: IngestConfig,
}

#[derive(Clone)]
pub struct SlackSettings {
    pub channel_id: String,
    pub api_base_url: String,
    pub auth_token: String,
    pub signing_secret: String,
}

#[derive(Clone)]
pub struct GithubSettings {
    pub owner: String,
    pub repository: String,
    pub author: AuthorIdentity,
    pub api_base_url: String,
    pub token: String,
}

impl GithubSettings {
    pub fn target(&self) -> RepositoryTarget {
        RepositoryTarget {
            owner: self.owner.clone(),
            author: self.author.clone(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackSettings")
            .field("channel_id", &self.channel_id)
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSettings")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("author", &self.author)
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("listen_addr", &self.listen_addr)
            .field("slack", &self.slack)
            .field("github", &self.github)
            .field("ingest", &self.ingest)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    listen_addr: Option<SocketAddr>,
    scratch_dir: Option<PathBuf>,
    slack: SlackSection,
    github: GithubSection,
    #[serde(default)]
    ingest: IngestConfig,
}

#[derive(Debug, Deserialize)]
struct SlackSection {
    channel_id: String,
    api_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubSection {
    owner: String,
    repository: String,
    author_name: String,
    author_email: String,
    api_base_url: Option<String>,
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut ingest = raw.ingest;
    if let Some(scratch_dir) = raw.scratch_dir {
        ingest.scratch_dir = scratch_dir;
    }

    let config = AppConfig {
        listen_addr: match raw.listen_addr {
            Some(addr) => addr,
            None => DEFAULT_LISTEN_ADDR
                .parse()
                .context("Invalid default listen address")?,
        },
        slack: SlackSettings {
            channel_id: non_empty("slack.channel_id", raw.slack.channel_id)?,
            api_base_url: trim_base_url(
                raw.slack
                    .api_base_url
                    .unwrap_or_else(|| DEFAULT_SLACK_API_BASE_URL.to_string()),
            ),
            auth_token: bearer_token(SLACK_AUTH_TOKEN_ENV)?,
            signing_secret: required_env(SLACK_SIGNING_SECRET_ENV)?,
        },
        github: GithubSettings {
            owner: non_empty("github.owner", raw.github.owner)?,
            repository: non_empty("github.repository", raw.github.repository)?,
            author: AuthorIdentity {
                name: non_empty("github.author_name", raw.github.author_name)?,
                email: non_empty("github.author_email", raw.github.author_email)?,
            },
            api_base_url: trim_base_url(
                raw.github
                    .api_base_url
                    .unwrap_or_else(|| DEFAULT_GITHUB_API_BASE_URL.to_string()),
            ),
            token: bearer_token(GITHUB_TOKEN_ENV)?,
        },
        ingest,
    };

    info!(
        listen_addr = %config.listen_addr,
        channel = %config.slack.channel_id,
        repository = %format!("{}/{}", config.github.owner, config.github.repository),
        "Configuration loaded"
    );
    config.ingest.trace_loaded();
    Ok(config)
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => {
            error!(variable = name, "Secret environment variable is empty");
            Err(anyhow::anyhow!("Environment variable {name} is empty"))
        }
        Err(e) => {
            error!(error = ?e, variable = name, "Secret environment variable missing");
            Err(anyhow::anyhow!("Environment variable {name} is not set"))
        }
    }
}

/// A secret sent as `Authorization: Bearer {token}` must be a valid header value.
fn bearer_token(name: &str) -> Result<String> {
    let token = required_env(name)?;
    if HeaderValue::from_str(&format!("Bearer {token}")).is_err() {
        error!(variable = name, "Secret environment variable is not a valid HTTP header value");
        return Err(anyhow::anyhow!(
            "Environment variable {name} contains characters not allowed in an HTTP header"
        ));
    }
    Ok(token)
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(anyhow::anyhow!("Config field {field} must not be empty"));
    }
    Ok(value)
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
