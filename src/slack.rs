//! # Slack binding of [`MessageSystem`]
//!
//! - [`SlackClient::publish_message`] posts one attachment to `chat.postMessage`
//!   in the configured channel, coloured by the notification style.
//! - [`SlackClient::download_file`] fetches a private file URL with the bot token
//!   through the core archive materializer.
//!
//! Slack answers most API failures with HTTP 200 and `{"ok": false, "error": ...}`;
//! those are surfaced as [`NotifyError::Rejected`].

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use slack_assets_core::archive;
use slack_assets_core::contract::MessageSystem;
use slack_assets_core::error::{FetchError, NotifyError};
use slack_assets_core::model::{AssetFile, Notification, NotificationStyle};
use std::path::PathBuf;
use tracing::{error, info};

use crate::load_config::SlackSettings;

pub const SUCCESS_COLOR: &str = "#36a64f";
pub const ERROR_COLOR: &str = "#e63939";

pub struct SlackClient {
    http: reqwest::Client,
    api_base_url: String,
    channel_id: String,
    authorization: Option<HeaderValue>,
    scratch_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    pretext: &'a str,
    text: &'a str,
    color: &'static str,
    fields: Vec<AttachmentField>,
}

#[derive(Debug, Serialize)]
struct AttachmentField {
    title: &'static str,
    value: String,
    short: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, settings: &SlackSettings, scratch_dir: PathBuf) -> Self {
        info!(
            channel = %settings.channel_id,
            api_base_url = %settings.api_base_url,
            "Initialized SlackClient"
        );
        let authorization = HeaderValue::from_str(&format!("Bearer {}", settings.auth_token)).ok();
        if authorization.is_none() {
            error!("Slack token is not a valid header value; requests go out unauthenticated");
        }
        SlackClient {
            http,
            api_base_url: settings.api_base_url.clone(),
            channel_id: settings.channel_id.clone(),
            authorization,
            scratch_dir,
        }
    }

    fn bearer(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = &self.authorization {
            headers.insert(AUTHORIZATION, value.clone());
        }
        headers
    }
}

pub fn notification_color(style: NotificationStyle) -> &'static str {
    match style {
        NotificationStyle::Success => SUCCESS_COLOR,
        NotificationStyle::Error => ERROR_COLOR,
    }
}

#[async_trait]
impl MessageSystem for SlackClient {
    async fn publish_message(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = PostMessage {
            channel: &self.channel_id,
            attachments: vec![Attachment {
                pretext: &notification.title,
                text: &notification.body,
                color: notification_color(notification.style),
                fields: vec![AttachmentField {
                    title: "Date",
                    value: Utc::now().to_rfc2822(),
                    short: false,
                }],
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base_url))
            .headers(self.bearer())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "[SLACK] chat.postMessage returned an error status");
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }

        let reply: ApiResponse = response.json().await?;
        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "unknown_error".to_string());
            error!(reason = %reason, "[SLACK] chat.postMessage rejected");
            return Err(NotifyError::Rejected(reason));
        }

        info!(channel = %self.channel_id, title = %notification.title, "[SLACK] Message published");
        Ok(())
    }

    async fn download_file(&self, file: &AssetFile) -> Result<PathBuf, FetchError> {
        archive::fetch(
            &self.http,
            &file.url,
            self.bearer(),
            &file.extension,
            &self.scratch_dir,
        )
        .await
    }
}
