//! # Inbound Slack Events endpoint
//!
//! `POST /slack/events` receives Slack Events API deliveries:
//! - every request must carry a valid v0 signature (`X-Slack-Signature`) over
//!   `v0:{X-Slack-Request-Timestamp}:{body}` made with the app's signing secret,
//!   and a timestamp no older than [`MAX_REQUEST_AGE_SECS`];
//! - `url_verification` is answered with its challenge;
//! - redeliveries (`X-Slack-Retry-Num`) are acknowledged and dropped, except for
//!   events turned away earlier because the queue was full;
//! - user messages in the configured channel are queued for the dispatch loop
//!   and acknowledged immediately.
//!
//! `GET /health` answers `ok`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use slack_assets_core::model::{FileDescriptor, FileUploadEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const RETRY_HEADER: &str = "x-slack-retry-num";
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;
/// Upper bound on event ids remembered as turned away.
pub const MAX_DEFERRED_EVENTS: usize = 256;

/// Message subtypes that never carry a fresh upload.
const IGNORED_SUBTYPES: &[&str] = &["bot_message", "message_changed", "message_deleted"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("invalid request timestamp")]
    InvalidTimestamp,

    #[error("request timestamp outside the accepted window")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

pub struct EventsState {
    pub signing_secret: String,
    pub channel_id: String,
    pub events: mpsc::Sender<FileUploadEvent>,
    /// Ids of events answered with 503; their redelivery is let through.
    deferred: Mutex<HashSet<String>>,
}

impl EventsState {
    pub fn new(
        signing_secret: String,
        channel_id: String,
        events: mpsc::Sender<FileUploadEvent>,
    ) -> Self {
        EventsState {
            signing_secret,
            channel_id,
            events,
            deferred: Mutex::new(HashSet::new()),
        }
    }

    fn defer(&self, event_id: &str) {
        let Ok(mut deferred) = self.deferred.lock() else {
            return;
        };
        if deferred.len() >= MAX_DEFERRED_EVENTS {
            warn!(event_id, "[SERVER] Too many deferred events, redelivery will be dropped");
            return;
        }
        deferred.insert(event_id.to_string());
    }

    fn take_deferred(&self, event_id: &str) -> bool {
        match self.deferred.lock() {
            Ok(mut deferred) => deferred.remove(event_id),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event_id: Option<String>,
        event: MessageEvent,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

#[derive(Debug, Deserialize)]
pub struct SlackFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub filetype: Option<String>,
    pub url_private_download: Option<String>,
    pub url_private: Option<String>,
}

impl From<SlackFile> for FileDescriptor {
    fn from(file: SlackFile) -> Self {
        FileDescriptor {
            id: file.id,
            name: file.name,
            download_url: file
                .url_private_download
                .or(file.url_private)
                .unwrap_or_default(),
            file_type: file.filetype.unwrap_or_default(),
        }
    }
}

pub fn router(state: Arc<EventsState>) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve `app` until `cancel` fires; in-flight requests are drained first.
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "[SERVER] Listening for Slack events");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("[SERVER] Stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, then cancel `cancel`.
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
        _ = cancel.cancelled() => {}
    }

    info!("Shutting down gracefully...");
    cancel.cancel();
}

async fn health() -> &'static str {
    "ok"
}

async fn slack_events(
    State(state): State<Arc<EventsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_request(&state.signing_secret, &headers, &body, now) {
        warn!(error = %e, "[SERVER] Rejected unsigned or stale request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "[SERVER] Malformed event payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope {
        Envelope::UrlVerification { challenge } => {
            info!("[SERVER] Answering url_verification");
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        Envelope::EventCallback { event_id, event } => {
            if let Some(retry) = headers.get(RETRY_HEADER) {
                let was_deferred = event_id
                    .as_deref()
                    .is_some_and(|id| state.take_deferred(id));
                if !was_deferred {
                    info!(retry = ?retry, event_id = ?event_id, "[SERVER] Dropping redelivered event");
                    return StatusCode::OK.into_response();
                }
                info!(retry = ?retry, event_id = ?event_id, "[SERVER] Retrying deferred event");
            }
            let Some(upload) = upload_event(event, &state.channel_id) else {
                return StatusCode::OK.into_response();
            };
            match state.events.try_send(upload) {
                Ok(()) => {
                    debug!("[SERVER] Event queued");
                    StatusCode::OK.into_response()
                }
                Err(e) => {
                    error!(error = %e, event_id = ?event_id, "[SERVER] Failed to queue event");
                    if let Some(id) = event_id.as_deref() {
                        state.defer(id);
                    }
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                }
            }
        }
        Envelope::Unsupported => StatusCode::OK.into_response(),
    }
}

/// Keep user messages posted in `channel_id`; drop everything else.
pub fn upload_event(event: MessageEvent, channel_id: &str) -> Option<FileUploadEvent> {
    if event.kind != "message" {
        debug!(kind = %event.kind, "[SERVER] Ignoring non-message event");
        return None;
    }
    if event.bot_id.is_some() {
        return None;
    }
    if let Some(subtype) = event.subtype.as_deref() {
        if IGNORED_SUBTYPES.contains(&subtype) {
            return None;
        }
    }
    if event.channel.as_deref() != Some(channel_id) {
        debug!(channel = ?event.channel, "[SERVER] Ignoring message from another channel");
        return None;
    }

    Some(FileUploadEvent {
        channel: event.channel,
        user: event.user,
        files: event.files.into_iter().map(FileDescriptor::from).collect(),
    })
}

/// `v0=` followed by the hex HMAC-SHA256 of `v0:{timestamp}:{body}`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_request(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let signature = header_str(headers, SIGNATURE_HEADER)?;

    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(sent_at) > MAX_REQUEST_AGE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = sign(secret, timestamp, body);
    if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}
