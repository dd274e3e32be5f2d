//! Event dispatch loop.
//!
//! Single receiver, one spawned task per event. The loop never waits on an
//! ingestion run and never stops because one failed; only cancellation (or
//! all senders going away) ends it. Runs already spawned keep going and can be
//! awaited through the [`TaskTracker`].

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::contract::{MessageSystem, RepositoryHost};
use crate::ingest::AssetIngestor;
use crate::model::FileUploadEvent;

pub async fn dispatch_events<M, R>(
    mut events: mpsc::Receiver<FileUploadEvent>,
    ingestor: Arc<AssetIngestor<M, R>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) where
    M: MessageSystem + 'static,
    R: RepositoryHost + 'static,
{
    info!("[DISPATCH] Listening for upload events");
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("[DISPATCH] Cancellation requested, no longer accepting events");
                break;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    info!("[DISPATCH] Event channel closed");
                    break;
                }
            },
        };

        let ingestor = Arc::clone(&ingestor);
        tracker.spawn(async move {
            match ingestor.handle_event(&event).await {
                Ok(url) => info!(url = %url, "[DISPATCH] Event processed"),
                Err(e) => error!(error = %e, "[DISPATCH] Failed to process event"),
            }
        });
    }
}
