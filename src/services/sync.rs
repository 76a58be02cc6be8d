use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::MetadataService;
use crate::backend::BackendEvent;
use crate::correlation::{EventRegistry, Outcome};
use crate::db::Database;
use crate::error::Result;

/// Keeps the metadata store in step with messages deleted by other clients
pub struct DeletionSync;

impl DeletionSync {
    /// Subscribe to deletions and start the task that applies them
    pub fn start(
        db: Database,
        registry: &Arc<EventRegistry>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(i64, Vec<i64>)>();

        // never done: lives as long as the registry
        registry.register(
            None,
            Box::new(|event| matches!(event, BackendEvent::MessagesDeleted { .. })),
            Box::new(move |event| {
                if let BackendEvent::MessagesDeleted {
                    chat_id,
                    message_ids,
                } = event
                {
                    let _ = tx.send((*chat_id, message_ids.clone()));
                }
                Outcome::pending()
            }),
        )?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    deleted = rx.recv() => match deleted {
                        Some((chat_id, message_ids)) => {
                            Self::apply(&db, chat_id, &message_ids).await;
                        }
                        None => break,
                    },
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::info!("Deletion sync stopped");
        }))
    }

    async fn apply(db: &Database, chat_id: i64, message_ids: &[i64]) {
        for message_id in message_ids {
            match MetadataService::delete_by_message(db, chat_id, *message_id).await {
                Ok(0) => tracing::warn!(
                    "Deleted message {} in chat {} had no file record",
                    message_id,
                    chat_id
                ),
                Ok(n) => tracing::info!(
                    "Removed {} record(s) for deleted message {} in chat {}",
                    n,
                    message_id,
                    chat_id
                ),
                Err(e) => tracing::error!(
                    "Failed to remove records for deleted message {}: {}",
                    message_id,
                    e
                ),
            }
        }
    }
}
