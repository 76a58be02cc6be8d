//! Matching fire-and-forget backend transfers back to the operations waiting on them.

pub mod registry;

pub use registry::*;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendEvent, BlobId, ConnectionState};
use crate::error::{AppError, Result};

/// Where an upload or edit ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCompletion {
    pub message_id: i64,
    pub blob_id: BlobId,
}

fn percent(done: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as u8
}

fn cancelled() -> AppError {
    AppError::Cancelled("Operation cancelled while waiting for the backend".to_string())
}

/// A registered correlation. Dropping it deregisters the pair.
pub struct Waiter<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
    registry: Arc<EventRegistry>,
}

impl<T> Waiter<T> {
    /// Block the calling task until the pair resolves or `cancel` fires
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            result = &mut self.rx => match result {
                Ok(result) => result,
                Err(_) => Err(AppError::RemoteUnavailable(
                    "Backend event feed closed".to_string(),
                )),
            },
        }
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

/// Builds correlations on top of the shared registry
#[derive(Clone)]
pub struct Correlator {
    registry: Arc<EventRegistry>,
}

impl Correlator {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    fn waiter<T>(&self, id: u64, rx: oneshot::Receiver<Result<T>>) -> Waiter<T> {
        Waiter {
            id,
            rx,
            registry: self.registry.clone(),
        }
    }

    /// Watch for the send (or edit) of `local_path` to finish
    pub fn watch_upload(&self, local_path: &Path) -> Result<Waiter<UploadCompletion>> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let target = local_path.to_path_buf();
        let matched = target.clone();

        let id = self.registry.register(
            Some(TransferKey::Upload(target)),
            Box::new(move |event| event.upload_path() == Some(matched.as_path())),
            Box::new(move |event| {
                let result = match event {
                    BackendEvent::FileUpdated { file } => {
                        return Outcome::progress(percent(file.remote.uploaded_size, file.expected_size));
                    }
                    BackendEvent::DocumentSent {
                        message_id,
                        blob_id,
                        ..
                    } => Ok(UploadCompletion {
                        message_id: *message_id,
                        blob_id: *blob_id,
                    }),
                    BackendEvent::DocumentSendFailed {
                        error_code,
                        error_message,
                        ..
                    } => Err(AppError::RemoteUnavailable(format!(
                        "Upload failed ({}): {}",
                        error_code, error_message
                    ))),
                    _ => return Outcome::pending(),
                };
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result);
                }
                Outcome::done()
            }),
        )?;
        Ok(self.waiter(id, rx))
    }

    /// Watch for blob `blob_id` to be fully materialized locally. The flag is set when another
    /// reader already watches the same blob, so its download is already being driven.
    pub fn watch_download(&self, blob_id: BlobId) -> Result<(Waiter<PathBuf>, bool)> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        // an inactive update only means failure once this download was seen running
        let mut started = false;

        let (id, joined) = self.registry.register_shared(
            Some(TransferKey::Download(blob_id)),
            Box::new(move |event| matches!(event, BackendEvent::FileUpdated { file } if file.id == blob_id)),
            Box::new(move |event| {
                let BackendEvent::FileUpdated { file } = event else {
                    return Outcome::pending();
                };
                let result = if file.local.is_downloading_completed {
                    Ok(PathBuf::from(&file.local.path))
                } else if file.local.is_downloading_active {
                    started = true;
                    return Outcome::progress(percent(file.local.downloaded_size, file.expected_size));
                } else if started {
                    Err(AppError::RemoteUnavailable(format!(
                        "Download of blob {} stopped before completion",
                        blob_id
                    )))
                } else {
                    return Outcome::pending();
                };
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result);
                }
                Outcome::done()
            }),
        )?;
        Ok((self.waiter(id, rx), joined))
    }

    pub fn watch_connection_ready(&self) -> Result<Waiter<()>> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let id = self.registry.register(
            None,
            Box::new(|event| {
                matches!(
                    event,
                    BackendEvent::ConnectionStateChanged {
                        state: ConnectionState::Ready
                    }
                )
            }),
            Box::new(move |_| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(Ok(()));
                }
                Outcome::done()
            }),
        )?;
        Ok(self.waiter(id, rx))
    }

    /// Register for `local_path`, run `start`, then wait for the correlated completion
    pub async fn await_upload_completion<F>(
        &self,
        local_path: &Path,
        start: F,
        cancel: &CancellationToken,
    ) -> Result<UploadCompletion>
    where
        F: Future<Output = Result<()>>,
    {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let waiter = self.watch_upload(local_path)?;
        start.await?;
        waiter.wait(cancel).await
    }

    /// Register for `blob_id` and wait for it to be local. `start` only runs when no other
    /// reader is already waiting on the same blob.
    pub async fn await_download_completion<F>(
        &self,
        blob_id: BlobId,
        start: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>
    where
        F: Future<Output = Result<()>>,
    {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let (waiter, joined) = self.watch_download(blob_id)?;
        if joined {
            tracing::debug!("Joining in-flight download of blob {}", blob_id);
        } else {
            start.await?;
        }
        waiter.wait(cancel).await
    }

    /// Register for the Ready state, run `start` (typically spawning the dispatch loop), then wait
    pub async fn await_connection_ready<F>(&self, start: F, cancel: &CancellationToken) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let waiter = self.watch_connection_ready()?;
        start.await?;
        waiter.wait(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalFile, RemoteFile, RemoteFileState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn correlator() -> Correlator {
        Correlator::new(Arc::new(EventRegistry::new()))
    }

    fn upload_progress(path: &str, uploaded: i64, expected: i64) -> BackendEvent {
        BackendEvent::FileUpdated {
            file: RemoteFile {
                id: 9,
                expected_size: expected,
                local: LocalFile {
                    path: path.to_string(),
                    is_downloading_completed: true,
                    ..Default::default()
                },
                remote: RemoteFileState {
                    is_uploading_active: true,
                    uploaded_size: uploaded,
                    ..Default::default()
                },
            },
        }
    }

    fn download_update(blob_id: BlobId, active: bool, completed: bool, downloaded: i64) -> BackendEvent {
        BackendEvent::FileUpdated {
            file: RemoteFile {
                id: blob_id,
                expected_size: 8,
                local: LocalFile {
                    path: if completed { "/cache/x".to_string() } else { String::new() },
                    can_be_downloaded: true,
                    is_downloading_active: active,
                    is_downloading_completed: completed,
                    downloaded_size: downloaded,
                },
                remote: RemoteFileState::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_upload_resolves_with_progress() {
        let correlator = correlator();
        let registry = correlator.registry().clone();
        let waiter = correlator.watch_upload(Path::new("/tmp/stage/a.txt")).unwrap();

        registry.dispatch(&upload_progress("/tmp/stage/other.txt", 9, 10));
        registry.dispatch(&upload_progress("/tmp/stage/a.txt", 5, 10));
        assert_eq!(registry.transfers()[0].progress, 50);

        registry.dispatch(&BackendEvent::DocumentSent {
            chat_id: 1,
            message_id: 77,
            blob_id: 9,
            local_path: "/tmp/stage/a.txt".to_string(),
        });
        assert!(registry.is_empty());

        let done = waiter.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            done,
            UploadCompletion {
                message_id: 77,
                blob_id: 9
            }
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_remote_unavailable() {
        let correlator = correlator();
        let waiter = correlator.watch_upload(Path::new("/tmp/b")).unwrap();
        correlator.registry().dispatch(&BackendEvent::DocumentSendFailed {
            chat_id: 1,
            local_path: "/tmp/b".to_string(),
            error_code: 400,
            error_message: "too big".to_string(),
        });

        let err = waiter.wait(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancellation_deregisters() {
        let correlator = correlator();
        let cancel = CancellationToken::new();
        let waiter = correlator.watch_upload(Path::new("/tmp/c")).unwrap();
        assert_eq!(correlator.registry().len(), 1);

        cancel.cancel();
        let err = waiter.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(correlator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_same_staging_path_rejected() {
        let correlator = correlator();
        let _first = correlator.watch_upload(Path::new("/tmp/d")).unwrap();
        let err = correlator.watch_upload(Path::new("/tmp/d")).err().unwrap();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_failed_start_releases_registration() {
        let correlator = correlator();
        let err = correlator
            .await_upload_completion(
                Path::new("/tmp/e"),
                async { Err(AppError::RemoteUnavailable("offline".to_string())) },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteUnavailable(_)));
        assert!(correlator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_download_ignores_stale_inactive_update() {
        let correlator = correlator();
        let registry = correlator.registry().clone();
        let (waiter, joined) = correlator.watch_download(4).unwrap();
        assert!(!joined);

        // left over from a cancelled earlier download
        registry.dispatch(&download_update(4, false, false, 0));
        assert_eq!(registry.len(), 1);

        registry.dispatch(&download_update(4, true, false, 2));
        assert_eq!(registry.transfers()[0].progress, 25);
        registry.dispatch(&download_update(4, false, true, 8));

        let path = waiter.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(path, PathBuf::from("/cache/x"));
    }

    #[tokio::test]
    async fn test_download_stopped_after_start_fails() {
        let correlator = correlator();
        let registry = correlator.registry().clone();
        let (waiter, _) = correlator.watch_download(5).unwrap();

        registry.dispatch(&download_update(5, true, false, 1));
        registry.dispatch(&download_update(5, false, false, 0));

        let err = waiter.wait(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_await_connection_ready_with_dispatch_loop() {
        let correlator = correlator();
        let registry = correlator.registry().clone();
        let shutdown = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(BackendEvent::ConnectionStateChanged {
            state: ConnectionState::Ready,
        })
        .await
        .unwrap();

        correlator
            .await_connection_ready(
                async {
                    tokio::spawn(registry.clone().run(rx, shutdown.clone()));
                    Ok(())
                },
                &shutdown,
            )
            .await
            .unwrap();
        assert!(registry.is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_download() {
        let correlator = correlator();
        let registry = correlator.registry().clone();
        let cancel = CancellationToken::new();
        let starts = &AtomicUsize::new(0);
        let start = || async move {
            starts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(())
        };

        let first = correlator.await_download_completion(6, start(), &cancel);
        let second = correlator.await_download_completion(6, start(), &cancel);
        let finish = async {
            while registry.len() < 2 {
                tokio::task::yield_now().await;
            }
            registry.dispatch(&download_update(6, true, false, 4));
            registry.dispatch(&download_update(6, false, true, 8));
        };

        let (first, second, _) = tokio::join!(first, second, finish);
        assert_eq!(first.unwrap(), PathBuf::from("/cache/x"));
        assert_eq!(second.unwrap(), PathBuf::from("/cache/x"));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_connection_ready() {
        let correlator = correlator();
        let waiter = correlator.watch_connection_ready().unwrap();
        correlator.registry().dispatch(&BackendEvent::ConnectionStateChanged {
            state: ConnectionState::Connecting,
        });
        correlator.registry().dispatch(&BackendEvent::ConnectionStateChanged {
            state: ConnectionState::Ready,
        });
        assert!(waiter.wait(&CancellationToken::new()).await.is_ok());
    }
}
