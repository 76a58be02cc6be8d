use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendEvent, BlobId};
use crate::error::{AppError, Result};

/// What an in-flight transfer is keyed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKey {
    Upload(PathBuf),
    Download(BlobId),
}

impl TransferKey {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferKey::Upload(_) => "upload",
            TransferKey::Download(_) => "download",
        }
    }

    /// Only one pair may watch an upload source at a time
    pub fn is_exclusive(&self) -> bool {
        matches!(self, TransferKey::Upload(_))
    }

    pub fn label(&self) -> String {
        match self {
            TransferKey::Upload(path) => path.display().to_string(),
            TransferKey::Download(blob_id) => blob_id.to_string(),
        }
    }
}

/// Handler verdict for one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub progress: Option<u8>,
    pub done: bool,
}

impl Outcome {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            progress: None,
            done: true,
        }
    }
}

pub type Predicate = Box<dyn Fn(&BackendEvent) -> bool + Send>;
pub type Handler = Box<dyn FnMut(&BackendEvent) -> Outcome + Send>;

struct Entry {
    id: u64,
    key: Option<TransferKey>,
    predicate: Predicate,
    handler: Handler,
    progress: u8,
}

/// In-flight transfer as reported by `GET /api/transfers`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransferInfo {
    pub id: u64,
    pub kind: &'static str,
    pub key: String,
    pub progress: u8,
}

/// Demultiplexer between the backend event feed and the operations waiting on it.
///
/// Handlers run under the registry lock and must only hand results off (channel sends);
/// a handler returning `done` is removed before the next event is dispatched.
pub struct EventRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a predicate/handler pair. An upload key is rejected while another pair with the
    /// same key is still registered.
    pub fn register(
        &self,
        key: Option<TransferKey>,
        predicate: Predicate,
        handler: Handler,
    ) -> Result<u64> {
        self.register_shared(key, predicate, handler).map(|(id, _)| id)
    }

    /// Like `register`, also reporting whether another pair already watches the same key.
    /// Download keys are shared: every reader of a blob gets its own pair.
    pub fn register_shared(
        &self,
        key: Option<TransferKey>,
        predicate: Predicate,
        handler: Handler,
    ) -> Result<(u64, bool)> {
        let mut entries = self.entries();
        let shared = key
            .as_ref()
            .is_some_and(|key| entries.iter().any(|e| e.key.as_ref() == Some(key)));
        if let Some(key) = key.as_ref().filter(|key| shared && key.is_exclusive()) {
            return Err(AppError::Conflict(format!(
                "{} of {} is already in flight",
                key.kind(),
                key.label()
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Entry {
            id,
            key,
            predicate,
            handler,
            progress: 0,
        });
        Ok((id, shared))
    }

    /// Remove a pair; returns false if it already completed
    pub fn deregister(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Hand one event to every matching pair, compacting out the finished ones
    pub fn dispatch(&self, event: &BackendEvent) {
        let mut entries = self.entries();
        entries.retain_mut(|entry| {
            if !(entry.predicate)(event) {
                return true;
            }
            let outcome = (entry.handler)(event);
            if let Some(progress) = outcome.progress {
                entry.progress = progress.min(100);
            }
            !outcome.done
        });
    }

    /// Drop every pair; their waiters observe a closed channel
    pub fn close(&self) {
        let dropped = std::mem::take(&mut *self.entries());
        if !dropped.is_empty() {
            tracing::warn!("Dropping {} pending correlations", dropped.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keyed pairs with their last reported progress
    pub fn transfers(&self) -> Vec<TransferInfo> {
        self.entries()
            .iter()
            .filter_map(|e| {
                e.key.as_ref().map(|key| TransferInfo {
                    id: e.id,
                    kind: key.kind(),
                    key: key.label(),
                    progress: e.progress,
                })
            })
            .collect()
    }

    /// Dispatch loop; runs until the feed closes or shutdown is requested
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BackendEvent>, shutdown: CancellationToken) {
        tracing::info!("Backend event dispatch started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        tracing::trace!("Dispatching {} event", event.kind());
                        self.dispatch(&event);
                    }
                    None => {
                        tracing::warn!("Backend event feed closed");
                        break;
                    }
                },
                _ = shutdown.cancelled() => break,
            }
        }
        self.close();
        tracing::info!("Backend event dispatch stopped");
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ConnectionState;
    use std::sync::atomic::AtomicUsize;

    fn ready() -> BackendEvent {
        BackendEvent::ConnectionStateChanged {
            state: ConnectionState::Ready,
        }
    }

    fn counting(counter: Arc<AtomicUsize>, done_after: usize) -> Handler {
        Box::new(move |_| {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if seen >= done_after {
                Outcome::done()
            } else {
                Outcome::pending()
            }
        })
    }

    #[test]
    fn test_single_shot_removal() {
        let registry = EventRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        registry
            .register(None, Box::new(|_| true), counting(first.clone(), 1))
            .unwrap();
        registry
            .register(None, Box::new(|_| true), counting(second.clone(), 2))
            .unwrap();

        registry.dispatch(&ready());
        assert_eq!(registry.len(), 1);
        registry.dispatch(&ready());
        registry.dispatch(&ready());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_adjacent_done_entries_are_not_skipped() {
        let registry = EventRegistry::new();
        let counters: Vec<_> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        for counter in &counters {
            registry
                .register(None, Box::new(|_| true), counting(counter.clone(), 1))
                .unwrap();
        }

        registry.dispatch(&ready());
        assert!(registry.is_empty());
        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_predicate_filters_events() {
        let registry = EventRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                None,
                Box::new(|e| matches!(e, BackendEvent::MessagesDeleted { .. })),
                counting(counter.clone(), 1),
            )
            .unwrap();

        registry.dispatch(&ready());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        registry.dispatch(&BackendEvent::MessagesDeleted {
            chat_id: 1,
            message_ids: vec![2],
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_key_rejected_until_released() {
        let registry = EventRegistry::new();
        let key = TransferKey::Upload(PathBuf::from("/tmp/a"));
        let id = registry
            .register(Some(key.clone()), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .unwrap();

        let err = registry
            .register(Some(key.clone()), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .unwrap_err();
        assert!(err.is_conflict());

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert!(registry
            .register(Some(key), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .is_ok());
    }

    #[test]
    fn test_download_keys_are_shared() {
        let registry = EventRegistry::new();
        let key = TransferKey::Download(3);
        let (first, shared) = registry
            .register_shared(Some(key.clone()), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .unwrap();
        assert!(!shared);

        let (second, shared) = registry
            .register_shared(Some(key.clone()), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .unwrap();
        assert!(shared);
        assert_ne!(first, second);
        assert_eq!(registry.transfers().len(), 2);

        registry.deregister(first);
        registry.deregister(second);
        let (_, shared) = registry
            .register_shared(Some(key), Box::new(|_| false), Box::new(|_| Outcome::pending()))
            .unwrap();
        assert!(!shared);
    }

    #[test]
    fn test_transfers_report_progress() {
        let registry = EventRegistry::new();
        registry
            .register(
                Some(TransferKey::Download(7)),
                Box::new(|_| true),
                Box::new(|_| Outcome::progress(42)),
            )
            .unwrap();
        registry
            .register(None, Box::new(|_| true), Box::new(|_| Outcome::pending()))
            .unwrap();

        registry.dispatch(&ready());
        let transfers = registry.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].kind, "download");
        assert_eq!(transfers[0].key, "7");
        assert_eq!(transfers[0].progress, 42);
    }

    #[tokio::test]
    async fn test_run_stops_when_feed_closes() {
        let registry = Arc::new(EventRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(None, Box::new(|_| true), counting(counter.clone(), usize::MAX))
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(registry.clone().run(rx, CancellationToken::new()));
        tx.send(ready()).await.unwrap();
        tx.send(ready()).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }
}
