use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::events::{BackendEvent, ConnectionState};
use super::provider::{
    BackingService, BlobId, ChatPermissions, ChatSelector, Container, Document, LocalFile,
    Message, OptimizePolicy, OptimizeStats, RemoteFile, RemoteFileState,
};
use crate::error::{AppError, Result};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    content_key: String,
    file_name: String,
    size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    id: i64,
    chat_id: i64,
    caption: String,
    document: Option<StoredDocument>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_message_id: i64,
    chats: Vec<Container>,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Clone)]
struct BlobEntry {
    /// None while the first upload is still running
    content_key: Option<String>,
    expected_size: i64,
    local: LocalFile,
    remote: RemoteFileState,
    materialized_at: SystemTime,
    last_access: SystemTime,
}

impl BlobEntry {
    fn snapshot(&self, id: BlobId) -> RemoteFile {
        RemoteFile {
            id,
            expected_size: self.expected_size,
            local: self.local.clone(),
            remote: self.remote.clone(),
        }
    }
}

#[derive(Default)]
struct LocalState {
    chats: HashMap<i64, Container>,
    messages: HashMap<(i64, i64), StoredMessage>,
    message_blobs: HashMap<(i64, i64), BlobId>,
    blobs: HashMap<BlobId, BlobEntry>,
    downloads: HashMap<BlobId, CancellationToken>,
    next_message_id: i64,
    next_blob_id: BlobId,
}

impl LocalState {
    fn issue_blob(&mut self, entry: BlobEntry) -> BlobId {
        self.next_blob_id += 1;
        let id = self.next_blob_id;
        self.blobs.insert(id, entry);
        id
    }

    fn remote_blob(&mut self, content_key: &str, size: i64) -> BlobId {
        let now = SystemTime::now();
        self.issue_blob(BlobEntry {
            content_key: Some(content_key.to_string()),
            expected_size: size,
            local: LocalFile {
                can_be_downloaded: true,
                ..Default::default()
            },
            remote: RemoteFileState {
                is_uploading_completed: true,
                uploaded_size: size,
                ..Default::default()
            },
            materialized_at: now,
            last_access: now,
        })
    }

    fn chat(&self, chat_id: i64) -> Result<&Container> {
        self.chats
            .get(&chat_id)
            .ok_or_else(|| AppError::NotFound(format!("Chat {} not found", chat_id)))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            next_message_id: self.next_message_id,
            chats: self.chats.values().cloned().collect(),
            messages: self.messages.values().cloned().collect(),
        }
    }
}

enum Transfer {
    Send,
    Edit { message_id: i64 },
}

/// Backing service simulated on local disk.
///
/// Documents live under `<root>/remote`, materialized blobs under `<root>/cache`. Transfers run
/// on spawned tasks and report through the event feed the same way a chat client does.
pub struct LocalBackend {
    this: Weak<LocalBackend>,
    root: PathBuf,
    chunk_size: usize,
    events: mpsc::Sender<BackendEvent>,
    state: Mutex<LocalState>,
    persist_lock: tokio::sync::Mutex<()>,
    reject_deletes: AtomicBool,
}

impl LocalBackend {
    /// Open (or initialize) the store under `root` and return its event feed
    pub async fn open(
        root: impl Into<PathBuf>,
        chunk_size: usize,
        event_buffer: usize,
    ) -> Result<(Arc<Self>, mpsc::Receiver<BackendEvent>)> {
        let root = root.into();
        fs::create_dir_all(root.join("remote")).await?;
        fs::create_dir_all(root.join("cache")).await?;

        // room for the connection updates emitted before the feed is handed out
        let (tx, rx) = mpsc::channel(event_buffer.max(8));
        let mut state = LocalState::default();

        let index = root.join(INDEX_FILE);
        if fs::try_exists(&index).await? {
            let raw = fs::read_to_string(&index).await?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .map_err(|e| AppError::Internal(format!("Corrupt backend index: {}", e)))?;
            state.next_message_id = snapshot.next_message_id;
            for chat in snapshot.chats {
                state.chats.insert(chat.id, chat);
            }
            for message in snapshot.messages {
                let key = (message.chat_id, message.id);
                // blob handles do not survive a restart
                if let Some(doc) = &message.document {
                    let blob_id = state.remote_blob(&doc.content_key, doc.size);
                    state.message_blobs.insert(key, blob_id);
                }
                state.messages.insert(key, message);
            }
            tracing::info!(
                "Loaded local backend index: {} chats, {} messages",
                state.chats.len(),
                state.messages.len()
            );
        }

        let backend = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            root,
            chunk_size: chunk_size.max(1),
            events: tx,
            state: Mutex::new(state),
            persist_lock: tokio::sync::Mutex::new(()),
            reject_deletes: AtomicBool::new(false),
        });

        backend
            .emit(BackendEvent::ConnectionStateChanged {
                state: ConnectionState::Connecting,
            })
            .await;
        backend
            .emit(BackendEvent::ConnectionStateChanged {
                state: ConnectionState::Ready,
            })
            .await;

        Ok((backend, rx))
    }

    /// Register a chat; an existing chat with the same id is replaced
    pub async fn add_chat(&self, container: Container) -> Result<()> {
        self.state().chats.insert(container.id, container);
        self.persist().await
    }

    /// Chat that allows everything a drive needs
    pub fn writable_chat(id: i64, title: &str) -> Container {
        Container {
            id,
            title: title.to_string(),
            permissions: ChatPermissions {
                can_send_messages: true,
                can_send_documents: true,
            },
        }
    }

    /// Delete a message as another client would, announcing it on the feed
    pub async fn delete_externally(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.remove_message(chat_id, message_id).await?;
        self.emit(BackendEvent::MessagesDeleted {
            chat_id,
            message_ids: vec![message_id],
        })
        .await;
        Ok(())
    }

    /// Make `delete_message` fail, as an unreachable service would
    pub fn set_reject_deletes(&self, reject: bool) {
        self.reject_deletes.store(reject, Ordering::SeqCst);
    }

    fn handle(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| AppError::RemoteUnavailable("Local backend is shutting down".to_string()))
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remote_path(&self, content_key: &str) -> PathBuf {
        self.root.join("remote").join(content_key)
    }

    fn cache_path(&self, blob_id: BlobId) -> PathBuf {
        self.root.join("cache").join(blob_id.to_string())
    }

    async fn emit(&self, event: BackendEvent) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("Backend event feed closed, dropping event");
        }
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.state().snapshot();
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| AppError::Internal(format!("Failed to encode backend index: {}", e)))?;
        fs::write(self.root.join(INDEX_FILE), raw).await?;
        Ok(())
    }

    async fn remove_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let (message, blob) = {
            let mut state = self.state();
            let message = state.messages.remove(&(chat_id, message_id)).ok_or_else(|| {
                AppError::NotFound(format!("Message {} not found in chat {}", message_id, chat_id))
            })?;
            let blob = state.message_blobs.remove(&(chat_id, message_id));
            if let Some(blob_id) = blob {
                state.blobs.remove(&blob_id);
            }
            (message, blob)
        };

        if let Some(doc) = message.document {
            remove_if_exists(&self.remote_path(&doc.content_key)).await?;
        }
        if let Some(blob_id) = blob {
            remove_if_exists(&self.cache_path(blob_id)).await?;
        }
        self.persist().await
    }

    /// Validate a transfer and register the blob that tracks its progress
    async fn begin_upload(&self, chat_id: i64, local_path: &Path) -> Result<(BlobId, i64)> {
        let size = fs::metadata(local_path)
            .await
            .map_err(|e| {
                AppError::RemoteUnavailable(format!("Cannot read {}: {}", local_path.display(), e))
            })?
            .len() as i64;

        let mut state = self.state();
        let chat = state.chat(chat_id)?;
        if !chat.permissions.can_send_documents {
            return Err(AppError::RemoteUnavailable(format!(
                "Sending documents to chat {} is not allowed",
                chat_id
            )));
        }

        let now = SystemTime::now();
        let blob_id = state.issue_blob(BlobEntry {
            content_key: None,
            expected_size: size,
            local: LocalFile {
                path: local_path.to_string_lossy().into_owned(),
                can_be_downloaded: false,
                is_downloading_active: false,
                is_downloading_completed: true,
                downloaded_size: size,
            },
            remote: RemoteFileState {
                is_uploading_active: true,
                ..Default::default()
            },
            materialized_at: now,
            last_access: now,
        });
        Ok((blob_id, size))
    }

    async fn run_upload(
        self: Arc<Self>,
        transfer: Transfer,
        chat_id: i64,
        blob_id: BlobId,
        local_path: PathBuf,
        caption: String,
    ) {
        let local = local_path.to_string_lossy().into_owned();
        match self
            .copy_upload(transfer, chat_id, blob_id, &local_path, caption)
            .await
        {
            Ok(message_id) => {
                tracing::debug!("Uploaded {} as message {} (blob {})", local, message_id, blob_id);
                self.emit(BackendEvent::DocumentSent {
                    chat_id,
                    message_id,
                    blob_id,
                    local_path: local,
                })
                .await;
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", local, e);
                self.state().blobs.remove(&blob_id);
                self.emit(BackendEvent::DocumentSendFailed {
                    chat_id,
                    local_path: local,
                    error_code: 500,
                    error_message: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn copy_upload(
        &self,
        transfer: Transfer,
        chat_id: i64,
        blob_id: BlobId,
        local_path: &Path,
        caption: String,
    ) -> Result<i64> {
        let content_key = uuid::Uuid::new_v4().simple().to_string();
        let target = self.remote_path(&content_key);

        let mut source = fs::File::open(local_path).await?;
        let mut dest = fs::File::create(&target).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut uploaded: i64 = 0;
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n]).await?;
            uploaded += n as i64;

            let progress = {
                let mut state = self.state();
                let entry = state
                    .blobs
                    .get_mut(&blob_id)
                    .ok_or_else(|| AppError::NotFound(format!("Blob {} vanished", blob_id)))?;
                entry.remote.uploaded_size = uploaded;
                entry.snapshot(blob_id)
            };
            self.emit(BackendEvent::FileUpdated { file: progress }).await;
        }
        dest.flush().await?;
        dest.sync_all().await?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (message_id, replaced, completed) = {
            let mut state = self.state();
            let message_id = match transfer {
                Transfer::Send => {
                    state.next_message_id += 1;
                    state.next_message_id
                }
                Transfer::Edit { message_id } => message_id,
            };
            let key = (chat_id, message_id);

            let replaced = match transfer {
                Transfer::Edit { .. } => {
                    let old = state.messages.get(&key).cloned().ok_or_else(|| {
                        AppError::NotFound(format!("Message {} was deleted during edit", message_id))
                    })?;
                    if let Some(old_blob) = state.message_blobs.remove(&key) {
                        state.blobs.remove(&old_blob);
                        Some((old.document.map(|d| d.content_key), Some(old_blob)))
                    } else {
                        Some((old.document.map(|d| d.content_key), None))
                    }
                }
                Transfer::Send => None,
            };

            state.messages.insert(
                key,
                StoredMessage {
                    id: message_id,
                    chat_id,
                    caption,
                    document: Some(StoredDocument {
                        content_key: content_key.clone(),
                        file_name,
                        size: uploaded,
                    }),
                },
            );
            state.message_blobs.insert(key, blob_id);

            let entry = state
                .blobs
                .get_mut(&blob_id)
                .ok_or_else(|| AppError::NotFound(format!("Blob {} vanished", blob_id)))?;
            entry.content_key = Some(content_key);
            entry.expected_size = uploaded;
            entry.remote = RemoteFileState {
                is_uploading_active: false,
                is_uploading_completed: true,
                uploaded_size: uploaded,
            };
            entry.local.can_be_downloaded = true;
            (message_id, replaced, entry.snapshot(blob_id))
        };

        if let Some((old_key, old_blob)) = replaced {
            if let Some(old_key) = old_key {
                remove_if_exists(&self.remote_path(&old_key)).await?;
            }
            if let Some(old_blob) = old_blob {
                remove_if_exists(&self.cache_path(old_blob)).await?;
            }
        }

        self.persist().await?;
        self.emit(BackendEvent::FileUpdated { file: completed }).await;
        Ok(message_id)
    }

    async fn run_download(self: Arc<Self>, blob_id: BlobId, content_key: String, cancel: CancellationToken) {
        let result = tokio::select! {
            result = self.copy_download(blob_id, &content_key) => result,
            _ = cancel.cancelled() => return,
        };

        let update = {
            let mut state = self.state();
            state.downloads.remove(&blob_id);
            let Some(entry) = state.blobs.get_mut(&blob_id) else {
                return;
            };
            entry.local.is_downloading_active = false;
            match &result {
                Ok(size) => {
                    let now = SystemTime::now();
                    entry.local.path = self.cache_path(blob_id).to_string_lossy().into_owned();
                    entry.local.is_downloading_completed = true;
                    entry.local.downloaded_size = *size;
                    entry.materialized_at = now;
                    entry.last_access = now;
                }
                Err(e) => {
                    tracing::warn!("Download of blob {} failed: {}", blob_id, e);
                    entry.local.downloaded_size = 0;
                }
            }
            entry.snapshot(blob_id)
        };
        self.emit(BackendEvent::FileUpdated { file: update }).await;
    }

    async fn copy_download(&self, blob_id: BlobId, content_key: &str) -> Result<i64> {
        let mut source = fs::File::open(self.remote_path(content_key)).await?;
        let mut dest = fs::File::create(self.cache_path(blob_id)).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut downloaded: i64 = 0;
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n]).await?;
            downloaded += n as i64;

            let progress = {
                let mut state = self.state();
                match state.blobs.get_mut(&blob_id) {
                    Some(entry) => {
                        entry.local.downloaded_size = downloaded;
                        entry.snapshot(blob_id)
                    }
                    None => return Err(AppError::NotFound(format!("Blob {} vanished", blob_id))),
                }
            };
            self.emit(BackendEvent::FileUpdated { file: progress }).await;
        }
        dest.flush().await?;
        dest.sync_all().await?;
        Ok(downloaded)
    }

    fn start_upload(
        &self,
        transfer: Transfer,
        chat_id: i64,
        blob_id: BlobId,
        local_path: &Path,
        caption: &str,
    ) -> Result<()> {
        tokio::spawn(self.handle()?.run_upload(
            transfer,
            chat_id,
            blob_id,
            local_path.to_path_buf(),
            caption.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl BackingService for LocalBackend {
    async fn find_container(&self, selector: &ChatSelector) -> Result<Container> {
        let state = self.state();
        if let Some(name) = selector.name.as_deref().filter(|n| !n.is_empty()) {
            let found: Vec<&Container> = state.chats.values().filter(|c| c.title == name).collect();
            return match found.as_slice() {
                [chat] => Ok((*chat).clone()),
                _ => Err(AppError::NotFound(format!(
                    "Wrong number of chats named {:?}: want 1, found {}",
                    name,
                    found.len()
                ))),
            };
        }

        match selector.id {
            Some(id) => state.chat(id).cloned(),
            None => Err(AppError::InvalidArgument(
                "Neither chat name nor chat id configured".to_string(),
            )),
        }
    }

    async fn send_document(&self, chat_id: i64, local_path: &Path, caption: &str) -> Result<()> {
        let (blob_id, size) = self.begin_upload(chat_id, local_path).await?;
        tracing::debug!("Sending {} ({} bytes) as blob {}", local_path.display(), size, blob_id);
        self.start_upload(Transfer::Send, chat_id, blob_id, local_path, caption)
    }

    async fn edit_document(
        &self,
        chat_id: i64,
        message_id: i64,
        local_path: &Path,
        caption: &str,
    ) -> Result<()> {
        if !self.state().messages.contains_key(&(chat_id, message_id)) {
            return Err(AppError::NotFound(format!(
                "Message {} not found in chat {}",
                message_id, chat_id
            )));
        }
        let (blob_id, _) = self.begin_upload(chat_id, local_path).await?;
        self.start_upload(Transfer::Edit { message_id }, chat_id, blob_id, local_path, caption)
    }

    async fn edit_caption(&self, chat_id: i64, message_id: i64, caption: &str) -> Result<()> {
        {
            let mut state = self.state();
            let message = state.messages.get_mut(&(chat_id, message_id)).ok_or_else(|| {
                AppError::NotFound(format!("Message {} not found in chat {}", message_id, chat_id))
            })?;
            message.caption = caption.to_string();
        }
        self.persist().await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        if self.reject_deletes.load(Ordering::SeqCst) {
            return Err(AppError::RemoteUnavailable(format!(
                "Deleting message {} failed",
                message_id
            )));
        }
        self.remove_message(chat_id, message_id).await
    }

    async fn ensure_messages_known(&self, chat_id: i64, message_ids: &[i64]) -> Result<()> {
        let state = self.state();
        for id in message_ids {
            if !state.messages.contains_key(&(chat_id, *id)) {
                return Err(AppError::NotFound(format!(
                    "Message {} not found in chat {}",
                    id, chat_id
                )));
            }
        }
        Ok(())
    }

    async fn get_message(&self, chat_id: i64, message_id: i64) -> Result<Message> {
        let state = self.state();
        let key = (chat_id, message_id);
        let stored = state.messages.get(&key).ok_or_else(|| {
            AppError::NotFound(format!("Message {} not found in chat {}", message_id, chat_id))
        })?;

        let document = match (&stored.document, state.message_blobs.get(&key)) {
            (Some(doc), Some(blob_id)) => Some(Document {
                blob_id: *blob_id,
                file_name: doc.file_name.clone(),
                size: doc.size,
            }),
            _ => None,
        };

        Ok(Message {
            id: stored.id,
            chat_id: stored.chat_id,
            caption: stored.caption.clone(),
            document,
        })
    }

    async fn get_file(&self, blob_id: BlobId) -> Result<RemoteFile> {
        let mut state = self.state();
        let entry = state
            .blobs
            .get_mut(&blob_id)
            .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob_id)))?;
        entry.last_access = SystemTime::now();
        Ok(entry.snapshot(blob_id))
    }

    async fn download_file(&self, blob_id: BlobId) -> Result<()> {
        let (content_key, cancel, start) = {
            let mut state = self.state();
            let entry = state
                .blobs
                .get_mut(&blob_id)
                .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob_id)))?;
            let content_key = entry.content_key.clone().ok_or_else(|| {
                AppError::RemoteUnavailable(format!("Blob {} is still uploading", blob_id))
            })?;
            if entry.local.is_downloading_active {
                return Ok(());
            }
            if entry.local.is_downloading_completed {
                // a reader that missed the terminal update still gets one
                (content_key, None, entry.snapshot(blob_id))
            } else {
                entry.local.is_downloading_active = true;
                entry.local.downloaded_size = 0;
                entry.last_access = SystemTime::now();
                let start = entry.snapshot(blob_id);

                let cancel = CancellationToken::new();
                state.downloads.insert(blob_id, cancel.clone());
                (content_key, Some(cancel), start)
            }
        };

        // a fresh download always announces itself as active before the terminal update
        self.emit(BackendEvent::FileUpdated { file: start }).await;
        if let Some(cancel) = cancel {
            tokio::spawn(self.handle()?.run_download(blob_id, content_key, cancel));
        }
        Ok(())
    }

    async fn cancel_download(&self, blob_id: BlobId) -> Result<()> {
        let update = {
            let mut state = self.state();
            let Some(token) = state.downloads.remove(&blob_id) else {
                return Ok(());
            };
            token.cancel();
            let entry = state
                .blobs
                .get_mut(&blob_id)
                .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob_id)))?;
            entry.local.is_downloading_active = false;
            entry.local.downloaded_size = 0;
            entry.snapshot(blob_id)
        };
        remove_if_exists(&self.cache_path(blob_id)).await?;
        self.emit(BackendEvent::FileUpdated { file: update }).await;
        Ok(())
    }

    async fn delete_local_file(&self, blob_id: BlobId) -> Result<()> {
        let cache_path = self.cache_path(blob_id);
        {
            let mut state = self.state();
            let entry = state
                .blobs
                .get_mut(&blob_id)
                .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob_id)))?;
            entry.local = LocalFile {
                can_be_downloaded: entry.content_key.is_some(),
                ..Default::default()
            };
        }
        // paths outside the cache (upload sources) belong to the caller
        remove_if_exists(&cache_path).await
    }

    async fn optimize_storage(&self, policy: &OptimizePolicy) -> Result<OptimizeStats> {
        let now = SystemTime::now();
        let age = |t: SystemTime| now.duration_since(t).unwrap_or_default();

        let mut candidates: Vec<(BlobId, SystemTime, SystemTime, u64)> = {
            let state = self.state();
            state
                .blobs
                .iter()
                .filter(|(id, e)| {
                    e.local.is_downloading_completed
                        && !e.local.is_downloading_active
                        && Path::new(&e.local.path) == self.cache_path(**id)
                })
                .map(|(id, e)| (*id, e.last_access, e.materialized_at, e.local.downloaded_size as u64))
                .collect()
        };
        candidates.sort_by_key(|(_, last_access, _, _)| *last_access);

        let mut total_size: u64 = candidates.iter().map(|c| c.3).sum();
        let mut total_count = candidates.len();
        let mut evict = Vec::new();
        for (id, last_access, materialized_at, size) in candidates {
            if age(materialized_at) < policy.immunity {
                continue;
            }
            let stale = age(last_access) > policy.unaccessed;
            let over = total_size > policy.max_total_size || total_count > policy.max_files_count;
            if stale || over {
                total_size -= size;
                total_count -= 1;
                evict.push((id, size));
            }
        }

        let mut stats = OptimizeStats::default();
        for (id, size) in evict {
            self.delete_local_file(id).await?;
            stats.count += 1;
            stats.size += size;
        }
        Ok(stats)
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("cache"))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
