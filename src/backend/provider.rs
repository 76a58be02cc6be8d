use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Ephemeral handle of a blob; re-issued on every upload and download
pub type BlobId = i64;

/// How a principal names their container
#[derive(Debug, Clone, Default)]
pub struct ChatSelector {
    pub name: Option<String>,
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPermissions {
    pub can_send_messages: bool,
    pub can_send_documents: bool,
}

/// A chat acting as one principal's container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: i64,
    pub title: String,
    pub permissions: ChatPermissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub blob_id: BlobId,
    pub file_name: String,
    pub size: i64,
}

/// A posted item; file content lives in its document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub caption: String,
    pub document: Option<Document>,
}

/// Local side of a blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub can_be_downloaded: bool,
    #[serde(default)]
    pub is_downloading_active: bool,
    #[serde(default)]
    pub is_downloading_completed: bool,
    #[serde(default)]
    pub downloaded_size: i64,
}

/// Remote side of a blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFileState {
    #[serde(default)]
    pub is_uploading_active: bool,
    #[serde(default)]
    pub is_uploading_completed: bool,
    #[serde(default)]
    pub uploaded_size: i64,
}

/// Snapshot of a blob's transfer state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: BlobId,
    #[serde(default)]
    pub expected_size: i64,
    #[serde(default)]
    pub local: LocalFile,
    #[serde(default)]
    pub remote: RemoteFileState,
}

/// Compaction limits for locally materialized blobs
#[derive(Debug, Clone)]
pub struct OptimizePolicy {
    pub max_total_size: u64,
    pub max_files_count: usize,
    /// Copies untouched for longer than this are evicted
    pub unaccessed: Duration,
    /// Copies younger than this are never evicted
    pub immunity: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizeStats {
    pub count: usize,
    pub size: u64,
}

/// Primitives of the backing message service.
///
/// Transfers are fire-and-forget: `send_document`, `edit_document` and `download_file`
/// return once the transfer is started, completion arrives on the event stream.
#[async_trait]
pub trait BackingService: Send + Sync {
    /// Resolve a container by name (exactly one match) or id
    async fn find_container(&self, selector: &ChatSelector) -> Result<Container>;

    /// Start uploading `local_path` as a new document message
    async fn send_document(&self, chat_id: i64, local_path: &Path, caption: &str) -> Result<()>;

    /// Start replacing the document of an existing message
    async fn edit_document(
        &self,
        chat_id: i64,
        message_id: i64,
        local_path: &Path,
        caption: &str,
    ) -> Result<()>;

    async fn edit_caption(&self, chat_id: i64, message_id: i64, caption: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Make the client aware of messages it has not seen yet
    async fn ensure_messages_known(&self, chat_id: i64, message_ids: &[i64]) -> Result<()>;

    async fn get_message(&self, chat_id: i64, message_id: i64) -> Result<Message>;

    async fn get_file(&self, blob_id: BlobId) -> Result<RemoteFile>;

    /// Start materializing a blob locally
    async fn download_file(&self, blob_id: BlobId) -> Result<()>;

    async fn cancel_download(&self, blob_id: BlobId) -> Result<()>;

    /// Drop the client's local copy of a blob
    async fn delete_local_file(&self, blob_id: BlobId) -> Result<()>;

    async fn optimize_storage(&self, policy: &OptimizePolicy) -> Result<OptimizeStats>;

    /// Where materialized blobs live, if the backend keeps them on disk
    fn cache_dir(&self) -> Option<PathBuf> {
        None
    }

    fn name(&self) -> &'static str;
}
