use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::vfs::path;

/// Permission bits plus the directory flag, stored as `file_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMode(pub u32);

impl FileMode {
    pub const DIR: u32 = 0o040000;
    pub const PERM_MASK: u32 = 0o7777;

    pub fn dir(perm: u32) -> Self {
        Self((perm & Self::PERM_MASK) | Self::DIR)
    }

    pub fn file(perm: u32) -> Self {
        Self(perm & Self::PERM_MASK)
    }

    pub fn is_dir(&self) -> bool {
        self.0 & Self::DIR != 0
    }

    pub fn perm(&self) -> u32 {
        self.0 & Self::PERM_MASK
    }
}

/// One file or directory of one owner
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub blob_id: Option<i64>,
    /// Cleaned parent path
    pub file_path: String,
    /// Leaf name, empty only for the root record
    pub file_name: String,
    pub size: i64,
    pub file_mode: i64,
    pub mod_time: String,
    pub is_dir: bool,
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    /// Unsaved directory record
    pub fn new_dir(user_id: &str, abs_path: &str, perm: u32) -> Self {
        let (parent, name) = path::split(abs_path);
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chat_id: None,
            message_id: None,
            blob_id: None,
            file_path: parent,
            file_name: name,
            size: 0,
            file_mode: FileMode::dir(perm).0 as i64,
            mod_time: now.clone(),
            is_dir: true,
            metadata: "{}".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Unsaved file record; remote linkage is filled in after the first upload
    pub fn new_file(user_id: &str, chat_id: i64, abs_path: &str, perm: u32) -> Self {
        let (parent, name) = path::split(abs_path);
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chat_id: Some(chat_id),
            message_id: None,
            blob_id: None,
            file_path: parent,
            file_name: name,
            size: 0,
            file_mode: FileMode::file(perm).0 as i64,
            mod_time: now.clone(),
            is_dir: false,
            metadata: "{}".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Stand-in for a root directory that has not been stored yet
    pub fn implicit_root(user_id: &str) -> Self {
        let mut root = Self::new_dir(user_id, path::ROOT, 0o777);
        root.id = String::new();
        root
    }

    pub fn abs_path(&self) -> String {
        path::join(&self.file_path, &self.file_name)
    }

    pub fn mode(&self) -> FileMode {
        FileMode(self.file_mode as u32)
    }

    pub fn is_root(&self) -> bool {
        self.file_name.is_empty()
    }

    /// Whether this record exists in the store
    pub fn is_stored(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Stat/listing view of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: i64,
    pub mode: u32,
    pub mod_time: String,
    pub is_dir: bool,
}

impl From<&FileRecord> for FileInfo {
    fn from(file: &FileRecord) -> Self {
        Self {
            name: file.file_name.clone(),
            path: file.abs_path(),
            size: file.size,
            mode: file.mode().0,
            mod_time: file.mod_time.clone(),
            is_dir: file.is_dir,
        }
    }
}

impl From<FileRecord> for FileInfo {
    fn from(file: FileRecord) -> Self {
        Self::from(&file)
    }
}

/// One page of a directory listing
#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub path: String,
    pub total: usize,
    pub offset: usize,
    pub entries: Vec<FileInfo>,
}

/// Annotation attached to every uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCaption {
    pub path: String,
    pub size: i64,
    pub updated_at: String,
}

impl DocumentCaption {
    pub fn new(path: &str, size: i64) -> Self {
        Self {
            path: path.to_string(),
            size,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.path.clone())
    }

    pub fn decode(caption: &str) -> Option<Self> {
        serde_json::from_str(caption).ok()
    }
}

/// Create directory request
#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
    #[serde(default)]
    pub parents: bool,
    #[serde(default = "default_dir_perm")]
    pub mode: u32,
}

/// Rename request
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub from: String,
    pub to: String,
}

/// Query parameters for path endpoints
#[derive(Debug, Default, Deserialize)]
pub struct FsQuery {
    pub offset: Option<usize>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub recursive: bool,
}

fn default_dir_perm() -> u32 {
    0o755
}
