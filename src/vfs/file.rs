use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::driver::Driver;
use super::flags::OpenFlags;
use super::handle::{Readable, Writable};
use super::path;
use crate::backend::{BackingService, Message};
use crate::error::{AppError, Result};
use crate::models::{DocumentCaption, FileRecord};
use crate::services::MetadataService;

/// What closing the handle has to do, decided at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Upload the staging file and insert the record
    Create,
    /// Re-upload into the existing message if the staging file changed
    Write,
    /// Release the local copy only
    Read,
}

/// An open regular file.
///
/// Reads go to the backend's materialized copy; writes go to a private staging file that is
/// uploaded on `close`.
pub struct FileHandle {
    driver: Driver,
    record: FileRecord,
    flags: OpenFlags,
    mode: CloseMode,
    file: Option<fs::File>,
    local_path: PathBuf,
    /// The local file is ours and goes away with the handle
    staging: bool,
    opened_mtime: Option<SystemTime>,
    dirty: bool,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.record.abs_path())
            .field("flags", &self.flags.describe())
            .field("mode", &self.mode)
            .field("local_path", &self.local_path)
            .finish()
    }
}

impl FileHandle {
    /// New file backed by a fresh staging file
    pub(crate) async fn create(driver: &Driver, abs_path: &str, flags: OpenFlags, perm: u32) -> Result<Self> {
        let (_, leaf) = path::split(abs_path);
        let local_path = driver.staging_path(&leaf);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&local_path)
            .await?;

        Ok(Self {
            driver: driver.clone(),
            record: FileRecord::new_file(driver.owner(), driver.chat_id(), abs_path, perm),
            flags,
            mode: CloseMode::Create,
            file: Some(file),
            local_path,
            staging: true,
            opened_mtime: None,
            dirty: false,
        })
    }

    /// Existing file, materialized for reading
    pub(crate) async fn open_read(driver: &Driver, record: FileRecord, flags: OpenFlags) -> Result<Self> {
        let local_path = materialize(driver, &record).await?;
        let file = fs::File::open(&local_path).await?;

        Ok(Self {
            driver: driver.clone(),
            record,
            flags,
            mode: CloseMode::Read,
            file: Some(file),
            local_path,
            staging: false,
            opened_mtime: None,
            dirty: false,
        })
    }

    /// Existing file, copied into a staging file for writing. A truncating open starts from an
    /// empty staging file and only checks that the message still exists.
    pub(crate) async fn open_write(driver: &Driver, record: FileRecord, flags: OpenFlags) -> Result<Self> {
        let truncate = flags.contains(OpenFlags::TRUNCATE);
        let cached = if truncate {
            resolve_message(driver, &record).await?;
            None
        } else {
            Some(materialize(driver, &record).await?)
        };

        let local_path = driver.staging_path(&record.file_name);
        match &cached {
            Some(cached) => {
                fs::copy(cached, &local_path).await?;
            }
            None => {
                fs::File::create(&local_path).await?;
            }
        }

        let mut handle = Self {
            driver: driver.clone(),
            record,
            flags,
            mode: CloseMode::Write,
            file: None,
            local_path,
            staging: true,
            opened_mtime: None,
            dirty: truncate,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .append(flags.contains(OpenFlags::APPEND))
            .open(&handle.local_path)
            .await?;
        handle.opened_mtime = file.metadata().await?.modified().ok();
        handle.file = Some(file);
        Ok(handle)
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn file(&mut self) -> Result<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| AppError::InvalidArgument("File already closed".to_string()))
    }

    /// Finish the handle according to its open mode and return the resulting record
    pub async fn close(mut self) -> Result<FileRecord> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }

        let result = match self.mode {
            CloseMode::Read => Ok(()),
            CloseMode::Create => self.finish_create().await,
            CloseMode::Write => self.finish_write().await,
        };

        let cleanup = if self.staging {
            self.staging = false;
            fs::remove_file(&self.local_path).await
        } else {
            Ok(())
        };

        result?;
        if let Err(e) = cleanup {
            tracing::warn!(
                "Failed to remove staging file {}: {}",
                self.local_path.display(),
                e
            );
            return Err(e.into());
        }
        Ok(self.record.clone())
    }

    async fn finish_create(&mut self) -> Result<()> {
        let size = fs::metadata(&self.local_path).await?.len() as i64;
        let abs_path = self.record.abs_path();
        let chat_id = self.record.chat_id.unwrap_or(self.driver.chat_id());
        let caption = DocumentCaption::new(&abs_path, size).encode();

        let backend = self.driver.backend();
        let done = self
            .driver
            .correlator()
            .await_upload_completion(
                &self.local_path,
                backend.send_document(chat_id, &self.local_path, &caption),
                self.driver.cancel_token(),
            )
            .await?;
        release_local_copy(self.driver.backend().as_ref(), done.blob_id).await;

        let now = chrono::Utc::now().to_rfc3339();
        self.record.chat_id = Some(chat_id);
        self.record.message_id = Some(done.message_id);
        self.record.blob_id = Some(done.blob_id);
        self.record.size = size;
        self.record.mod_time = now.clone();
        self.record.updated_at = now;

        if let Err(e) = MetadataService::insert(self.driver.db(), &self.record).await {
            // nothing points at the new message
            if let Err(del) = self.driver.backend().delete_message(chat_id, done.message_id).await {
                tracing::warn!(
                    "Failed to delete message {} after failed insert of {}: {}",
                    done.message_id,
                    abs_path,
                    del
                );
            }
            return Err(e);
        }

        tracing::debug!(
            "Created {} ({} bytes) as message {}",
            abs_path,
            size,
            done.message_id
        );
        Ok(())
    }

    async fn finish_write(&mut self) -> Result<()> {
        let metadata = fs::metadata(&self.local_path).await?;
        let advanced = match (self.opened_mtime, metadata.modified().ok()) {
            (Some(opened), Some(now)) => now > opened,
            _ => false,
        };
        if !self.dirty && !advanced {
            return Ok(());
        }

        let size = metadata.len() as i64;
        let abs_path = self.record.abs_path();
        let chat_id = self.record.chat_id.unwrap_or(self.driver.chat_id());
        let message_id = self.record.message_id.ok_or_else(|| {
            AppError::RemoteUnavailable(format!("{} has no remote content", abs_path))
        })?;
        let caption = DocumentCaption::new(&abs_path, size).encode();

        let backend = self.driver.backend();
        let done = self
            .driver
            .correlator()
            .await_upload_completion(
                &self.local_path,
                backend.edit_document(chat_id, message_id, &self.local_path, &caption),
                self.driver.cancel_token(),
            )
            .await?;
        release_local_copy(self.driver.backend().as_ref(), done.blob_id).await;

        let now = chrono::Utc::now().to_rfc3339();
        MetadataService::update_content(
            self.driver.db(),
            self.driver.owner(),
            &self.record.id,
            size,
            done.blob_id,
            &now,
        )
        .await?;

        self.record.blob_id = Some(done.blob_id);
        self.record.size = size;
        self.record.mod_time = now.clone();
        self.record.updated_at = now;
        tracing::debug!("Updated {} ({} bytes)", abs_path, size);
        Ok(())
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.staging {
            // handle abandoned without close; the staged bytes are discarded
            let _ = std::fs::remove_file(&self.local_path);
        }
    }
}

#[async_trait]
impl Readable for FileHandle {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buf).await?)
    }
}

#[async_trait]
impl Writable for FileHandle {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.file()?.write(buf).await?;
        self.dirty = true;
        Ok(n)
    }
}

async fn release_local_copy(backend: &dyn BackingService, blob_id: i64) {
    if let Err(e) = backend.delete_local_file(blob_id).await {
        tracing::warn!("Failed to release local copy of blob {}: {}", blob_id, e);
    }
}

/// Fetch the message behind `record`.
///
/// A message the backend no longer knows is taken as deleted elsewhere: the record is dropped
/// and NotFound returned.
async fn resolve_message(driver: &Driver, record: &FileRecord) -> Result<Message> {
    let abs_path = record.abs_path();
    let message_id = record.message_id.ok_or_else(|| {
        AppError::RemoteUnavailable(format!("{} has no remote content", abs_path))
    })?;
    let backend = driver.backend();

    let mut chat_id = record.chat_id.unwrap_or(driver.chat_id());
    let known = match backend.ensure_messages_known(chat_id, &[message_id]).await {
        Err(e) if e.is_not_found() && chat_id != driver.chat_id() => {
            chat_id = driver.chat_id();
            backend.ensure_messages_known(chat_id, &[message_id]).await
        }
        other => other,
    };

    let message = match known {
        Ok(()) => backend.get_message(chat_id, message_id).await,
        Err(e) => Err(e),
    };
    match message {
        Ok(message) => Ok(message),
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                "Message {} behind {} is gone, dropping the record",
                message_id,
                abs_path
            );
            MetadataService::delete(driver.db(), record).await?;
            Err(AppError::NotFound(format!("{} not found", abs_path)))
        }
        Err(e) => Err(e),
    }
}

/// Make the content of `record` available locally and return its path
async fn materialize(driver: &Driver, record: &FileRecord) -> Result<PathBuf> {
    let abs_path = record.abs_path();
    let message = resolve_message(driver, record).await?;
    let message_id = message.id;
    let backend = driver.backend();

    let blob_id = message
        .document
        .map(|d| d.blob_id)
        .ok_or_else(|| AppError::RemoteUnavailable(format!("Message {} has no document", message_id)))?;

    let file = backend.get_file(blob_id).await?;
    if file.local.is_downloading_completed {
        return Ok(PathBuf::from(file.local.path));
    }
    if !file.local.can_be_downloaded {
        return Err(AppError::RemoteUnavailable(format!(
            "Blob {} of {} cannot be downloaded",
            blob_id, abs_path
        )));
    }

    driver
        .correlator()
        .await_download_completion(
            blob_id,
            async {
                // a stale transfer would never report to the new waiter
                backend.cancel_download(blob_id).await?;
                backend.download_file(blob_id).await?;
                Ok::<_, AppError>(())
            },
            driver.cancel_token(),
        )
        .await
}
