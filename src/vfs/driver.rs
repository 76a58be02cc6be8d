use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::directory::DirectoryHandle;
use super::file::FileHandle;
use super::flags::OpenFlags;
use super::handle::Handle;
use super::path;
use crate::backend::BackingService;
use crate::correlation::Correlator;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{DocumentCaption, FileRecord};
use crate::services::MetadataService;

/// Filesystem view of one principal's container.
///
/// Holds no state between calls; everything lives in the metadata store and in open handles,
/// so clones can be used from any number of tasks.
#[derive(Clone)]
pub struct Driver {
    db: Database,
    backend: Arc<dyn BackingService>,
    correlator: Correlator,
    owner: String,
    chat_id: i64,
    temp_dir: PathBuf,
    cancel: CancellationToken,
}

impl Driver {
    pub fn new(
        db: Database,
        backend: Arc<dyn BackingService>,
        correlator: Correlator,
        owner: impl Into<String>,
        chat_id: i64,
        temp_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            backend,
            correlator,
            owner: owner.into(),
            chat_id,
            temp_dir: temp_dir.into(),
            cancel,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn backend(&self) -> &Arc<dyn BackingService> {
        &self.backend
    }

    pub(crate) fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Collision-free staging location for `leaf`
    pub(crate) fn staging_path(&self, leaf: &str) -> PathBuf {
        self.temp_dir
            .join(format!("{}_{}", uuid::Uuid::new_v4().simple(), leaf))
    }

    async fn require_dir(&self, abs_path: &str) -> Result<FileRecord> {
        let record = MetadataService::find(&self.db, &self.owner, abs_path).await?;
        if !record.is_dir {
            return Err(AppError::NotADirectory(format!("{} is not a directory", abs_path)));
        }
        Ok(record)
    }

    pub async fn mkdir(&self, p: &str, perm: u32) -> Result<FileRecord> {
        let abs_path = path::clean(p);
        tracing::debug!("mkdir {} (owner {}, mode {:o})", abs_path, self.owner, perm);

        if !path::is_root(&abs_path) {
            self.require_dir(&path::parent(&abs_path)).await?;
        }

        let record = FileRecord::new_dir(&self.owner, &abs_path, perm);
        MetadataService::insert(&self.db, &record).await?;
        Ok(record)
    }

    /// Create every missing directory along `p`
    pub async fn mkdir_all(&self, p: &str, perm: u32) -> Result<()> {
        let abs_path = path::clean(p);
        tracing::debug!("mkdir_all {} (owner {})", abs_path, self.owner);

        for prefix in path::prefixes(&abs_path) {
            match self.mkdir(&prefix, perm).await {
                Ok(_) => {}
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        // the last segment may have been an existing file
        self.require_dir(&abs_path).await?;
        Ok(())
    }

    pub async fn open_file(&self, p: &str, flags: OpenFlags, perm: u32) -> Result<Handle> {
        let abs_path = path::clean(p);
        tracing::debug!(
            "open {} [{}] (owner {})",
            abs_path,
            flags.describe(),
            self.owner
        );

        if flags.contains(OpenFlags::EXCLUSIVE) {
            return Err(AppError::NotSupported(
                "Exclusive create is not supported".to_string(),
            ));
        }

        let record = match MetadataService::find(&self.db, &self.owner, &abs_path).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() && flags.contains(OpenFlags::CREATE) => {
                self.require_dir(&path::parent(&abs_path)).await?;
                let file = FileHandle::create(self, &abs_path, flags, perm).await?;
                return Ok(Handle::File(file));
            }
            Err(e) => return Err(e),
        };

        if record.is_dir {
            let children = MetadataService::list_children(&self.db, &self.owner, &abs_path).await?;
            return Ok(Handle::Directory(DirectoryHandle::new(record, children)));
        }

        let file = if flags.is_read_only() {
            FileHandle::open_read(self, record, flags).await?
        } else {
            match FileHandle::open_write(self, record, flags).await {
                Err(e) if e.is_not_found() && flags.contains(OpenFlags::CREATE) => {
                    // the row is only gone when the message vanished remotely
                    match MetadataService::find(&self.db, &self.owner, &abs_path).await {
                        Err(missing) if missing.is_not_found() => {
                            tracing::info!("{} was deleted remotely, creating it afresh", abs_path);
                            FileHandle::create(self, &abs_path, flags, perm).await?
                        }
                        _ => return Err(e),
                    }
                }
                other => other?,
            }
        };
        Ok(Handle::File(file))
    }

    /// Open for reading
    pub async fn open(&self, p: &str) -> Result<Handle> {
        self.open_file(p, OpenFlags::READ_ONLY, 0).await
    }

    /// Create or truncate for writing
    pub async fn create(&self, p: &str) -> Result<Handle> {
        self.open_file(
            p,
            OpenFlags::CREATE | OpenFlags::READ_WRITE | OpenFlags::TRUNCATE,
            0o666,
        )
        .await
    }

    pub async fn stat(&self, p: &str) -> Result<FileRecord> {
        let abs_path = path::clean(p);
        tracing::debug!("stat {} (owner {})", abs_path, self.owner);
        MetadataService::find(&self.db, &self.owner, &abs_path).await
    }

    pub async fn remove(&self, p: &str) -> Result<()> {
        let abs_path = path::clean(p);
        tracing::debug!("remove {} (owner {})", abs_path, self.owner);

        if path::is_root(&abs_path) {
            return Err(AppError::InvalidArgument("Cannot remove root".to_string()));
        }

        let record = MetadataService::find(&self.db, &self.owner, &abs_path).await?;
        if record.is_dir {
            if MetadataService::has_children(&self.db, &self.owner, &abs_path).await? {
                return Err(AppError::DirectoryNotEmpty(abs_path));
            }
            return MetadataService::delete(&self.db, &record).await;
        }
        self.remove_file(&record).await
    }

    /// Remote message first: a leftover message is harmless, a row without one is not
    async fn remove_file(&self, record: &FileRecord) -> Result<()> {
        if let Some(message_id) = record.message_id {
            let chat_id = record.chat_id.unwrap_or(self.chat_id);
            match self.backend.delete_message(chat_id, message_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        "Message {} of {} was already gone",
                        message_id,
                        record.abs_path()
                    );
                }
                Err(e) => return Err(e),
            }
        }
        MetadataService::delete(&self.db, record).await
    }

    /// Remove `p` and everything below it; a missing path is not an error
    pub async fn remove_all(&self, p: &str) -> Result<()> {
        let abs_path = path::clean(p);
        tracing::debug!("remove_all {} (owner {})", abs_path, self.owner);

        let record = match MetadataService::find(&self.db, &self.owner, &abs_path).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if !record.is_dir {
            return self.remove_file(&record).await;
        }

        // depth first; a directory is deleted once its subtree is gone
        let mut stack = vec![(record, false)];
        while let Some((dir, expanded)) = stack.pop() {
            if expanded {
                if dir.is_stored() && !dir.is_root() {
                    MetadataService::delete(&self.db, &dir).await?;
                }
                continue;
            }

            let children = MetadataService::list_children(&self.db, &self.owner, &dir.abs_path()).await?;
            stack.push((dir, true));
            for child in children {
                if child.is_dir {
                    stack.push((child, false));
                } else {
                    self.remove_file(&child).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let old_path = path::clean(from);
        let new_path = path::clean(to);
        tracing::debug!("rename {} -> {} (owner {})", old_path, new_path, self.owner);

        if path::is_root(&old_path) || path::is_root(&new_path) {
            return Err(AppError::InvalidArgument("Cannot rename root".to_string()));
        }
        if old_path == new_path {
            return Ok(());
        }

        let record = MetadataService::find(&self.db, &self.owner, &old_path).await?;
        match MetadataService::find(&self.db, &self.owner, &new_path).await {
            Ok(_) => return Err(AppError::Conflict(format!("{} already exists", new_path))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.require_dir(&path::parent(&new_path)).await?;

        if record.is_dir {
            if path::is_descendant(&new_path, &old_path) {
                return Err(AppError::InvalidArgument(format!(
                    "Cannot move {} into itself",
                    old_path
                )));
            }
            if MetadataService::has_children(&self.db, &self.owner, &old_path).await? {
                return Err(AppError::DirectoryNotEmpty(old_path));
            }
        } else if let Some(message_id) = record.message_id {
            let chat_id = record.chat_id.unwrap_or(self.chat_id);
            let caption = DocumentCaption::new(&new_path, record.size).encode();
            self.backend.edit_caption(chat_id, message_id, &caption).await?;
        }

        MetadataService::update_location(&self.db, &self.owner, &record.id, &new_path).await
    }

    pub async fn chmod(&self, p: &str, _perm: u32) -> Result<()> {
        Err(AppError::NotSupported(format!("chmod {}", path::clean(p))))
    }

    pub async fn chown(&self, p: &str, _uid: u32, _gid: u32) -> Result<()> {
        Err(AppError::NotSupported(format!("chown {}", path::clean(p))))
    }

    pub async fn chtimes(&self, p: &str, _mod_time: &str) -> Result<()> {
        Err(AppError::NotSupported(format!("chtimes {}", path::clean(p))))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::vfs::{DirectoryListable, Writable};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_docs_scenario() {
        let fx = Fixture::new().await;
        let driver = &fx.driver;

        driver.mkdir("/docs", 0o755).await.unwrap();
        let mut file = driver
            .open_file(
                "/docs/a.txt",
                OpenFlags::CREATE | OpenFlags::WRITE_ONLY,
                0o644,
            )
            .await
            .unwrap();
        file.writable().unwrap().write_all(b"hello").await.unwrap();
        file.close().await.unwrap();

        let stat = driver.stat("/docs/a.txt").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir);

        driver.rename("/docs/a.txt", "/docs/b.txt").await.unwrap();
        assert!(driver.stat("/docs/a.txt").await.unwrap_err().is_not_found());
        let moved = driver.stat("/docs/b.txt").await.unwrap();
        assert_eq!(moved.message_id, stat.message_id);
        assert_eq!(moved.size, 5);

        assert_eq!(read_file(driver, "/docs/b.txt").await, b"hello");
        assert_eq!(fx.staging_entries(), 0);
    }

    #[tokio::test]
    async fn test_rename_rewrites_caption() {
        let fx = Fixture::new().await;
        let record = write_file(&fx.driver, "/a.txt", b"abc").await;
        fx.driver.rename("/a.txt", "/b.txt").await.unwrap();

        let message = fx
            .backend
            .get_message(CHAT_ID, record.message_id.unwrap())
            .await
            .unwrap();
        let caption = DocumentCaption::decode(&message.caption).unwrap();
        assert_eq!(caption.path, "/b.txt");
        assert_eq!(caption.size, 3);
    }

    #[tokio::test]
    async fn test_mkdir_all_is_idempotent() {
        let fx = Fixture::new().await;
        fx.driver.mkdir_all("/a/b/c", 0o755).await.unwrap();
        fx.driver.mkdir_all("/a/b/c", 0o755).await.unwrap();

        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 3);
        for p in ["/a", "/a/b", "/a/b/c"] {
            assert!(fx.driver.stat(p).await.unwrap().is_dir);
        }
    }

    #[tokio::test]
    async fn test_mkdir_conflict_and_parent_checks() {
        let fx = Fixture::new().await;
        fx.driver.mkdir("/docs", 0o755).await.unwrap();
        assert!(fx.driver.mkdir("/docs", 0o755).await.unwrap_err().is_conflict());

        let err = fx.driver.mkdir("/missing/sub", 0o755).await.unwrap_err();
        assert!(err.is_not_found());

        write_file(&fx.driver, "/file", b"x").await;
        let err = fx.driver.mkdir("/file/sub", 0o755).await.unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
        let err = fx.driver.mkdir_all("/file/sub", 0o755).await.unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_root_always_exists() {
        let fx = Fixture::new().await;
        let root = fx.driver.stat("/").await.unwrap();
        assert!(root.is_dir);
        assert!(!root.is_stored());
        assert!(list(&fx.driver, "/").await.is_empty());

        fx.driver.mkdir("/", 0o755).await.unwrap();
        assert!(fx.driver.stat("/").await.unwrap().is_stored());
        assert!(fx.driver.mkdir("/", 0o755).await.unwrap_err().is_conflict());

        let err = fx.driver.remove("/").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_non_empty_guard() {
        let fx = Fixture::new().await;
        fx.driver.mkdir_all("/a/b", 0o755).await.unwrap();

        let err = fx.driver.remove("/a").await.unwrap_err();
        assert!(matches!(err, AppError::DirectoryNotEmpty(_)));

        fx.driver.remove("/a/b").await.unwrap();
        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 1);
        fx.driver.remove("/a").await.unwrap();
        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_delete_failure_keeps_record() {
        let fx = Fixture::new().await;
        write_file(&fx.driver, "/keep.txt", b"data").await;

        fx.backend.set_reject_deletes(true);
        let err = fx.driver.remove("/keep.txt").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteUnavailable(_)));
        assert!(fx.driver.stat("/keep.txt").await.is_ok());

        fx.backend.set_reject_deletes(false);
        fx.driver.remove("/keep.txt").await.unwrap();
        assert!(fx.driver.stat("/keep.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_file_deletes_message() {
        let fx = Fixture::new().await;
        let record = write_file(&fx.driver, "/gone.txt", b"data").await;
        fx.driver.remove("/gone.txt").await.unwrap();

        let err = fx
            .backend
            .get_message(CHAT_ID, record.message_id.unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let fx = Fixture::new().await;
        fx.driver.mkdir_all("/a/b/c", 0o755).await.unwrap();
        write_file(&fx.driver, "/a/x.txt", b"1").await;
        write_file(&fx.driver, "/a/b/c/y.txt", b"2").await;
        fx.driver.mkdir("/other", 0o755).await.unwrap();

        fx.driver.remove_all("/a").await.unwrap();
        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 1);
        assert!(fx.driver.stat("/a").await.unwrap_err().is_not_found());

        fx.driver.remove_all("/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_rules() {
        let fx = Fixture::new().await;
        fx.driver.mkdir_all("/a/b", 0o755).await.unwrap();
        fx.driver.mkdir("/empty", 0o755).await.unwrap();
        write_file(&fx.driver, "/f.txt", b"x").await;

        let err = fx.driver.rename("/f.txt", "/empty").await.unwrap_err();
        assert!(err.is_conflict());

        let err = fx.driver.rename("/a", "/moved").await.unwrap_err();
        assert!(matches!(err, AppError::DirectoryNotEmpty(_)));

        let err = fx.driver.rename("/empty", "/empty/inner").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = fx.driver.rename("/f.txt", "/nowhere/f.txt").await.unwrap_err();
        assert!(err.is_not_found());

        let err = fx.driver.rename("/missing", "/x").await.unwrap_err();
        assert!(err.is_not_found());

        fx.driver.rename("/empty", "/a/empty").await.unwrap();
        assert!(fx.driver.stat("/a/empty").await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn test_listing_pagination() {
        let fx = Fixture::new().await;
        fx.driver.mkdir("/dir", 0o755).await.unwrap();
        for i in 0..5 {
            fx.driver.mkdir(&format!("/dir/sub{}", i), 0o755).await.unwrap();
        }
        for i in 0..2 {
            write_file(&fx.driver, &format!("/dir/f{}", i), b"x").await;
        }

        let mut handle = fx.driver.open("/dir").await.unwrap();
        let listing = handle.listable().unwrap();
        let mut seen = HashSet::new();
        loop {
            let page = listing.list_entries(3);
            if page.is_empty() {
                break;
            }
            for entry in page {
                assert!(seen.insert(entry.file_name));
            }
        }
        assert_eq!(seen.len(), 7);

        let mut handle = fx.driver.open("/dir").await.unwrap();
        assert_eq!(handle.listable().unwrap().list_entries(-1).len(), 7);
        assert_eq!(handle.listable().unwrap().list_names(-1).len(), 5);
        assert!(handle.readable().is_err());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_message() {
        let fx = Fixture::new().await;
        let first = write_file(&fx.driver, "/w.txt", b"first version").await;
        let second = write_file(&fx.driver, "/w.txt", b"second").await;

        assert_eq!(first.id, second.id);
        assert_eq!(first.message_id, second.message_id);
        assert_ne!(first.blob_id, second.blob_id);
        assert_eq!(fx.driver.stat("/w.txt").await.unwrap().size, 6);
        assert_eq!(read_file(&fx.driver, "/w.txt").await, b"second");
    }

    #[tokio::test]
    async fn test_append_extends_content() {
        let fx = Fixture::new().await;
        write_file(&fx.driver, "/log", b"one").await;

        let mut file = fx
            .driver
            .open_file("/log", OpenFlags::WRITE_ONLY | OpenFlags::APPEND, 0)
            .await
            .unwrap();
        file.writable().unwrap().write_all(b"two").await.unwrap();
        file.close().await.unwrap();

        assert_eq!(read_file(&fx.driver, "/log").await, b"onetwo");
    }

    #[tokio::test]
    async fn test_unmodified_write_handle_changes_nothing() {
        let fx = Fixture::new().await;
        let before = write_file(&fx.driver, "/same", b"abc").await;

        let handle = fx
            .driver
            .open_file("/same", OpenFlags::READ_WRITE, 0)
            .await
            .unwrap();
        handle.close().await.unwrap();

        let after = fx.driver.stat("/same").await.unwrap();
        assert_eq!(after.blob_id, before.blob_id);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(fx.staging_entries(), 0);
    }

    #[tokio::test]
    async fn test_read_only_handle_rejects_writes() {
        let fx = Fixture::new().await;
        write_file(&fx.driver, "/ro", b"abc").await;

        let mut handle = fx.driver.open("/ro").await.unwrap();
        assert!(matches!(handle.writable(), Err(AppError::NotSupported(_))));
        assert!(matches!(handle.listable(), Err(AppError::NotSupported(_))));
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_only_handle_rejects_reads() {
        let fx = Fixture::new().await;
        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE;

        let mut handle = fx.driver.open_file("/wo", flags, 0o644).await.unwrap();
        assert!(matches!(handle.readable(), Err(AppError::NotSupported(_))));
        handle.writable().unwrap().write_all(b"abc").await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(read_file(&fx.driver, "/wo").await, b"abc");
    }

    #[tokio::test]
    async fn test_externally_deleted_message_drops_record() {
        let fx = Fixture::new().await;
        let record = write_file(&fx.driver, "/vanish", b"abc").await;
        fx.backend
            .delete_externally(CHAT_ID, record.message_id.unwrap())
            .await
            .unwrap();

        let err = fx.driver.open("/vanish").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(fx.driver.stat("/vanish").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let fx = Fixture::new().await;
        let err = fx
            .driver
            .open_file("/x", OpenFlags::CREATE | OpenFlags::EXCLUSIVE | OpenFlags::WRITE_ONLY, 0o644)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));

        assert!(matches!(fx.driver.chmod("/x", 0o600).await, Err(AppError::NotSupported(_))));
        assert!(matches!(fx.driver.chown("/x", 0, 0).await, Err(AppError::NotSupported(_))));
        assert!(matches!(
            fx.driver.chtimes("/x", "2024-01-01T00:00:00Z").await,
            Err(AppError::NotSupported(_))
        ));

        assert!(fx.driver.open("/x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cancelled_create_leaves_nothing_behind() {
        let fx = Fixture::new().await;
        let mut file = fx.driver.create("/c.txt").await.unwrap();
        file.writable().unwrap().write_all(b"data").await.unwrap();

        fx.driver.cancel_token().cancel();
        let err = file.close().await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));

        assert!(fx.driver.stat("/c.txt").await.unwrap_err().is_not_found());
        assert_eq!(fx.staging_entries(), 0);
        assert!(fx.correlator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_handle_discards_staging() {
        let fx = Fixture::new().await;
        let mut file = fx.driver.create("/d.txt").await.unwrap();
        file.writable().unwrap().write_all(b"data").await.unwrap();
        drop(file);

        assert_eq!(fx.staging_entries(), 0);
        assert!(fx.driver.stat("/d.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_download() {
        let fx = Fixture::new().await;
        let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        write_file(&fx.driver, "/big.bin", &content).await;

        let (first, second) = tokio::join!(
            read_file(&fx.driver, "/big.bin"),
            read_file(&fx.driver, "/big.bin")
        );
        assert_eq!(first, content);
        assert_eq!(second, content);
        assert!(fx.correlator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_create_over_remotely_deleted_file() {
        let fx = Fixture::new().await;
        let old = write_file(&fx.driver, "/t.txt", b"old").await;
        fx.backend
            .delete_externally(CHAT_ID, old.message_id.unwrap())
            .await
            .unwrap();

        let fresh = write_file(&fx.driver, "/t.txt", b"fresh").await;
        assert_ne!(fresh.message_id, old.message_id);
        assert_eq!(read_file(&fx.driver, "/t.txt").await, b"fresh");
        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_truncating_open_skips_download() {
        let fx = Fixture::new().await;
        let old = write_file(&fx.driver, "/t.txt", b"old content").await;

        let mut handle = fx.driver.create("/t.txt").await.unwrap();
        let blob = fx.backend.get_file(old.blob_id.unwrap()).await.unwrap();
        assert!(!blob.local.is_downloading_active);
        assert!(!blob.local.is_downloading_completed);

        handle.writable().unwrap().write_all(b"new").await.unwrap();
        let record = handle.close().await.unwrap();
        assert_eq!(record.message_id, old.message_id);
        assert_eq!(record.size, 3);
        assert_eq!(read_file(&fx.driver, "/t.txt").await, b"new");
    }

    #[tokio::test]
    async fn test_concurrent_creates_first_writer_wins() {
        let fx = Fixture::new().await;
        let mut a = fx.driver.create("/race.txt").await.unwrap();
        let mut b = fx.driver.create("/race.txt").await.unwrap();
        a.writable().unwrap().write_all(b"from a").await.unwrap();
        b.writable().unwrap().write_all(b"from b").await.unwrap();

        let (winner, loser) = match tokio::join!(a.close(), b.close()) {
            (Ok(winner), Err(e)) | (Err(e), Ok(winner)) => (winner, e),
            (a, b) => panic!("expected exactly one winner: {:?} / {:?}", a, b),
        };
        assert!(loser.is_conflict());
        assert_eq!(MetadataService::count(&fx.db, "alice").await.unwrap(), 1);
        assert_eq!(fx.staging_entries(), 0);

        // the two uploads were messages 1 and 2; the loser's is deleted again
        let kept = winner.message_id.unwrap();
        let orphan = if kept == 1 { 2 } else { 1 };
        assert!(fx.backend.get_message(CHAT_ID, kept).await.is_ok());
        let err = fx.backend.get_message(CHAT_ID, orphan).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_requires_directory_parent() {
        let fx = Fixture::new().await;
        let err = fx.driver.create("/no/such/file").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
