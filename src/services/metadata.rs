use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::FileRecord;
use crate::vfs::path;

/// File record accessor, every query scoped by owner
pub struct MetadataService;

/// Map a unique-index violation to Conflict
fn map_unique(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{} already exists", what))
        }
        _ => AppError::Store(err),
    }
}

impl MetadataService {
    /// Look a path up; root resolves to a synthesized record until it is stored
    pub async fn find(db: &Database, owner: &str, abs_path: &str) -> Result<FileRecord> {
        let (parent, name) = path::split(abs_path);
        let file: Option<FileRecord> = sqlx::query_as(
            "SELECT * FROM files WHERE user_id = ? AND file_path = ? AND file_name = ?",
        )
        .bind(owner)
        .bind(&parent)
        .bind(&name)
        .fetch_optional(db.pool())
        .await?;

        match file {
            Some(file) => Ok(file),
            None if name.is_empty() => Ok(FileRecord::implicit_root(owner)),
            None => Err(AppError::NotFound(format!("{} not found", path::join(&parent, &name)))),
        }
    }

    /// Children of a directory, directories first
    pub async fn list_children(db: &Database, owner: &str, dir_path: &str) -> Result<Vec<FileRecord>> {
        let files: Vec<FileRecord> = sqlx::query_as(
            r#"
            SELECT * FROM files
            WHERE user_id = ? AND file_path = ? AND file_name != ''
            ORDER BY is_dir DESC, file_name ASC
            "#,
        )
        .bind(owner)
        .bind(path::clean(dir_path))
        .fetch_all(db.pool())
        .await?;

        Ok(files)
    }

    pub async fn has_children(db: &Database, owner: &str, dir_path: &str) -> Result<bool> {
        let found: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM files WHERE user_id = ? AND file_path = ? AND file_name != '' LIMIT 1",
        )
        .bind(owner)
        .bind(path::clean(dir_path))
        .fetch_optional(db.pool())
        .await?;

        Ok(found.is_some())
    }

    pub async fn insert(db: &Database, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, user_id, chat_id, message_id, blob_id, file_path, file_name,
                               size, file_mode, mod_time, is_dir, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.user_id)
        .bind(file.chat_id)
        .bind(file.message_id)
        .bind(file.blob_id)
        .bind(&file.file_path)
        .bind(&file.file_name)
        .bind(file.size)
        .bind(file.file_mode)
        .bind(&file.mod_time)
        .bind(file.is_dir)
        .bind(&file.metadata)
        .bind(&file.created_at)
        .bind(&file.updated_at)
        .execute(db.pool())
        .await
        .map_err(|e| map_unique(e, &file.abs_path()))?;

        Ok(())
    }

    /// Record a new upload of an existing file
    pub async fn update_content(
        db: &Database,
        owner: &str,
        id: &str,
        size: i64,
        blob_id: i64,
        mod_time: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE files SET size = ?, blob_id = ?, mod_time = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(size)
        .bind(blob_id)
        .bind(mod_time)
        .bind(&now)
        .bind(id)
        .bind(owner)
        .execute(db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File {} not found", id)));
        }
        Ok(())
    }

    pub async fn update_location(
        db: &Database,
        owner: &str,
        id: &str,
        abs_path: &str,
    ) -> Result<()> {
        let (parent, name) = path::split(abs_path);
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE files SET file_path = ?, file_name = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(&parent)
        .bind(&name)
        .bind(&now)
        .bind(id)
        .bind(owner)
        .execute(db.pool())
        .await
        .map_err(|e| map_unique(e, abs_path))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File {} not found", id)));
        }
        Ok(())
    }

    pub async fn delete(db: &Database, file: &FileRecord) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(&file.id)
            .bind(&file.user_id)
            .execute(db.pool())
            .await?;

        Ok(())
    }

    /// Drop every record pointing at a message; returns the number of rows removed
    pub async fn delete_by_message(db: &Database, chat_id: i64, message_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE chat_id = ? AND message_id = ?")
            .bind(chat_id)
            .bind(message_id)
            .execute(db.pool())
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(db: &Database, owner: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE user_id = ?")
            .bind(owner)
            .fetch_one(db.pool())
            .await?;

        Ok(count.0)
    }
}
