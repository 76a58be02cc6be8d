use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::rngs::OsRng;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CreateUserRequest, User, UserResponse};

/// User service
pub struct UserService;

impl UserService {
    /// Register a principal
    pub async fn create_user(db: &Database, req: CreateUserRequest) -> Result<UserResponse> {
        let id = req.id.trim();
        if id.is_empty() || id.len() > 64 {
            return Err(AppError::InvalidArgument(
                "User id must be between 1 and 64 characters".to_string(),
            ));
        }

        let password_hash = match req.password.as_deref() {
            Some(p) if !p.is_empty() => Some(Self::hash_password(p)?),
            _ => None,
        };
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (id, password_hash, chat_name, chat_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&password_hash)
        .bind(&req.chat_name)
        .bind(req.chat_id)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("User {} already exists", id))
            }
            _ => AppError::Store(e),
        })?;

        tracing::info!("Created user {}", id);
        let user = Self::get_user(db, id).await?;
        Ok(UserResponse::from(user))
    }

    /// Create a principal unless one with the same id already exists
    pub async fn ensure_user(db: &Database, req: CreateUserRequest) -> Result<()> {
        match Self::create_user(db, req).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Get user by ID
    pub async fn get_user(db: &Database, user_id: &str) -> Result<User> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(user)
    }

    /// Check a credential; users without a stored hash accept any
    pub fn check_password(user: &User, password: &str) -> Result<bool> {
        match &user.password_hash {
            Some(hash) => Self::verify_password(password, hash),
            None => Ok(true),
        }
    }

    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify password against hash
    fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}
