use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User model
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    /// Argon2 PHC string; no password check when absent
    pub password_hash: Option<String>,
    pub chat_name: Option<String>,
    pub chat_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// User response (without sensitive data)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub chat_name: Option<String>,
    pub chat_id: Option<i64>,
    pub has_password: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            chat_name: user.chat_name,
            chat_id: user.chat_id,
            has_password: user.password_hash.is_some(),
            created_at: user.created_at,
        }
    }
}

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub id: String,
    pub password: Option<String>,
    pub chat_name: Option<String>,
    pub chat_id: Option<i64>,
}

/// Principal authenticated for one session
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}
