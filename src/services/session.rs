use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::UserService;
use crate::backend::{BackingService, ChatSelector};
use crate::correlation::Correlator;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::vfs::{path, Driver};

/// Turns credentials into a driver scoped to the principal's container
#[derive(Clone)]
pub struct SessionFactory {
    db: Database,
    backend: Arc<dyn BackingService>,
    correlator: Correlator,
    default_chat: ChatSelector,
    temp_dir: PathBuf,
    shutdown: CancellationToken,
}

impl SessionFactory {
    pub fn new(
        db: Database,
        backend: Arc<dyn BackingService>,
        correlator: Correlator,
        default_chat: ChatSelector,
        temp_dir: impl Into<PathBuf>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            backend,
            correlator,
            default_chat,
            temp_dir: temp_dir.into(),
            shutdown,
        }
    }

    pub async fn open_session(&self, user_id: &str, password: &str) -> Result<Driver> {
        let user = UserService::get_user(&self.db, user_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::Unauthorized("Invalid user or password".to_string()),
                other => other,
            })?;
        if !UserService::check_password(&user, password)? {
            return Err(AppError::Unauthorized("Invalid user or password".to_string()));
        }

        let selector = if user.chat_name.is_some() || user.chat_id.is_some() {
            ChatSelector {
                name: user.chat_name.clone(),
                id: user.chat_id,
            }
        } else {
            self.default_chat.clone()
        };

        let container = self
            .backend
            .find_container(&selector)
            .await
            .map_err(|e| match e {
                AppError::NotFound(msg) => AppError::Forbidden(msg),
                other => other,
            })?;
        if !container.permissions.can_send_documents {
            return Err(AppError::Forbidden(format!(
                "Chat {:?} does not allow documents",
                container.title
            )));
        }

        let driver = Driver::new(
            self.db.clone(),
            self.backend.clone(),
            self.correlator.clone(),
            user.id,
            container.id,
            self.temp_dir.clone(),
            self.shutdown.child_token(),
        );

        // store the root so its mode and timestamps persist
        if !driver.stat(path::ROOT).await?.is_stored() {
            match driver.mkdir(path::ROOT, 0o755).await {
                Ok(_) => tracing::info!("Created root for {}", driver.owner()),
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(driver)
    }
}
