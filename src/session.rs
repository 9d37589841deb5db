use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SESSION_FILE: &str = "session.json";

/// Opaque signed-in user record. Presence is all that gates commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    path: PathBuf,
    current: Arc<Mutex<Option<SessionUser>>>,
}

impl SessionManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted session, if any. An unreadable file is treated as
    /// signed out and removed.
    pub async fn restore(&self) -> AppResult<Option<SessionUser>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let user = match serde_json::from_str::<SessionUser>(&raw) {
            Ok(user) => Some(user),
            Err(error) => {
                tracing::warn!(path = %self.path.display(), error = %error, "discarding corrupt session file");
                tokio::fs::remove_file(&self.path).await?;
                None
            }
        };

        let mut current = self.current.lock().await;
        *current = user.clone();
        Ok(user)
    }

    pub async fn begin(&self, username: &str, full_name: Option<String>) -> AppResult<SessionUser> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("username is required".to_string()));
        }

        let user = SessionUser {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            full_name,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&user)?).await?;

        let mut current = self.current.lock().await;
        *current = Some(user.clone());
        tracing::info!(username = %user.username, "session started");
        Ok(user)
    }

    pub async fn end(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        let mut current = self.current.lock().await;
        if let Some(user) = current.take() {
            tracing::info!(username = %user.username, "session ended");
        }
        Ok(())
    }

    pub async fn current(&self) -> Option<SessionUser> {
        self.current.lock().await.clone()
    }

    pub async fn require(&self) -> AppResult<SessionUser> {
        self.current()
            .await
            .ok_or_else(|| AppError::Unauthorized("sign in first: empire-dashboard login <username>".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_persists_and_restore_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::new(dir.path());
        assert!(manager.restore().await.expect("restore").is_none());
        assert!(matches!(manager.require().await, Err(AppError::Unauthorized(_))));

        let user = manager.begin("aisha", Some("Aisha Rahman".to_string())).await.expect("begin");
        assert!(manager.path().exists());

        let fresh = SessionManager::new(dir.path());
        let restored = fresh.restore().await.expect("restore");
        assert_eq!(restored, Some(user.clone()));
        assert_eq!(fresh.require().await.expect("require"), user);
    }

    #[tokio::test]
    async fn end_clears_file_and_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::new(dir.path());
        manager.begin("aisha", None).await.expect("begin");
        manager.end().await.expect("end");
        assert!(manager.current().await.is_none());
        assert!(!manager.path().exists());
        manager.end().await.expect("second end is a no-op");
    }

    #[tokio::test]
    async fn corrupt_session_file_counts_as_signed_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::new(dir.path());
        tokio::fs::write(manager.path(), b"{not json").await.expect("write");
        assert!(manager.restore().await.expect("restore").is_none());
        assert!(!manager.path().exists());
    }

    #[tokio::test]
    async fn blank_username_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::new(dir.path());
        assert!(matches!(manager.begin("   ", None).await, Err(AppError::Validation(_))));
    }
}
