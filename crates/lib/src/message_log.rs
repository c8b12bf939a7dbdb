//! Per-user message log: the last answered message of each user, one file per user.
//!
//! Files live at `<dir>/ai_<userId>.txt` and are truncated on every write (last write wins).
//! Concurrent writes for the same user are not coordinated.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Writes the raw inbound text of a user to a file named after the user id.
#[derive(Debug, Clone)]
pub struct MessageLog {
    dir: PathBuf,
}

impl MessageLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file for `user_id`. Fails for ids that could escape the log directory.
    pub fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.contains('\0')
        {
            anyhow::bail!("refusing to log message for unsafe user id {:?}", user_id);
        }
        Ok(self.dir.join(format!("ai_{}.txt", user_id)))
    }

    /// Create (or truncate) the user's file and write `payload` in full. Returns the path written.
    pub async fn record(&self, user_id: &str, payload: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(user_id)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("writing message log {}", path.display()))?;
        log::debug!("message log: wrote {} bytes to {}", payload.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("linegem-message-log-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn path_follows_user_id_pattern() {
        let log = MessageLog::new("/tmp");
        assert_eq!(
            log.path_for("U4af4980629").unwrap(),
            PathBuf::from("/tmp/ai_U4af4980629.txt")
        );
    }

    #[test]
    fn unsafe_user_ids_are_rejected() {
        let log = MessageLog::new("/tmp");
        for id in ["", "../etc/passwd", "a/b", "a\\b", "..", "x\0y"] {
            assert!(log.path_for(id).is_err(), "accepted {:?}", id);
        }
    }

    #[tokio::test]
    async fn record_overwrites_previous_content() {
        let dir = temp_dir();
        let log = MessageLog::new(&dir);

        let path = log
            .record("U1", "a much longer first message".as_bytes())
            .await
            .unwrap();
        let path2 = log.record("U1", "短".as_bytes()).await.unwrap();
        assert_eq!(path, path2);
        assert_eq!(std::fs::read(&path).unwrap(), "短".as_bytes());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn record_keeps_users_separate() {
        let dir = temp_dir();
        let log = MessageLog::new(&dir);
        log.record("U1", b"one").await.unwrap();
        log.record("U2", b"two").await.unwrap();
        assert_eq!(std::fs::read(dir.join("ai_U1.txt")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.join("ai_U2.txt")).unwrap(), b"two");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn record_reports_write_failure() {
        let dir = temp_dir().join("does-not-exist");
        let log = MessageLog::new(&dir);
        let err = log.record("U1", b"hello").await.unwrap_err();
        assert!(err.to_string().contains("writing message log"), "{err}");
    }
}
