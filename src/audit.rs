//! Audit log of lifecycle events
//!
//! Writes JSON lines to `<state dir>/audit.log`: installs, activations,
//! store deletions, debug-flag toggles and handoffs. Enabled by default;
//! turn off with `general.audit_log = false`.

use crate::config::{schema::Config, ConfigManager};
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Event names written to the log
pub mod events {
    pub const INSTALL_COMPLETE: &str = "controller.installed";
    pub const ACTIVATED: &str = "controller.activated";
    pub const STORES_DELETED: &str = "store.deleted";
    pub const PWA_DISABLED: &str = "pwa.disabled";
    pub const PWA_ENABLED: &str = "pwa.enabled";
    pub const HANDOFF: &str = "client.handoff";
}

/// File-based audit logger that appends JSON lines
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new audit logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Log an audit event as a JSON line
    ///
    /// Drops events on IO failure; lifecycle work never waits on the log.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!(path = %self.path.display(), "Failed to write audit log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_audit_log(dir: &TempDir, enabled: bool) -> AuditLog {
        AuditLog {
            enabled,
            path: dir.path().join("state").join("audit.log"),
        }
    }

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, true);

        audit
            .log(
                events::ACTIVATED,
                &serde_json::json!({"store": "quiz-app-v1.0.1", "deleted": ["quiz-app-v1.0.0"]}),
            )
            .await;

        let content = tokio::fs::read_to_string(&audit.path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "controller.activated");
        assert_eq!(parsed["data"]["store"], "quiz-app-v1.0.1");
        assert_eq!(parsed["data"]["deleted"][0], "quiz-app-v1.0.0");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn appends_multiple_lines() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, true);

        audit.log(events::PWA_DISABLED, &serde_json::json!({})).await;
        audit.log(events::PWA_ENABLED, &serde_json::json!({})).await;

        let content = tokio::fs::read_to_string(&audit.path).await.unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, false);

        audit.log(events::HANDOFF, &serde_json::json!({})).await;

        assert!(!audit.path.exists());
    }
}
