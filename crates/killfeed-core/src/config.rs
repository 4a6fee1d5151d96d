use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KillfeedError, Result};

/// Engine settings. Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path of the kill-feed file on the remote host.
    pub feed_path: String,
    pub log_poll_secs: u64,
    pub presence_poll_secs: u64,
    pub flush_secs: u64,
    /// Seconds between checks for admin commands queued by other processes.
    pub admin_poll_secs: u64,
    /// Upper bound on a single remote fetch.
    pub io_timeout_secs: u64,
    /// Parsed batches that may queue between the feed and the aggregator.
    pub event_channel_capacity: usize,
    pub enable_kill_feed: bool,
    pub enable_presence: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_path: String::new(),
            log_poll_secs: 30,
            presence_poll_secs: 180,
            flush_secs: 600,
            admin_poll_secs: 5,
            io_timeout_secs: 10,
            event_channel_capacity: 64,
            enable_kill_feed: true,
            enable_presence: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            KillfeedError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            KillfeedError::Config(format!("invalid config {}: {}", path.display(), e))
        })
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_secs(self.log_poll_secs)
    }

    pub fn presence_poll_interval(&self) -> Duration {
        Duration::from_secs(self.presence_poll_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_secs)
    }

    pub fn admin_poll_interval(&self) -> Duration {
        Duration::from_secs(self.admin_poll_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Settings the kill feed job needs. A failure disables only that job.
    pub fn validate_kill_feed(&self) -> Result<()> {
        if self.feed_path.trim().is_empty() {
            return Err(KillfeedError::Config("kill feed path is not set".into()));
        }
        if self.log_poll_secs == 0 {
            return Err(KillfeedError::Config("log poll interval must be positive".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(KillfeedError::Config("event channel capacity must be positive".into()));
        }
        self.validate_timeout()
    }

    pub fn validate_presence(&self) -> Result<()> {
        if self.presence_poll_secs == 0 {
            return Err(KillfeedError::Config("presence poll interval must be positive".into()));
        }
        self.validate_timeout()
    }

    pub fn validate_flush(&self) -> Result<()> {
        if self.flush_secs == 0 {
            return Err(KillfeedError::Config("flush interval must be positive".into()));
        }
        Ok(())
    }

    pub fn validate_admin(&self) -> Result<()> {
        if self.admin_poll_secs == 0 {
            return Err(KillfeedError::Config("admin poll interval must be positive".into()));
        }
        Ok(())
    }

    fn validate_timeout(&self) -> Result<()> {
        if self.io_timeout_secs == 0 {
            return Err(KillfeedError::Config("IO timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.log_poll_interval(), Duration::from_secs(30));
        assert_eq!(config.presence_poll_interval(), Duration::from_secs(180));
        assert_eq!(config.flush_interval(), Duration::from_secs(600));
        assert!(config.validate_presence().is_ok());
        assert!(config.validate_flush().is_ok());
        assert!(config.validate_kill_feed().is_err());
    }

    #[test]
    fn test_partial_json() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(br#"{"feed_path": "/srv/TheIsle/Saved/Logs/KillFeed.log", "log_poll_secs": 15}"#)
            .unwrap();
        let config = EngineConfig::from_json_file(tmp.path()).unwrap();
        assert_eq!(config.feed_path, "/srv/TheIsle/Saved/Logs/KillFeed.log");
        assert_eq!(config.log_poll_secs, 15);
        assert_eq!(config.presence_poll_secs, 180);
        assert!(config.validate_kill_feed().is_ok());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"{ nope").unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(tmp.path()),
            Err(KillfeedError::Config(_))
        ));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = EngineConfig {
            feed_path: "kills.log".into(),
            log_poll_secs: 0,
            presence_poll_secs: 0,
            admin_poll_secs: 0,
            ..Default::default()
        };
        assert!(config.validate_kill_feed().is_err());
        assert!(config.validate_presence().is_err());
        assert!(config.validate_admin().is_err());
        assert!(config.validate_flush().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_remote_jobs() {
        let config = EngineConfig {
            feed_path: "kills.log".into(),
            io_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate_kill_feed().is_err());
        assert!(config.validate_presence().is_err());
        assert!(config.validate_flush().is_ok());
    }
}
