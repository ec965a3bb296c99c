use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use recall_core::{ActivityRecord, PersistenceError};
use recall_engine::traits::{ActivityStore, IdentityProvider};

use crate::defaults::ACTIVITY_LOG_MAX_ENTRIES;

/// Activity log kept in a local JSON file, newest entry first.
#[derive(Debug)]
pub struct JsonActivityLog {
    path: PathBuf,
    max_entries: usize,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonActivityLog {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: ACTIVITY_LOG_MAX_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Vec<ActivityRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read activity log: {}", self.path.display()))?;
        let entries: Vec<ActivityRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse activity log: {}", self.path.display()))?;
        Ok(entries)
    }

    pub fn prepend(&self, record: ActivityRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();

        let mut entries = self.load()?;
        entries.insert(0, record);
        entries.truncate(self.max_entries);
        crate::files::write_json_atomic(&self.path, &entries)
            .with_context(|| format!("failed to write activity log: {}", self.path.display()))
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove activity log: {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for JsonActivityLog {
    async fn record_event(
        &self,
        activity: &str,
        notes: Option<&str>,
    ) -> Result<ActivityRecord, PersistenceError> {
        let record = ActivityRecord {
            id: uuid::Uuid::new_v4().to_string(),
            activity: activity.to_string(),
            confidence: None,
            notes: notes.map(str::to_string).filter(|n| !n.trim().is_empty()),
            recorded_at_unix_ms: now_ms(),
        };
        self.prepend(record.clone())
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))?;
        Ok(record)
    }

    async fn list_events(&self) -> Result<Vec<ActivityRecord>, PersistenceError> {
        self.load()
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))
    }
}

/// The local log belongs to whoever runs the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalUser;

impl IdentityProvider for LocalUser {
    fn is_authenticated(&self) -> bool {
        true
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_newest_first_and_limits_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonActivityLog::at_path(dir.path().join("activities.json")).with_max_entries(2);

        log.record_event("eating", Some("toast")).await.unwrap();
        log.record_event("drinking", None).await.unwrap();
        log.record_event("taking medication", Some("  ")).await.unwrap();

        let entries = log.list_events().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].activity, "taking medication");
        assert_eq!(entries[0].notes, None);
        assert_eq!(entries[1].activity, "drinking");
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonActivityLog::at_path(dir.path().join("none.json"));
        assert!(log.list_events().await.unwrap().is_empty());
        log.clear().unwrap();
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonActivityLog::at_path(dir.path().join("activities.json"));
        log.record_event("eating", None).await.unwrap();
        log.clear().unwrap();
        assert!(log.load().unwrap().is_empty());
        assert!(!log.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activities.json");
        fs::write(&path, "[{").unwrap();
        let log = JsonActivityLog::at_path(path);
        assert!(matches!(
            log.list_events().await,
            Err(PersistenceError::Unavailable(_))
        ));
    }
}
