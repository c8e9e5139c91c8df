//! JSONL interaction store: one append-only line per routing cycle.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::recorder::{InteractionRecord, InteractionRecorder, summarize};
use crate::types::ActivitySummary;

/// File-based recorder.
///
/// Layout: `<base>/interactions.jsonl`, one `InteractionRecord` per line.
/// Each record is a single `O_APPEND` write, so concurrent cycles never
/// interleave partial lines and no lock is taken.
pub struct JsonlInteractionStore {
    base: PathBuf,
}

impl JsonlInteractionStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Default store location: `~/.learnroute/records/`
    pub fn default_path() -> PathBuf {
        crate::config::data_dir().join("records")
    }

    pub fn log_path(&self) -> PathBuf {
        self.base.join("interactions.jsonl")
    }

    async fn load_all(&self) -> Result<Vec<InteractionRecord>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut records = Vec::new();
        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InteractionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping corrupt interaction record"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl InteractionRecorder for JsonlInteractionStore {
    async fn record(&self, record: &InteractionRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(cycle_id = %record.cycle_id, outcome = record.outcome.label(), "Recorded interaction");
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        let records = self.load_all().await?;
        Ok(records
            .into_iter()
            .rev()
            .filter(|r| r.event.user_id == user_id)
            .take(limit)
            .collect())
    }

    async fn activity_summary(&self, user_id: &str, days: u32) -> Result<ActivitySummary> {
        let records = self.load_all().await?;
        Ok(summarize(&records, user_id, days, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCallResult, AgentId};
    use crate::recorder::CycleOutcome;
    use crate::types::{InteractionEvent, InteractionIntent};
    use std::sync::Arc;

    fn test_record(user: &str) -> InteractionRecord {
        InteractionRecord {
            cycle_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            event: InteractionEvent::new(user, InteractionIntent::ProgressQuery),
            calls: vec![AgentCallResult::succeeded(
                AgentId::ProgressTracker,
                serde_json::json!({"mastery_levels": {}}),
                42,
                1,
            )],
            outcome: CycleOutcome::Failed {
                code: "agent6_bad_status".into(),
                message: "HTTP 500".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlInteractionStore::new(dir.path().to_path_buf());

        let record = test_record("u1");
        store.record(&record).await.unwrap();

        let recent = store.recent("u1", 10).await.unwrap();
        assert_eq!(recent, vec![record]);
        assert!(store.recent("u2", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlInteractionStore::new(dir.path().join("nested"));
        assert!(store.recent("u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlInteractionStore::new(dir.path().to_path_buf());
        store.record(&test_record("u1")).await.unwrap();

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(store.log_path())
            .await
            .unwrap();
        file.write_all(b"{not json\n").await.unwrap();
        drop(file);

        store.record(&test_record("u1")).await.unwrap();
        assert_eq!(store.recent("u1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlInteractionStore::new(dir.path().to_path_buf()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record(&test_record("u1")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let data = std::fs::read_to_string(store.log_path()).unwrap();
        assert_eq!(data.lines().count(), 16);
        assert_eq!(store.recent("u1", 100).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_activity_summary_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlInteractionStore::new(dir.path().to_path_buf());
        store.record(&test_record("u1")).await.unwrap();
        store.record(&test_record("u1")).await.unwrap();

        let summary = store.activity_summary("u1", 30).await.unwrap();
        assert_eq!(summary.total_cycles, 2);
        assert_eq!(summary.agents[&AgentId::ProgressTracker].successful_calls, 2);
    }
}
