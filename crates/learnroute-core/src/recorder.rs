//! Interaction recording: the audit record emitted after every routing cycle.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::agent::AgentCallResult;
use crate::error::Result;
use crate::types::{ActivitySummary, AgentUsage, DailyActivity, InteractionEvent, ResponseEnvelope};

/// How a routing cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed { envelope: ResponseEnvelope },
    Failed { code: String, message: String },
    Cancelled,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One line of the interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub cycle_id: String,
    pub recorded_at: DateTime<Utc>,
    pub event: InteractionEvent,
    /// Agent calls in issue order.
    pub calls: Vec<AgentCallResult>,
    pub outcome: CycleOutcome,
}

impl InteractionRecord {
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match &self.outcome {
            CycleOutcome::Completed { envelope } => Some(envelope),
            _ => None,
        }
    }
}

/// Sink for interaction records.
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    /// Persist one record. Appends only; never rewrites earlier records.
    async fn record(&self, record: &InteractionRecord) -> Result<()>;

    /// Most recent records for a user, newest first.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>>;

    /// Aggregate a user's activity over the trailing `days`.
    async fn activity_summary(&self, user_id: &str, days: u32) -> Result<ActivitySummary>;
}

/// Build an activity summary from a user's records as of `now`.
pub fn summarize<'a>(
    records: impl IntoIterator<Item = &'a InteractionRecord>,
    user_id: &str,
    days: u32,
    now: DateTime<Utc>,
) -> ActivitySummary {
    let since = now - Duration::days(i64::from(days));
    let mut daily: BTreeMap<chrono::NaiveDate, DailyActivity> = BTreeMap::new();
    let mut agents: BTreeMap<_, (u64, u64, u64)> = BTreeMap::new();
    let mut total_cycles = 0;

    for record in records {
        if record.event.user_id != user_id || record.recorded_at < since {
            continue;
        }
        total_cycles += 1;

        let date = record.recorded_at.date_naive();
        let day = daily.entry(date).or_insert_with(|| DailyActivity {
            date,
            ..DailyActivity::default()
        });
        day.total += 1;
        *day.by_intent
            .entry(record.event.intent.as_str().to_string())
            .or_default() += 1;

        for call in &record.calls {
            let (total, ok, latency) = agents.entry(call.agent).or_default();
            *total += 1;
            if call.success {
                *ok += 1;
            }
            *latency += call.latency_ms;
        }
    }

    ActivitySummary {
        period_days: days,
        total_cycles,
        daily: daily.into_values().collect(),
        agents: agents
            .into_iter()
            .map(|(agent, (total, ok, latency))| {
                let usage = AgentUsage {
                    total_calls: total,
                    successful_calls: ok,
                    avg_latency_ms: latency as f64 / total as f64,
                };
                (agent, usage)
            })
            .collect(),
    }
}

/// In-process recorder. Used by tests and `--no-record` runs.
#[derive(Default)]
pub struct MemoryRecorder {
    records: RwLock<Vec<InteractionRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in record order.
    pub async fn records(&self) -> Vec<InteractionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl InteractionRecorder for MemoryRecorder {
    async fn record(&self, record: &InteractionRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.event.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn activity_summary(&self, user_id: &str, days: u32) -> Result<ActivitySummary> {
        let records = self.records.read().await;
        Ok(summarize(records.iter(), user_id, days, Utc::now()))
    }
}

/// Discards everything; used when recording is disabled.
pub struct NullRecorder;

#[async_trait]
impl InteractionRecorder for NullRecorder {
    async fn record(&self, _record: &InteractionRecord) -> Result<()> {
        Ok(())
    }

    async fn recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<InteractionRecord>> {
        Ok(Vec::new())
    }

    async fn activity_summary(&self, _user_id: &str, days: u32) -> Result<ActivitySummary> {
        Ok(ActivitySummary {
            period_days: days,
            ..ActivitySummary::default()
        })
    }
}
