//! Per-cycle bookkeeping that must survive cancellation of the routing future.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use learnroute_core::agent::{AgentCallError, AgentCallResult, AgentId};

struct Slot {
    agent: AgentId,
    issued: Instant,
    result: Option<AgentCallResult>,
}

/// Agent calls in issue order. A slot is reserved when a call is issued and
/// filled when it completes, so concurrent calls keep a stable order.
#[derive(Default)]
pub struct CallLog {
    slots: Mutex<Vec<Slot>>,
}

impl CallLog {
    pub fn issue(&self, agent: AgentId) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.push(Slot {
            agent,
            issued: Instant::now(),
            result: None,
        });
        slots.len() - 1
    }

    pub fn complete(&self, slot: usize, result: AgentCallResult) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = slots.get_mut(slot) {
            entry.result = Some(result);
        }
    }

    pub fn agents(&self) -> Vec<AgentId> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().map(|s| s.agent).collect()
    }

    /// Drain the log. Calls still in flight are reported as cancelled.
    pub fn finish(&self) -> Vec<AgentCallResult> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .drain(..)
            .map(|slot| {
                slot.result.unwrap_or_else(|| {
                    AgentCallResult::failed(
                        slot.agent,
                        AgentCallError::Cancelled,
                        millis(slot.issued.elapsed()),
                        0,
                    )
                })
            })
            .collect()
    }
}

/// State of one routing cycle, owned outside the routing future.
pub struct Cycle {
    pub id: String,
    pub started: Instant,
    /// Time allowed for one phase of optional calls.
    pub optional_budget: Duration,
    pub calls: CallLog,
}

impl Cycle {
    pub fn new(optional_budget: Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            optional_budget,
            calls: CallLog::default(),
        }
    }

    /// Deadline for an optional phase starting now. Time spent on required
    /// calls never eats into it.
    pub fn optional_deadline(&self) -> tokio::time::Instant {
        tokio::time::Instant::now() + self.optional_budget
    }

    pub fn optional_budget_ms(&self) -> u64 {
        millis(self.optional_budget)
    }

    pub fn elapsed_ms(&self) -> u64 {
        millis(self.started.elapsed())
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
