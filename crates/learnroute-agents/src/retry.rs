//! Retry policy with capped exponential backoff.
//!
//! Delay before retry `n` (zero-based) is `min(base * 2^n, max)`. With
//! jitter enabled up to 25% is added on top, still capped at `max`, and
//! each delay is clamped to at least the previous one so the sequence
//! never decreases.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(8_000),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic part of the delay before retry `retry` (zero-based).
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Fresh delay sequence for one invocation.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            retry: 0,
            last: Duration::ZERO,
        }
    }
}

/// Stateful delay iterator for one invocation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    retry: u32,
    last: Duration,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let base = self.policy.base_delay_for(self.retry);
        let candidate = if self.policy.jitter {
            let spread = (base.as_millis() / 4) as u64;
            let extra = if spread == 0 {
                0
            } else {
                rand::rng().random_range(0..=spread)
            };
            (base + Duration::from_millis(extra)).min(self.policy.max_delay)
        } else {
            base
        };

        self.retry = self.retry.saturating_add(1);
        self.last = self.last.max(candidate);
        self.last
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}
