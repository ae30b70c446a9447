//! Opt-in retry of crashed solves.
//!
//! The stage adapter never retries. Wrapping a solver in [`RetryingSolver`]
//! re-runs it after crash-class failures only; infeasibility, timeouts and
//! parse failures are returned on the first occurrence.

use super::{SolveOutcome, SolveRequest, Solver};
use crate::cancellation::CancellationToken;
use crate::errors::ConfigurationError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

fn default_max_attempts() -> usize {
    1
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Retry configuration for crashed solves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates a single-attempt policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Rejects a policy with no attempts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::new("retry needs at least one attempt")
                .with_field("solver.retry.max_attempts"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent))
            }
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64 + 1),
            BackoffStrategy::Constant => base,
        }
        .min(self.max_delay_ms);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full if delay > 0 => rand::thread_rng().gen_range(0..=delay),
            JitterStrategy::Equal if delay / 2 > 0 => {
                let half = delay / 2;
                half + rand::thread_rng().gen_range(0..=half)
            }
            JitterStrategy::Full | JitterStrategy::Equal => delay,
        };
        Duration::from_millis(jittered)
    }
}

/// Wraps a solver with crash retries.
#[derive(Debug, Clone)]
pub struct RetryingSolver<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Solver> RetryingSolver<S> {
    /// Wraps `inner` with `policy`.
    #[must_use]
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: Solver> Solver for RetryingSolver<S> {
    async fn solve(&self, request: &SolveRequest, cancel: &CancellationToken) -> SolveOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self.inner.solve(request, cancel).await;
            let retryable = matches!(&outcome, SolveOutcome::Error(f) if f.kind.is_transient());
            if !retryable || attempt + 1 >= self.policy.max_attempts || cancel.is_cancelled() {
                return outcome;
            }

            let delay = self.policy.delay_for(attempt);
            attempt += 1;
            tracing::debug!(
                stage = request.stage_index,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying crashed solve"
            );
            tokio::select! {
                () = cancel.cancelled() => return outcome,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
