//! Backoff policy for the response pipeline's retry loop.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shape of the delay sequence between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    Exponential,
}

/// Delay sequence plus a cancellation-aware wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let base = self.base_delay.as_millis() as u64;
                let cap = self.max_delay.as_millis() as u64;
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                Duration::from_millis(base.saturating_mul(factor).min(cap))
            }
        }
    }

    /// Sleep for the delay of `attempt`, returning early with
    /// [`Error::Cancelled`] if `cancel` fires.
    pub async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = self.delay_for(attempt);
        if delay.is_zero() {
            return if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
