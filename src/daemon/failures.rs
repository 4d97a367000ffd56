use std::collections::HashMap;
use std::time::Duration;

use crate::error::FailureKind;

/// Per-kind failure counts for the poll loop.
#[derive(Debug, Default)]
pub struct FailureStats {
    totals: HashMap<FailureKind, u64>,
    failed_cycles: u32,
    connectivity_streak: u32,
}

impl FailureStats {
    pub fn record_failure(&mut self, kind: FailureKind) {
        *self.totals.entry(kind).or_default() += 1;
        self.failed_cycles += 1;
        if kind == FailureKind::Connectivity {
            self.connectivity_streak += 1;
        } else {
            self.connectivity_streak = 0;
        }
    }

    /// Resets the streaks. Returns the number of failed cycles that preceded this success.
    pub fn record_success(&mut self) -> Option<u32> {
        self.connectivity_streak = 0;
        match std::mem::take(&mut self.failed_cycles) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn total(&self, kind: FailureKind) -> u64 {
        self.totals.get(&kind).copied().unwrap_or(0)
    }

    /// Lifetime totals per kind, e.g. `connectivity=3 batch=1 local=0`.
    pub fn summary(&self) -> String {
        format!(
            "connectivity={} batch={} local={}",
            self.total(FailureKind::Connectivity),
            self.total(FailureKind::Batch),
            self.total(FailureKind::Local)
        )
    }

    pub fn connectivity_streak(&self) -> u32 {
        self.connectivity_streak
    }

    /// Extra delay after consecutive connectivity failures: `base * 2^(n-1)`, capped.
    pub fn backoff(&self, base: Duration, cap: Duration) -> Duration {
        if self.connectivity_streak == 0 {
            return Duration::ZERO;
        }
        let exp = (self.connectivity_streak - 1).min(16);
        base.saturating_mul(1 << exp).min(cap)
    }
}
