use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::error::SwitchError;
use crate::switch::controller::SwitchController;
use crate::switch::marker::SwitchState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// No marker; the switch is off.
    Idle,
    Running { elapsed: Duration },
    ForcedStop { elapsed: Duration },
}

/// Forces the switch off once it has been on longer than the run budget.
/// Covers a worker that crashed, or a marker left over from a previous process.
pub struct ExpiryMonitor {
    controller: Arc<SwitchController>,
    run_budget: Duration,
}

impl ExpiryMonitor {
    pub fn new(controller: Arc<SwitchController>, run_budget: Duration) -> Self {
        Self {
            controller,
            run_budget,
        }
    }

    pub fn check(&self, now: SystemTime) -> Result<ExpiryOutcome, SwitchError> {
        let since = match self.controller.state()? {
            SwitchState::Off => return Ok(ExpiryOutcome::Idle),
            SwitchState::On { since } => since,
        };

        // A worker started after the marker was written is about to replace it.
        let since = match self.controller.active_since() {
            Some(started) if started > since => started,
            _ => since,
        };

        let elapsed = now.duration_since(since).unwrap_or(Duration::ZERO);
        debug!("switch on for = {} seconds", elapsed.as_secs());

        if elapsed <= self.run_budget {
            return Ok(ExpiryOutcome::Running { elapsed });
        }

        warn!(
            "switch on for {}s, over the {}s budget; stopping",
            elapsed.as_secs(),
            self.run_budget.as_secs()
        );
        self.controller.stop()?;
        info!("forced shutoff complete");
        Ok(ExpiryOutcome::ForcedStop { elapsed })
    }
}
