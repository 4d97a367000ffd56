use log::{info, warn};
use std::time::{Duration, SystemTime};

use crate::error::MailError;
use crate::mail::Mailbox;

/// Re-authenticates the mailbox session every `renew_minutes`.
#[derive(Debug, Clone)]
pub struct SessionManager {
    renew_minutes: u64,
    last_renewed: SystemTime,
}

impl SessionManager {
    pub fn new(renew_minutes: u64, last_renewed: SystemTime) -> Self {
        Self {
            renew_minutes,
            last_renewed,
        }
    }

    pub fn last_renewed(&self) -> SystemTime {
        self.last_renewed
    }

    /// Whole minutes since the last renewal. A clock that went backwards counts as zero.
    pub fn elapsed_minutes(&self, now: SystemTime) -> u64 {
        now.duration_since(self.last_renewed)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            / 60
    }

    /// Logs out and back in once the renew interval has passed.
    /// Returns whether a renewal happened.
    pub fn renew_if_due<M: Mailbox + ?Sized>(
        &mut self,
        mailbox: &mut M,
        now: SystemTime,
    ) -> Result<bool, MailError> {
        if self.elapsed_minutes(now) < self.renew_minutes {
            return Ok(false);
        }

        info!("renewing session...");
        if let Err(e) = mailbox.logout() {
            warn!("logout before renewal failed: {e}");
        }
        mailbox.login()?;
        self.last_renewed = now;
        info!("session renewed");
        Ok(true)
    }
}
