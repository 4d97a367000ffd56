pub mod failures;

use anyhow::Result;
use log::{debug, error, info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant, SystemTime},
};

use crate::command::{Action, CommandPolicy, interpret};
use crate::config::Config;
use crate::daemon::failures::FailureStats;
use crate::domain::message::Message;
use crate::error::{CycleError, FailureKind};
use crate::mail::Mailbox;
use crate::mail::session::SessionManager;
use crate::switch::controller::{StartOutcome, SwitchController};
use crate::switch::expiry::{ExpiryMonitor, ExpiryOutcome};

/// Log loudly every this many consecutive connectivity failures.
const OUTAGE_REPORT_EVERY: u32 = 10;

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub folder: String,
    pub holding_folder: String,
    pub new_mail_offset: u32,
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl From<&Config> for PollerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            folder: cfg.mailbox.folder.clone(),
            holding_folder: cfg.mailbox.holding_folder.clone(),
            new_mail_offset: cfg.poll.new_mail_offset,
            interval: cfg.poll.interval(),
            max_backoff: cfg.poll.max_backoff(),
        }
    }
}

/// What one successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub renewed: bool,
    pub unseen: u32,
    pub actions: Vec<Action>,
    pub expiry: ExpiryOutcome,
}

struct MailPhase {
    renewed: bool,
    unseen: u32,
    actions: Vec<Action>,
}

pub struct MailPoller<M: Mailbox> {
    mailbox: M,
    session: SessionManager,
    policy: CommandPolicy,
    controller: Arc<SwitchController>,
    monitor: ExpiryMonitor,
    cfg: PollerConfig,
    stats: FailureStats,
}

impl<M: Mailbox> MailPoller<M> {
    pub fn new(
        mailbox: M,
        session: SessionManager,
        policy: CommandPolicy,
        controller: Arc<SwitchController>,
        monitor: ExpiryMonitor,
        cfg: PollerConfig,
    ) -> Self {
        Self {
            mailbox,
            session,
            policy,
            controller,
            monitor,
            cfg,
            stats: FailureStats::default(),
        }
    }

    /// Wires a poller from the loaded config. `now` counts as the last login.
    pub fn from_config(
        cfg: &Config,
        mailbox: M,
        controller: Arc<SwitchController>,
        now: SystemTime,
    ) -> Self {
        let monitor = ExpiryMonitor::new(Arc::clone(&controller), cfg.switch.run_budget());
        Self::new(
            mailbox,
            SessionManager::new(cfg.poll.renew_minutes, now),
            CommandPolicy::from(&cfg.commands),
            controller,
            monitor,
            PollerConfig::from(cfg),
        )
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    pub fn mailbox_mut(&mut self) -> &mut M {
        &mut self.mailbox
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn stats(&self) -> &FailureStats {
        &self.stats
    }

    /// One poll cycle: renew, read mail, dispatch, then the expiry check.
    /// The expiry check runs even when the mail phase failed.
    pub fn run_cycle(&mut self, now: SystemTime) -> Result<CycleReport, CycleError> {
        let mail = self.mail_phase(now);
        let expiry = self.monitor.check(now);

        match (mail, expiry) {
            (Ok(m), Ok(expiry)) => Ok(CycleReport {
                renewed: m.renewed,
                unseen: m.unseen,
                actions: m.actions,
                expiry,
            }),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(mail), Err(expiry)) => Err(CycleError::Both {
                mail: Box::new(mail),
                expiry,
            }),
        }
    }

    fn mail_phase(&mut self, now: SystemTime) -> Result<MailPhase, CycleError> {
        let renewed = self.session.renew_if_due(&mut self.mailbox, now)?;

        let total = self.mailbox.select(&self.cfg.folder)?;
        debug!("{total} messages in {}", self.cfg.folder);

        let unseen = self.mailbox.unseen_count(&self.cfg.folder)?;
        debug!("{unseen} new emails");

        let mut actions = Vec::new();
        if unseen > self.cfg.new_mail_offset {
            let messages = self.process_new_mail()?;
            actions = interpret(&messages, &self.policy);
            // the batch is already out of the inbox, so every action gets its turn
            dispatch_all(&actions, |action| self.dispatch(action))?;
        }

        Ok(MailPhase {
            renewed,
            unseen,
            actions,
        })
    }

    /// Copies unseen mail to the holding folder, reads the envelopes, then removes
    /// the batch from the inbox. A failed copy leaves the inbox untouched.
    fn process_new_mail(&mut self) -> Result<Vec<Message>, CycleError> {
        let uids = self.mailbox.search_unseen()?;
        if uids.is_empty() {
            return Ok(vec![]);
        }
        let count = uids.len();

        debug!("copying {count} email(s) to {}", self.cfg.holding_folder);
        self.mailbox
            .copy(&uids, &self.cfg.holding_folder)
            .map_err(|source| CycleError::Relocation { count, source })?;

        let messages = self.mailbox.fetch_envelopes(&uids)?;

        debug!("deleting {count} email(s) from {}", self.cfg.folder);
        self.mailbox
            .delete(&uids)
            .map_err(|source| CycleError::Removal { count, source })?;

        Ok(messages)
    }

    fn dispatch(&self, action: Action) -> Result<(), CycleError> {
        match action {
            Action::Placeholder => info!("running camera command... (reserved, no-op)"),
            Action::ActivateSwitch => {
                info!("running switch command...");
                if self.controller.start()? == StartOutcome::AlreadyRunning {
                    debug!("switch already on; activation skipped");
                }
            }
        }
        Ok(())
    }

    /// Runs cycles until `running` is cleared. A failed cycle is logged and the
    /// loop carries on.
    pub fn run(&mut self, running: &AtomicBool) {
        info!("Running mail poller...");
        while running.load(Ordering::SeqCst) {
            let backoff = match self.run_cycle(SystemTime::now()) {
                Ok(report) => {
                    debug!("cycle: {report:?}");
                    if let Some(n) = self.stats.record_success() {
                        info!("recovered after {n} failed cycle(s); {}", self.stats.summary());
                    }
                    Duration::ZERO
                }
                Err(e) => {
                    self.record_failure(&e);
                    self.stats.backoff(self.cfg.interval, self.cfg.max_backoff)
                }
            };
            if !backoff.is_zero() {
                debug!("backing off for an extra {backoff:?}");
            }
            sleep_while_running(self.cfg.interval + backoff, running);
        }
    }

    fn record_failure(&mut self, e: &CycleError) {
        let kind = e.kind();
        self.stats.record_failure(kind);
        match kind {
            FailureKind::Connectivity => {
                let streak = self.stats.connectivity_streak();
                if streak % OUTAGE_REPORT_EVERY == 0 {
                    error!(
                        "unreachable for {streak} consecutive cycles ({} total): {e}",
                        self.stats.total(kind)
                    );
                } else {
                    warn!("cycle failed, retrying: {e}");
                }
            }
            FailureKind::Batch => warn!("command mail left in place for next cycle: {e}"),
            FailureKind::Local => error!("cycle failed: {e}"),
        }
    }
}

/// Runs every action even when an earlier one fails. Returns the first error.
fn dispatch_all(
    actions: &[Action],
    mut dispatch: impl FnMut(Action) -> Result<(), CycleError>,
) -> Result<(), CycleError> {
    let mut first = None;
    for &action in actions {
        if let Err(e) = dispatch(action) {
            error!("{action:?} failed: {e}");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(SHUTDOWN_POLL));
    }
}

/// Returns a flag that SIGINT, SIGTERM or SIGHUP clears. Installs once per process.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Polls until a termination signal, then switches off any running activation and logs out.
pub fn run_daemon<M: Mailbox>(
    mut poller: MailPoller<M>,
    controller: Arc<SwitchController>,
) -> Result<()> {
    let running = install_shutdown_handler()?;

    poller.run(&running);

    info!("shutting down");
    if controller.running() {
        if let Err(e) = controller.stop() {
            error!("could not stop switch on shutdown: {e}");
        }
    }
    if let Err(e) = poller.mailbox_mut().logout() {
        warn!("logout failed: {e}");
    }
    Ok(())
}
