#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use mailswitch::command::CommandPolicy;
use mailswitch::daemon::{MailPoller, PollerConfig};
use mailswitch::domain::message::{Message, MessageUid};
use mailswitch::error::{DeviceError, MailError};
use mailswitch::mail::Mailbox;
use mailswitch::mail::session::SessionManager;
use mailswitch::switch::controller::SwitchController;
use mailswitch::switch::expiry::ExpiryMonitor;
use mailswitch::switch::marker::SwitchMarker;
use mailswitch::switch::{Power, SwitchDevice, SwitchDriver};

pub const NOTIFY: &str = "notification@myq.com";

/// Records every power command; can be made unreachable.
#[derive(Clone, Default)]
pub struct FakeDriver {
    log: Arc<Mutex<Vec<Power>>>,
    unreachable: Arc<AtomicBool>,
}

impl FakeDriver {
    pub fn commands(&self) -> Vec<Power> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, power: Power) -> usize {
        self.commands().iter().filter(|p| **p == power).count()
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }
}

impl SwitchDriver for FakeDriver {
    fn connect(&self) -> Result<Box<dyn SwitchDevice>, DeviceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeviceError::Unreachable {
                address: "fake".into(),
            });
        }
        Ok(Box::new(FakeDevice {
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeDevice {
    log: Arc<Mutex<Vec<Power>>>,
}

impl SwitchDevice for FakeDevice {
    fn name(&self) -> &str {
        "fake switch"
    }

    fn set_power(&self, power: Power) -> Result<(), DeviceError> {
        self.log.lock().unwrap().push(power);
        Ok(())
    }
}

/// In-memory mailbox: every message in `inbox` is unseen.
#[derive(Default)]
pub struct FakeMailbox {
    pub inbox: Vec<(MessageUid, Message)>,
    pub holding: Vec<Message>,
    pub deleted: Vec<MessageUid>,
    pub logins: u32,
    pub logouts: u32,
    pub selects: u32,
    pub fail_login: bool,
    pub fail_copy: bool,
    pub fail_delete: bool,
    /// Number of upcoming `select` calls that fail.
    pub failing_selects: u32,
    /// Clears the flag once `selects` reaches the given count.
    pub stop_after: Option<(Arc<AtomicBool>, u32)>,
}

impl FakeMailbox {
    pub fn with_messages(messages: &[(&str, &str)]) -> Self {
        let inbox = messages
            .iter()
            .enumerate()
            .map(|(i, (subject, sender))| (i as MessageUid + 1, Message::new(*subject, *sender)))
            .collect();
        Self {
            inbox,
            ..Self::default()
        }
    }
}

impl Mailbox for FakeMailbox {
    fn login(&mut self) -> Result<(), MailError> {
        if self.fail_login {
            return Err(MailError::NotConnected);
        }
        self.logins += 1;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailError> {
        self.logouts += 1;
        Ok(())
    }

    fn select(&mut self, _folder: &str) -> Result<u32, MailError> {
        self.selects += 1;
        if let Some((flag, n)) = &self.stop_after {
            if self.selects >= *n {
                flag.store(false, Ordering::SeqCst);
            }
        }
        if self.failing_selects > 0 {
            self.failing_selects -= 1;
            return Err(MailError::NotConnected);
        }
        Ok(self.inbox.len() as u32)
    }

    fn unseen_count(&mut self, _folder: &str) -> Result<u32, MailError> {
        Ok(self.inbox.len() as u32)
    }

    fn search_unseen(&mut self) -> Result<Vec<MessageUid>, MailError> {
        Ok(self.inbox.iter().map(|(uid, _)| *uid).collect())
    }

    fn fetch_envelopes(&mut self, uids: &[MessageUid]) -> Result<Vec<Message>, MailError> {
        Ok(self
            .inbox
            .iter()
            .filter(|(uid, _)| uids.contains(uid))
            .map(|(_, m)| m.clone())
            .collect())
    }

    fn copy(&mut self, uids: &[MessageUid], _folder: &str) -> Result<(), MailError> {
        if self.fail_copy {
            return Err(MailError::NotConnected);
        }
        let copied = self.fetch_envelopes(uids)?;
        self.holding.extend(copied);
        Ok(())
    }

    fn delete(&mut self, uids: &[MessageUid]) -> Result<(), MailError> {
        if self.fail_delete {
            return Err(MailError::NotConnected);
        }
        self.inbox.retain(|(uid, _)| !uids.contains(uid));
        self.deleted.extend_from_slice(uids);
        Ok(())
    }
}

pub fn controller(
    driver: &FakeDriver,
    marker_path: impl Into<std::path::PathBuf>,
    run_duration: Duration,
) -> Arc<SwitchController> {
    Arc::new(SwitchController::new(
        Arc::new(driver.clone()),
        SwitchMarker::new(marker_path),
        run_duration,
    ))
}

pub fn poller(
    mailbox: FakeMailbox,
    controller: &Arc<SwitchController>,
    run_budget: Duration,
    last_renewed: SystemTime,
) -> MailPoller<FakeMailbox> {
    poller_with_offset(mailbox, controller, run_budget, last_renewed, 0)
}

pub fn poller_with_offset(
    mailbox: FakeMailbox,
    controller: &Arc<SwitchController>,
    run_budget: Duration,
    last_renewed: SystemTime,
    new_mail_offset: u32,
) -> MailPoller<FakeMailbox> {
    MailPoller::new(
        mailbox,
        SessionManager::new(10, last_renewed),
        CommandPolicy {
            placeholder_subject: "camera".into(),
            notification_sender: NOTIFY.into(),
        },
        Arc::clone(controller),
        ExpiryMonitor::new(Arc::clone(controller), run_budget),
        PollerConfig {
            folder: "INBOX".into(),
            holding_folder: "Commands".into(),
            new_mail_offset,
            interval: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        },
    )
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
