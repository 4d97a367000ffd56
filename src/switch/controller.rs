use log::{error, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::error::SwitchError;
use crate::switch::marker::{SwitchMarker, SwitchState};
use crate::switch::{Power, SwitchDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A previous activation is still running; nothing was spawned.
    AlreadyRunning,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: Sender<()>,
    started_at: SystemTime,
}

/// Runs timed on/off cycles of one switch.
pub struct SwitchController {
    driver: Arc<dyn SwitchDriver>,
    marker: Arc<SwitchMarker>,
    run_duration: Duration,
    worker: Mutex<Option<Worker>>,
}

impl SwitchController {
    pub fn new(driver: Arc<dyn SwitchDriver>, marker: SwitchMarker, run_duration: Duration) -> Self {
        Self {
            driver,
            marker: Arc::new(marker),
            run_duration,
            worker: Mutex::new(None),
        }
    }

    pub fn marker(&self) -> &SwitchMarker {
        &self.marker
    }

    pub fn state(&self) -> Result<SwitchState, SwitchError> {
        self.marker.read().map_err(SwitchError::Marker)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawns an activation worker unless one is already running.
    /// The marker is written by the worker, so it may not exist yet on return.
    pub fn start(&self) -> Result<StartOutcome, SwitchError> {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            info!("activation already running; ignoring start");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Some(done) = slot.take() {
            reap(done);
        }

        let (cancel, cancelled) = mpsc::channel();
        let run = ActivationRun {
            driver: Arc::clone(&self.driver),
            marker: Arc::clone(&self.marker),
            run_duration: self.run_duration,
        };
        let handle = thread::Builder::new()
            .name("activation-worker".to_string())
            .spawn(move || run.execute(cancelled))
            .map_err(SwitchError::Spawn)?;

        *slot = Some(Worker {
            handle,
            cancel,
            started_at: SystemTime::now(),
        });
        info!("activation started for {:?}", self.run_duration);
        Ok(StartOutcome::Started)
    }

    /// Forces the switch off and clears the marker. A live worker is woken and
    /// joined first; it still sends its own "off", which the device tolerates.
    pub fn stop(&self) -> Result<(), SwitchError> {
        let mut slot = self.slot();
        if let Some(w) = slot.take() {
            let _ = w.cancel.send(());
            reap(w);
        }

        let device = self.driver.connect()?;
        info!("stop - {}", device.name());
        device.set_power(Power::Off)?;
        let cleared = self.marker.clear().map_err(SwitchError::Marker)?;
        if cleared {
            info!("stop - switch off");
        } else {
            info!("stop - switch off (no marker)");
        }
        Ok(())
    }

    /// Whether the worker from the last `start()` is still alive.
    pub fn running(&self) -> bool {
        self.active_since().is_some()
    }

    /// Start time of the live worker, if any. Forgets a worker that has exited.
    pub fn active_since(&self) -> Option<SystemTime> {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(w) if !w.handle.is_finished() => Some(w.started_at),
            Some(_) => {
                if let Some(done) = slot.take() {
                    reap(done);
                }
                None
            }
            None => None,
        }
    }

    /// Blocks until the current activation, if any, runs to completion.
    pub fn wait(&self) {
        let worker = self.slot().take();
        if let Some(Worker { handle, cancel, .. }) = worker {
            if handle.join().is_err() {
                error!("activation worker panicked");
            }
            drop(cancel);
        }
    }
}

fn reap(worker: Worker) {
    if worker.handle.join().is_err() {
        error!("activation worker panicked");
    }
}

/// One on -> sleep -> off cycle, owned by the worker thread.
struct ActivationRun {
    driver: Arc<dyn SwitchDriver>,
    marker: Arc<SwitchMarker>,
    run_duration: Duration,
}

impl ActivationRun {
    fn execute(self, cancelled: Receiver<()>) {
        let device = match self.driver.connect() {
            Ok(d) => d,
            Err(e) => {
                error!("run - could not reach switch: {e}");
                return;
            }
        };
        info!("run - {}", device.name());

        if let Err(e) = device.set_power(Power::On) {
            error!("run - switch on failed: {e}");
            return;
        }
        if let Err(e) = self.marker.write(SystemTime::now()) {
            error!(
                "run - could not write marker {}: {e}",
                self.marker.path().display()
            );
        }
        info!("run - switch on");

        match cancelled.recv_timeout(self.run_duration) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => info!("run - cancelled early"),
        }

        let off = device.set_power(Power::Off).or_else(|e| {
            warn!("run - switch off failed ({e}); reconnecting");
            self.driver.connect()?.set_power(Power::Off)
        });
        if let Err(e) = off {
            // leave the marker so the expiry check retries the shutoff
            error!("run - switch off failed: {e}");
            return;
        }

        match self.marker.clear() {
            Ok(_) => info!("run - switch off"),
            Err(e) => error!(
                "run - could not clear marker {}: {e}",
                self.marker.path().display()
            ),
        }
    }
}

