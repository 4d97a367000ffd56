use std::io;

/// Failures talking to the mailbox server.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("connect to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: imap::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("login rejected for {user}: {source}")]
    Login {
        user: String,
        #[source]
        source: imap::Error,
    },

    #[error("IMAP error: {0}")]
    Protocol(#[from] imap::Error),

    #[error("no mailbox session")]
    NotConnected,
}

/// Failures reaching or commanding the switch.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no device answered at {address}")]
    Unreachable { address: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad device description: {0}")]
    Description(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("device: {0}")]
    Device(#[from] DeviceError),

    #[error("marker file: {0}")]
    Marker(#[source] io::Error),

    #[error("could not spawn activation worker: {0}")]
    Spawn(#[source] io::Error),
}

/// How the poll loop reacts to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Mailbox or device unreachable. Retried with backoff.
    Connectivity,
    /// A batch of command mail could not be relocated or removed.
    Batch,
    /// Local faults: marker I/O, thread spawn.
    Local,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("mailbox: {0}")]
    Mail(#[from] MailError),

    #[error("relocating {count} message(s) failed, inbox left untouched: {source}")]
    Relocation {
        count: usize,
        #[source]
        source: MailError,
    },

    #[error("removing {count} relocated message(s) from the inbox failed: {source}")]
    Removal {
        count: usize,
        #[source]
        source: MailError,
    },

    #[error("switch: {0}")]
    Switch(#[from] SwitchError),

    #[error("{mail}; expiry check also failed: {expiry}")]
    Both {
        mail: Box<CycleError>,
        expiry: SwitchError,
    },
}

impl SwitchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SwitchError::Device(_) => FailureKind::Connectivity,
            SwitchError::Marker(_) | SwitchError::Spawn(_) => FailureKind::Local,
        }
    }
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Mail(_) => FailureKind::Connectivity,
            CycleError::Relocation { .. } | CycleError::Removal { .. } => FailureKind::Batch,
            CycleError::Switch(e) => e.kind(),
            CycleError::Both { mail, .. } => mail.kind(),
        }
    }
}
