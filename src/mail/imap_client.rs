use log::{debug, info, warn};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use crate::config::MailboxConfig;
use crate::domain::message::{Message, MessageUid};
use crate::error::MailError;
use crate::mail::decoders::{address_from_parts, decode_header_value};
use crate::mail::{Mailbox, uid_set};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// IMAP-over-TLS mailbox. Connects lazily and drops the session after a
/// connection-level failure so the next operation reconnects.
pub struct ImapMailbox {
    pub server: String,
    pub port: u16,
    pub user: String,
    password: String,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    pub fn new(cfg: &MailboxConfig, password: impl Into<String>) -> Self {
        Self {
            server: cfg.host.clone(),
            port: cfg.port,
            user: cfg.username.clone(),
            password: password.into(),
            session: None,
        }
    }

    fn connect_and_auth(&self) -> Result<ImapSession, MailError> {
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)
            .map_err(|source| MailError::Connect {
                host: self.server.clone(),
                port: self.port,
                source,
            })?;

        client
            .login(&self.user, &self.password)
            .map_err(|(source, _client)| MailError::Login {
                user: self.user.clone(),
                source,
            })
    }

    fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut ImapSession) -> imap::error::Result<T>,
    ) -> Result<T, MailError> {
        if self.session.is_none() {
            self.login()?;
        }
        let session = self.session.as_mut().ok_or(MailError::NotConnected)?;
        let result = op(session);
        // untagged data the parser did not consume (EXISTS, STATUS, ...) piles up otherwise
        let unsolicited = session.unsolicited_responses.try_iter().count();
        if unsolicited > 0 {
            debug!("discarded {unsolicited} unsolicited response(s)");
        }
        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                if is_connection_error(&e) {
                    warn!("IMAP connection lost ({e}); reconnecting on next use");
                    self.session = None;
                }
                Err(e.into())
            }
        }
    }
}

fn is_connection_error(e: &imap::Error) -> bool {
    matches!(
        e,
        imap::Error::Io(_) | imap::Error::Tls(_) | imap::Error::ConnectionLost
    )
}

impl Mailbox for ImapMailbox {
    fn login(&mut self) -> Result<(), MailError> {
        debug!("connecting to {}:{} as {}", self.server, self.port, self.user);
        let session = self.connect_and_auth()?;
        self.session = Some(session);
        info!("logged in to {}", self.server);
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailError> {
        match self.session.take() {
            Some(mut session) => session.logout().map_err(MailError::from),
            None => Ok(()),
        }
    }

    fn select(&mut self, folder: &str) -> Result<u32, MailError> {
        let mailbox = self.with_session(|s| s.select(folder))?;
        Ok(mailbox.exists)
    }

    fn search_unseen(&mut self) -> Result<Vec<MessageUid>, MailError> {
        let mut uids: Vec<MessageUid> = self
            .with_session(|s| s.uid_search("UNSEEN"))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch_envelopes(&mut self, uids: &[MessageUid]) -> Result<Vec<Message>, MailError> {
        if uids.is_empty() {
            return Ok(vec![]);
        }
        let set = uid_set(uids);
        let fetches = self.with_session(|s| s.uid_fetch(&set, "(UID ENVELOPE)"))?;

        let mut out = Vec::with_capacity(uids.len());
        for f in fetches.iter() {
            let Some(env) = f.envelope() else {
                warn!("UID {:?} returned no envelope; skipping", f.uid);
                continue;
            };

            let subject = env
                .subject
                .as_deref()
                .map(decode_header_value)
                .unwrap_or_default();

            let sender = env
                .sender
                .as_ref()
                .or(env.from.as_ref())
                .and_then(|addrs| addrs.first())
                .and_then(|addr| address_from_parts(addr.mailbox.as_deref(), addr.host.as_deref()))
                .unwrap_or_default();

            out.push(Message { subject, sender });
        }
        Ok(out)
    }

    fn copy(&mut self, uids: &[MessageUid], folder: &str) -> Result<(), MailError> {
        let set = uid_set(uids);
        self.with_session(|s| s.uid_copy(&set, folder))
    }

    fn delete(&mut self, uids: &[MessageUid]) -> Result<(), MailError> {
        let set = uid_set(uids);
        self.with_session(|s| s.uid_store(&set, "+FLAGS.SILENT (\\Deleted)"))?;
        self.with_session(|s| s.expunge())?;
        Ok(())
    }
}
