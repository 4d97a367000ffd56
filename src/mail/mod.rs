pub mod decoders;
pub mod imap_client;
pub mod session;

use crate::domain::message::{Message, MessageUid};
use crate::error::MailError;

/// Mailbox operations the poll loop consumes.
pub trait Mailbox {
    fn login(&mut self) -> Result<(), MailError>;
    fn logout(&mut self) -> Result<(), MailError>;

    /// Selects `folder` read-write and returns its total message count.
    fn select(&mut self, folder: &str) -> Result<u32, MailError>;
    /// Unseen messages in the selected folder.
    fn unseen_count(&mut self, _folder: &str) -> Result<u32, MailError> {
        Ok(self.search_unseen()?.len() as u32)
    }
    fn search_unseen(&mut self) -> Result<Vec<MessageUid>, MailError>;
    fn fetch_envelopes(&mut self, uids: &[MessageUid]) -> Result<Vec<Message>, MailError>;

    fn copy(&mut self, uids: &[MessageUid], folder: &str) -> Result<(), MailError>;
    /// Flags `uids` deleted and expunges them.
    fn delete(&mut self, uids: &[MessageUid]) -> Result<(), MailError>;
}

/// IMAP sequence set for a batch of UIDs, e.g. `4,7,9`.
pub fn uid_set(uids: &[MessageUid]) -> String {
    uids.iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
