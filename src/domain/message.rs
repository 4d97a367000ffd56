pub type MessageUid = u32;

/// Envelope data of one command message. Built per fetch, dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    /// `mailbox@host` of the envelope sender.
    pub sender: String,
}

impl Message {
    pub fn new(subject: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
        }
    }

    pub fn subject_is(&self, keyword: &str) -> bool {
        same_text(&self.subject, keyword)
    }

    pub fn sent_by(&self, address: &str) -> bool {
        same_text(&self.sender, address)
    }
}

/// Unicode case-insensitive, ignoring surrounding whitespace.
fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
