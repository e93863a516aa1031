pub mod senders;

use async_trait::async_trait;
use lettre::Address;
use std::fmt;

#[derive(Debug)]
pub enum EmailError {
    RelayConnectionFailed(String),
    InvalidEnvelope(lettre::error::Error),
    FailedToSend(lettre::transport::smtp::Error),
}

impl std::error::Error for EmailError {}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::RelayConnectionFailed(e) => {
                write!(f, "EmailError: Relay connection failed: {e}")
            }
            EmailError::InvalidEnvelope(e) => write!(f, "EmailError: Invalid envelope: {e}"),
            EmailError::FailedToSend(e) => write!(f, "EmailError: Failed to send: {e}"),
        }
    }
}

/// A message whose recipients and subject have already been resolved against the configured
/// defaults. Exactly one of these is submitted per relay session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipients: Vec<Address>,
    /// A complete header line, e.g. `Subject: Hello`. May carry a trailing line break when it
    /// comes pre-formatted from configuration.
    pub subject_line: String,
    pub body: String,
}

impl EmailMessage {
    /// Raw message as handed to the relay: the subject header, the blank line that closes the
    /// header block, then the body.
    pub fn to_wire(&self) -> Vec<u8> {
        let header = self.subject_line.trim_end_matches(['\r', '\n']);

        let mut wire = Vec::with_capacity(header.len() + self.body.len() + 4);

        if !header.is_empty() {
            wire.extend_from_slice(header.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }

        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(self.body.as_bytes());

        wire
    }
}

#[async_trait]
pub trait SendEmail: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

pub type EmailSender = Box<dyn SendEmail>;
