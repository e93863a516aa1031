use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::email::{EmailError, EmailMessage, SendEmail};

/// Stands in for a relay by logging every message handed to it.
///
/// A sender from `new()` keeps nothing. One from `recording()` also keeps each accepted
/// message so it can be inspected later; clones share the same record.
#[derive(Clone, Default)]
pub struct MockSender {
    sent: Option<Arc<Mutex<Vec<EmailMessage>>>>,
    failure: Option<String>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording() -> Self {
        Self {
            sent: Some(Arc::default()),
            failure: None,
        }
    }

    /// A sender that rejects every message with the given reason, as a relay refusing the
    /// sender's credentials would.
    pub fn failing(reason: &str) -> Self {
        Self {
            sent: None,
            failure: Some(String::from(reason)),
        }
    }

    /// Messages accepted so far, in submission order. Always empty unless recording.
    pub fn sent(&self) -> Vec<EmailMessage> {
        match &self.sent {
            Some(sent) => sent.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl SendEmail for MockSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if let Some(reason) = &self.failure {
            return Err(EmailError::RelayConnectionFailed(reason.clone()));
        }

        log::info!("Email relay disabled. Message not sent: {message:?}");

        if let Some(sent) = &self.sent {
            sent.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(message.clone());
        }

        Ok(())
    }
}
