use serde::{Deserialize, Serialize};

/// Body of a send request. Any field may be omitted; empty values fall back to the configured
/// defaults when the message is resolved.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InputSendRequest {
    /// Comma-separated list of addresses
    pub recipients: String,
    pub subject: String,
    pub message: String,
}
