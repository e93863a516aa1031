use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::email::{EmailError, EmailMessage, SendEmail};

/// How the relay session is secured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelayTls {
    /// Upgrade with STARTTLS when the relay advertises it, continue in plaintext otherwise.
    #[default]
    Opportunistic,
    /// Refuse to continue unless STARTTLS succeeds.
    Required,
    /// Implicit TLS from the first byte (usually port 465).
    Wrapper,
    None,
}

impl FromStr for RelayTls {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" | "opportunistic" => Ok(RelayTls::Opportunistic),
            "required" => Ok(RelayTls::Required),
            "wrapper" | "tls" => Ok(RelayTls::Wrapper),
            "none" => Ok(RelayTls::None),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RelayTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayTls::Opportunistic => "starttls",
            RelayTls::Required => "required",
            RelayTls::Wrapper => "wrapper",
            RelayTls::None => "none",
        };

        f.write_str(name)
    }
}

/// Submits messages to an SMTP relay, authenticating as the sender with the PLAIN mechanism.
///
/// Every call to `send()` opens its own session and closes it afterwards; connections are never
/// reused between messages and failed submissions are not retried.
pub struct SmtpRelay {
    from: Address,
    password: Zeroizing<String>,
    host: String,
    port: u16,
    tls: RelayTls,
}

impl SmtpRelay {
    pub fn with_credentials(
        from: Address,
        password: &str,
        host: &str,
        port: u16,
        tls: RelayTls,
    ) -> Self {
        Self {
            from,
            password: Zeroizing::new(String::from(password)),
            host: String::from(host),
            port,
            tls,
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let tls = match self.tls {
            RelayTls::None => Tls::None,
            mode => {
                let params = TlsParameters::new(self.host.clone())
                    .map_err(|e| EmailError::RelayConnectionFailed(e.to_string()))?;

                match mode {
                    RelayTls::Required => Tls::Required(params),
                    RelayTls::Wrapper => Tls::Wrapper(params),
                    _ => Tls::Opportunistic(params),
                }
            }
        };

        let credentials = Credentials::new(self.from.to_string(), self.password.to_string());

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
                .port(self.port)
                .tls(tls)
                .credentials(credentials)
                .authentication(vec![Mechanism::Plain])
                .build(),
        )
    }
}

#[async_trait]
impl SendEmail for SmtpRelay {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let envelope = Envelope::new(Some(self.from.clone()), message.recipients.clone())
            .map_err(EmailError::InvalidEnvelope)?;

        let transport = self.transport()?;

        log::debug!(
            "Submitting message for {} recipient(s) to {}:{} (tls={})",
            message.recipients.len(),
            self.host,
            self.port,
            self.tls,
        );

        transport
            .send_raw(&envelope, &message.to_wire())
            .await
            .map_err(EmailError::FailedToSend)?;

        Ok(())
    }
}
