use lettre::Address;
use mailer_common::email::{EmailError, EmailMessage, SendEmail};
use std::fmt;

use crate::env::Config;

const SUBJECT_HEADER_PREFIX: &str = "Subject: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    NoRecipients,
    InvalidRecipient(String),
    InvalidSubject,
}

impl std::error::Error for ResolveError {}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NoRecipients => write!(f, "No recipients were given or configured"),
            ResolveError::InvalidRecipient(addr) => {
                write!(f, "Recipient '{addr}' is not a valid email address")
            }
            ResolveError::InvalidSubject => write!(f, "Subject must not contain line breaks"),
        }
    }
}

#[derive(Debug)]
pub enum SendMailError {
    InvalidRequest(ResolveError),
    Relay(EmailError),
}

impl std::error::Error for SendMailError {}

impl fmt::Display for SendMailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendMailError::InvalidRequest(e) => write!(f, "SendMailError: {e}"),
            SendMailError::Relay(e) => write!(f, "SendMailError: {e}"),
        }
    }
}

impl From<ResolveError> for SendMailError {
    fn from(err: ResolveError) -> Self {
        SendMailError::InvalidRequest(err)
    }
}

impl From<EmailError> for SendMailError {
    fn from(err: EmailError) -> Self {
        SendMailError::Relay(err)
    }
}

/// Fills in whatever the request left empty from the configured defaults.
///
/// Only an empty string counts as absent. A recipient list made up of nothing but commas and
/// whitespace is not absent; it resolves to no recipients and is rejected.
pub fn resolve(
    conf: &Config,
    requested_subject: &str,
    requested_message: &str,
    requested_recipients: &str,
) -> Result<EmailMessage, ResolveError> {
    let recipients = if requested_recipients.is_empty() {
        conf.default_recipients.clone()
    } else {
        parse_recipients(requested_recipients)?
    };

    if recipients.is_empty() {
        return Err(ResolveError::NoRecipients);
    }

    let subject_line = if requested_subject.is_empty() {
        conf.default_subject.clone()
    } else {
        if requested_subject.contains(['\r', '\n']) {
            return Err(ResolveError::InvalidSubject);
        }

        format!("{SUBJECT_HEADER_PREFIX}{requested_subject}")
    };

    Ok(EmailMessage {
        recipients,
        subject_line,
        body: String::from(requested_message),
    })
}

/// Resolves the request and submits it through `sender` as a single message. Nothing is
/// retried.
pub async fn send_mail(
    conf: &Config,
    sender: &dyn SendEmail,
    requested_subject: &str,
    requested_message: &str,
    requested_recipients: &str,
) -> Result<(), SendMailError> {
    let message = resolve(
        conf,
        requested_subject,
        requested_message,
        requested_recipients,
    )?;

    sender.send(&message).await?;

    Ok(())
}

fn parse_recipients(recipients: &str) -> Result<Vec<Address>, ResolveError> {
    recipients
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            addr.parse::<Address>()
                .map_err(|_| ResolveError::InvalidRecipient(String::from(addr)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::testing::{conf, conf_with};
    use mailer_common::email::senders::MockSender;

    fn addresses(message: &EmailMessage) -> Vec<String> {
        message.recipients.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_empty_recipients_use_defaults() {
        let conf = conf_with(&[("EMAIL_RECIPIENT", " c@x.com,, d@x.com ,")]).unwrap();

        let message = resolve(&conf, "Hi", "Body", "").unwrap();
        assert_eq!(addresses(&message), vec!["c@x.com", "d@x.com"]);
    }

    #[test]
    fn test_recipients_are_split_in_order() {
        let conf = conf();

        let message = resolve(&conf, "Hi", "Body", "z@x.com, a@x.com ,m@x.com").unwrap();
        assert_eq!(addresses(&message), vec!["z@x.com", "a@x.com", "m@x.com"]);

        let message = resolve(&conf, "Hi", "Body", ",b@x.com,,  ,a@x.com,").unwrap();
        assert_eq!(addresses(&message), vec!["b@x.com", "a@x.com"]);
    }

    #[test]
    fn test_no_recipients() {
        let conf = conf();
        assert_eq!(
            resolve(&conf, "Hi", "Body", " , ,"),
            Err(ResolveError::NoRecipients)
        );

        let conf = conf_with(&[("EMAIL_RECIPIENT", "")]).unwrap();
        assert_eq!(
            resolve(&conf, "Hi", "Body", ""),
            Err(ResolveError::NoRecipients)
        );
    }

    #[test]
    fn test_invalid_recipient() {
        let conf = conf();
        assert_eq!(
            resolve(&conf, "Hi", "Body", "a@x.com, not-an-address"),
            Err(ResolveError::InvalidRecipient(String::from("not-an-address")))
        );
    }

    #[test]
    fn test_subject_resolution() {
        let conf = conf();

        let message = resolve(&conf, "", "Body", "a@x.com").unwrap();
        assert_eq!(message.subject_line, "Subject: Default\n");

        let message = resolve(&conf, "Hello there", "Body", "a@x.com").unwrap();
        assert_eq!(message.subject_line, "Subject: Hello there");

        for subject in ["Hi\r\nBcc: victim@x.com", "Hi\n", "\rHi"] {
            assert_eq!(
                resolve(&conf, subject, "Body", "a@x.com"),
                Err(ResolveError::InvalidSubject)
            );
        }
    }

    #[test]
    fn test_body_is_verbatim() {
        let conf = conf();

        let message = resolve(&conf, "Hi", "  Line 1\r\n\r\nLine 2  ", "a@x.com").unwrap();
        assert_eq!(message.body, "  Line 1\r\n\r\nLine 2  ");

        let message = resolve(&conf, "Hi", "", "a@x.com").unwrap();
        assert_eq!(message.body, "");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let conf = conf();

        for (subject, message, recipients) in [
            ("Hi", "Body", "a@x.com,b@x.com"),
            ("", "Body", ""),
            ("Hi", "", ","),
        ] {
            assert_eq!(
                resolve(&conf, subject, message, recipients),
                resolve(&conf, subject, message, recipients)
            );
        }
    }

    #[tokio::test]
    async fn test_send_mail_with_requested_fields() {
        let conf = conf();
        let sender = MockSender::recording();

        send_mail(&conf, &sender, "Hi", "Body", "a@x.com,b@x.com")
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(addresses(&sent[0]), vec!["a@x.com", "b@x.com"]);
        assert_eq!(sent[0].subject_line, "Subject: Hi");
        assert_eq!(sent[0].body, "Body");
    }

    #[tokio::test]
    async fn test_send_mail_with_defaults() {
        let conf = conf();
        let sender = MockSender::recording();

        send_mail(&conf, &sender, "", "Body", "").await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(addresses(&sent[0]), vec!["c@x.com"]);
        assert_eq!(sent[0].subject_line, "Subject: Default\n");
        assert_eq!(sent[0].body, "Body");
    }

    #[tokio::test]
    async fn test_send_mail_input_error_skips_relay() {
        let conf = conf();
        let sender = MockSender::recording();

        let result = send_mail(&conf, &sender, "Hi", "Body", "nope").await;

        assert!(matches!(
            result,
            Err(SendMailError::InvalidRequest(ResolveError::InvalidRecipient(_)))
        ));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_mail_relay_error() {
        let conf = conf();
        let sender = MockSender::failing("535 Authentication failed");

        let result = send_mail(&conf, &sender, "Hi", "Body", "a@x.com").await;

        assert!(matches!(
            result,
            Err(SendMailError::Relay(EmailError::RelayConnectionFailed(_)))
        ));
    }
}
