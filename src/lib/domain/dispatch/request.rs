//! Send requests and how raw form input becomes one

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use tracing::debug;

use crate::domain::{
    communication::{
        email_addresses::EmailAddress,
        mailer::{
            Attachment, Credential, MessageTemplate, RelayConfig, RelayOptions, DEFAULT_HOST,
            DEFAULT_PORT,
        },
        templates::parse_variables,
    },
    dispatch::errors::SendRequestError,
};

/// How sends are spaced out and overlapped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Pause between consecutive sends
    pub delay: Duration,

    /// Maximum number of sends in flight. `1` sends strictly one after another.
    pub concurrency: NonZeroUsize,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            concurrency: NonZeroUsize::MIN,
        }
    }
}

/// A validated, immutable dispatch request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendRequest {
    relay: Arc<RelayConfig>,
    recipients: Vec<String>,
    template: Arc<MessageTemplate>,
    policy: DispatchPolicy,
}

impl SendRequest {
    /// Create a request. Recipients keep their order and duplicates.
    pub fn new(
        relay: RelayConfig,
        recipients: Vec<String>,
        template: MessageTemplate,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            relay: Arc::new(relay),
            recipients,
            template: Arc::new(template),
            policy,
        }
    }

    /// Relay settings shared by every send
    pub fn relay(&self) -> &Arc<RelayConfig> {
        &self.relay
    }

    /// Recipients in send order
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Subject, body, variables and attachments
    pub fn template(&self) -> &Arc<MessageTemplate> {
        &self.template
    }

    /// Pacing and concurrency
    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }
}

/// Raw dispatch input, as a submission form carries it
#[derive(Clone, Debug, PartialEq)]
pub struct SendForm {
    /// Relay host
    pub smtp_server: String,

    /// Relay port
    pub smtp_port: u16,

    /// Sender address and login
    pub sender_email: String,

    /// Sender password
    pub sender_password: String,

    /// Recipients separated by commas, semicolons or newlines
    pub recipients: String,

    /// Subject template
    pub subject: String,

    /// Body template
    pub body: String,

    /// Seconds to wait between sends
    pub delay_seconds: f64,

    /// Maximum sends in flight
    pub concurrency: usize,

    /// JSON object of template variables
    pub variables: String,

    /// Files already read into memory
    pub attachments: Vec<Attachment>,

    /// Transport tuning
    pub relay_options: RelayOptions,
}

impl Default for SendForm {
    fn default() -> Self {
        Self {
            smtp_server: DEFAULT_HOST.to_string(),
            smtp_port: DEFAULT_PORT,
            sender_email: String::new(),
            sender_password: String::new(),
            recipients: String::new(),
            subject: String::new(),
            body: String::new(),
            delay_seconds: 0.0,
            concurrency: 1,
            variables: "{}".to_string(),
            attachments: Vec::new(),
            relay_options: RelayOptions::default(),
        }
    }
}

impl TryFrom<SendForm> for SendRequest {
    type Error = SendRequestError;

    fn try_from(form: SendForm) -> Result<Self, Self::Error> {
        if form.sender_email.trim().is_empty() {
            return Err(SendRequestError::MissingSenderEmail);
        }

        if form.sender_password.is_empty() {
            return Err(SendRequestError::MissingSenderPassword);
        }

        if form.recipients.trim().is_empty() {
            return Err(SendRequestError::MissingRecipients);
        }

        let recipients = parse_recipients(&form.recipients);
        if recipients.is_empty() {
            return Err(SendRequestError::NoValidRecipients);
        }

        let sender = EmailAddress::new(&form.sender_email)?;

        if !form.delay_seconds.is_finite() || form.delay_seconds < 0.0 {
            return Err(SendRequestError::InvalidDelay(form.delay_seconds));
        }
        let delay = Duration::try_from_secs_f64(form.delay_seconds)
            .map_err(|_| SendRequestError::InvalidDelay(form.delay_seconds))?;

        let concurrency =
            NonZeroUsize::new(form.concurrency).ok_or(SendRequestError::InvalidConcurrency)?;

        let template = MessageTemplate {
            subject: form.subject,
            body: form.body,
            variables: parse_variables(&form.variables),
            attachments: form.attachments,
        };

        debug!(
            recipients = recipients.len(),
            variables = template.variables.len(),
            attachments = template.attachments.len(),
            "assembled send request"
        );

        Ok(SendRequest::new(
            RelayConfig::new(
                form.smtp_server.trim(),
                form.smtp_port,
                sender,
                Credential::new(form.sender_password),
                form.relay_options,
            ),
            recipients,
            template,
            DispatchPolicy { delay, concurrency },
        ))
    }
}

/// Splits free text on commas, semicolons and newlines, trimming entries and dropping blanks.
///
/// Order and duplicates are preserved.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|recipient| !recipient.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::domain::communication::{email_addresses::EmailAddressError, mailer::TlsPolicy};

    use super::*;

    fn form() -> SendForm {
        SendForm {
            sender_email: "sender@example.com".to_string(),
            sender_password: "app-password".to_string(),
            recipients: "a@example.com, b@example.com".to_string(),
            subject: "Hi {{name}}".to_string(),
            body: "Body".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_recipients_separators() {
        let recipients = parse_recipients("a@x.com, b@x.com;c@x.com\r\n d@x.com\n\n;,a@x.com");

        assert_eq!(
            recipients,
            vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com", "a@x.com"]
        );
    }

    #[test]
    fn test_form_defaults() {
        let form = SendForm::default();

        assert_eq!(form.smtp_server, "smtp.gmail.com");
        assert_eq!(form.smtp_port, 587);
        assert_eq!(form.delay_seconds, 0.0);
        assert_eq!(form.relay_options.tls, TlsPolicy::Required);
    }

    #[test]
    fn test_try_from_form() -> TestResult {
        let request = SendRequest::try_from(SendForm {
            variables: r#"{"name": "Ada"}"#.to_string(),
            delay_seconds: 1.5,
            concurrency: 4,
            ..form()
        })?;

        assert_eq!(request.recipients(), &["a@example.com", "b@example.com"]);
        assert_eq!(request.relay().host(), "smtp.gmail.com");
        assert_eq!(request.relay().sender().as_str(), "sender@example.com");
        assert_eq!(request.relay().credential().expose(), "app-password");
        assert_eq!(request.template().variables.get("name").map(String::as_str), Some("Ada"));
        assert_eq!(request.policy().delay, Duration::from_millis(1500));
        assert_eq!(request.policy().concurrency.get(), 4);

        Ok(())
    }

    #[test]
    fn test_try_from_form_malformed_variables() -> TestResult {
        let request = SendRequest::try_from(SendForm {
            variables: "{oops".to_string(),
            ..form()
        })?;

        assert!(request.template().variables.is_empty());

        Ok(())
    }

    #[test]
    fn test_try_from_form_missing_fields() {
        let missing_sender = SendForm {
            sender_email: " ".to_string(),
            ..form()
        };
        let missing_password = SendForm {
            sender_password: String::new(),
            ..form()
        };
        let missing_recipients = SendForm {
            recipients: "\n".to_string(),
            ..form()
        };
        let only_separators = SendForm {
            recipients: ", ;".to_string(),
            ..form()
        };

        assert_eq!(
            SendRequest::try_from(missing_sender),
            Err(SendRequestError::MissingSenderEmail)
        );
        assert_eq!(
            SendRequest::try_from(missing_password),
            Err(SendRequestError::MissingSenderPassword)
        );
        assert_eq!(
            SendRequest::try_from(missing_recipients),
            Err(SendRequestError::MissingRecipients)
        );
        assert_eq!(
            SendRequest::try_from(only_separators),
            Err(SendRequestError::NoValidRecipients)
        );
    }

    #[test]
    fn test_try_from_form_invalid_values() {
        let bad_sender = SendForm {
            sender_email: "not-an-email".to_string(),
            ..form()
        };
        let negative_delay = SendForm {
            delay_seconds: -1.0,
            ..form()
        };
        let zero_concurrency = SendForm {
            concurrency: 0,
            ..form()
        };

        assert_eq!(
            SendRequest::try_from(bad_sender),
            Err(SendRequestError::InvalidSenderEmail(
                EmailAddressError::InvalidEmailAddress("not-an-email".to_string())
            ))
        );
        assert_eq!(
            SendRequest::try_from(negative_delay),
            Err(SendRequestError::InvalidDelay(-1.0))
        );
        assert!(matches!(
            SendRequest::try_from(SendForm {
                delay_seconds: f64::NAN,
                ..form()
            }),
            Err(SendRequestError::InvalidDelay(_))
        ));
        assert_eq!(
            SendRequest::try_from(zero_concurrency),
            Err(SendRequestError::InvalidConcurrency)
        );
    }
}
