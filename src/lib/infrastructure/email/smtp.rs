//! SMTP mail transport implementation

use std::{fmt, time::Duration};

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use lettre::{
    address::AddressError,
    message::{header::ContentType, Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        Error as SmtpError,
    },
    AsyncSmtpTransport, AsyncTransport, Message as MimeMessage, Tokio1Executor,
};
use tokio::time::timeout;
use tracing::debug;

use crate::domain::communication::mailer::{
    MailTransport, Message, RelayConfig, RelayOptions, TlsPolicy, TransportError, DEFAULT_HOST,
    DEFAULT_PORT,
};

/// SMTP reply codes meaning the relay refused the login
const AUTH_FAILURE_CODES: [&str; 3] = ["530", "534", "535"];

/// SMTP configuration
#[derive(Clone, Parser)]
pub struct SMTPConfig {
    /// The SMTP host
    #[clap(long = "smtp-host", env = "SMTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// The SMTP port. 465 uses implicit TLS, anything else STARTTLS.
    #[clap(long = "smtp-port", env = "SMTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The sender address, also used to log in
    #[clap(long = "smtp-user", env = "SMTP_USER", default_value = "")]
    pub username: String,

    /// The SMTP password
    #[clap(long = "smtp-password", env = "SMTP_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// STARTTLS policy: "required" fails the send when the session cannot be encrypted,
    /// "opportunistic" stays in plaintext only when the relay does not offer STARTTLS. A failed
    /// handshake fails the send under either policy.
    #[clap(long = "smtp-tls", env = "SMTP_TLS", default_value_t = TlsPolicy::Required)]
    pub tls: TlsPolicy,

    /// Seconds allowed for each connect-authenticate-send attempt
    #[clap(long = "smtp-timeout", env = "SMTP_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Verify the TLS certificate
    #[clap(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value_t = true, action = ArgAction::Set)]
    pub verify_tls: bool,
}

impl fmt::Debug for SMTPConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SMTPConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl SMTPConfig {
    /// Transport tuning taken from this configuration
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            tls: self.tls,
            timeout: Duration::from_secs(self.timeout),
            verify_certificates: self.verify_tls,
        }
    }
}

/// SMTP mailer.
///
/// Every call to [`MailTransport::send`] opens its own connection and closes it afterwards, so
/// no session is ever shared between recipients.
#[derive(Debug, Default, Clone)]
pub struct SMTPMailer;

impl SMTPMailer {
    /// Create a new SMTP mailer
    pub fn new() -> Self {
        Self
    }

    /// Builds a single-use transport for `relay`
    pub fn mailer(
        &self,
        relay: &RelayConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let options = relay.options();
        let creds = Credentials::new(
            relay.sender().to_string(),
            relay.credential().expose().to_string(),
        );

        let parameters = TlsParameters::builder(relay.host().to_string())
            .dangerous_accept_invalid_certs(!options.verify_certificates)
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        let tls = if relay.implicit_tls() {
            Tls::Wrapper(parameters)
        } else {
            match options.tls {
                TlsPolicy::Opportunistic => Tls::Opportunistic(parameters),
                TlsPolicy::Required => Tls::Required(parameters),
            }
        };

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay.host())
                .port(relay.port())
                .tls(tls)
                .credentials(creds)
                .timeout(Some(options.timeout))
                .build(),
        )
    }
}

#[async_trait]
impl MailTransport for SMTPMailer {
    async fn send(&self, relay: &RelayConfig, message: &Message) -> Result<(), TransportError> {
        let email = mime_message(message)?;
        let limit = relay.options().timeout;

        debug!(
            host = relay.host(),
            port = relay.port(),
            implicit_tls = relay.implicit_tls(),
            to = %message.to,
            "connecting to relay"
        );

        let mailer = self.mailer(relay)?;

        match timeout(limit, mailer.send(email)).await {
            Ok(Ok(response)) => {
                debug!(code = %response.code(), "relay accepted message");
                Ok(())
            }
            Ok(Err(e)) => Err(classify(e, limit)),
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }
}

/// Converts a [`Message`] into its MIME form.
///
/// A message without attachments is a single `text/plain` part, otherwise a `multipart/mixed`
/// with the text first and each attachment as `application/octet-stream`.
pub fn mime_message(message: &Message) -> Result<MimeMessage, TransportError> {
    let builder = MimeMessage::builder()
        .from(mailbox(&message.from)?)
        .to(mailbox(&message.to)?)
        .subject(message.subject.clone());

    let text = SinglePart::plain(message.plain_body.clone());

    let email = if message.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

        let parts = message
            .attachments
            .iter()
            .fold(MultiPart::mixed().singlepart(text), |parts, attachment| {
                parts.singlepart(
                    MimeAttachment::new(attachment.filename().to_string())
                        .body(attachment.data().to_vec(), octet_stream.clone()),
                )
            });

        builder.multipart(parts)
    };

    email.map_err(|e| TransportError::InvalidMessage(e.to_string()))
}

fn mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse()
        .map_err(|e: AddressError| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn classify(err: SmtpError, limit: Duration) -> TransportError {
    let description = err.to_string();
    let code = err.status().map(|code| code.to_string());

    if err.is_timeout() {
        TransportError::Timeout(limit)
    } else if err.is_tls() {
        TransportError::Tls(description)
    } else if code
        .as_deref()
        .is_some_and(|code| AUTH_FAILURE_CODES.contains(&code))
    {
        TransportError::Authentication(description)
    } else if err.is_permanent() || err.is_transient() {
        TransportError::Rejected(description)
    } else {
        TransportError::Connection(description)
    }
}
