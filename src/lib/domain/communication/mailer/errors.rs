//! Mailer errors

use std::time::Duration;

use thiserror::Error;

/// Why a single message could not be delivered to the relay.
///
/// The `Display` text is what ends up in the recipient's outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The sender or recipient address could not be parsed as a mailbox
    #[error("Invalid email address \"{address}\": {reason}")]
    InvalidAddress {
        /// The offending address
        address: String,

        /// Parser description
        reason: String,
    },

    /// The message could not be assembled
    #[error("Could not build message: {0}")]
    InvalidMessage(String),

    /// The relay could not be reached or the connection dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The TLS handshake or STARTTLS upgrade failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// The relay refused the sender's credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The relay answered with a negative reply
    #[error("Rejected by relay: {0}")]
    Rejected(String),

    /// The attempt took longer than the configured timeout
    #[error("Timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Unknown error
    #[error(transparent)]
    UnknownError(anyhow::Error),
}

impl From<anyhow::Error> for TransportError {
    fn from(err: anyhow::Error) -> Self {
        TransportError::UnknownError(err)
    }
}
