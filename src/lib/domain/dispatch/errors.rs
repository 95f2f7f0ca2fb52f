//! Errors raised while assembling a send request

use thiserror::Error;

use crate::domain::communication::email_addresses::EmailAddressError;

/// Reasons a request is refused before anything is sent
#[derive(Debug, Error, PartialEq)]
pub enum SendRequestError {
    /// No sender address
    #[error("Missing required field: sender_email")]
    MissingSenderEmail,

    /// No sender password
    #[error("Missing required field: sender_password")]
    MissingSenderPassword,

    /// Recipient field left blank
    #[error("Missing required field: recipients")]
    MissingRecipients,

    /// Recipient field held only separators
    #[error("No valid recipients provided")]
    NoValidRecipients,

    /// Sender address is malformed
    #[error("Invalid sender address: {0}")]
    InvalidSenderEmail(#[from] EmailAddressError),

    /// Delay is negative, not a number, or too large
    #[error("Invalid delay: {0} seconds")]
    InvalidDelay(f64),

    /// Concurrency of zero
    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,
}
