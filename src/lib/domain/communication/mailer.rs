//! Mail transport module

mod errors;
mod message;
mod relay;

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

pub use errors::TransportError;
pub use message::{Attachment, Message, MessageTemplate, DEFAULT_ATTACHMENT_NAME};
pub use relay::{
    Credential, ParseTlsPolicyError, RelayConfig, RelayOptions, TlsPolicy, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_TIMEOUT, IMPLICIT_TLS_PORT,
};

/// Delivers one message per call to a relay
#[async_trait]
pub trait MailTransport: Clone + Send + Sync + 'static {
    /// Send a message
    ///
    /// Opens a session with the relay described by `relay`, authenticates as its sender,
    /// transmits `message` to its single recipient and closes the session. Nothing is retried.
    ///
    /// # Arguments
    /// * `relay` - The [`RelayConfig`] shared by the whole dispatch.
    /// * `message` - The [`Message`] to deliver.
    ///
    /// # Returns
    /// [`Ok`] once the relay accepted the message, otherwise the [`TransportError`] describing
    /// which step failed.
    async fn send(&self, relay: &RelayConfig, message: &Message) -> Result<(), TransportError>;
}

#[cfg(test)]
mock! {
    pub MailTransport {}

    impl Clone for MailTransport {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MailTransport for MailTransport {
        async fn send(&self, relay: &RelayConfig, message: &Message) -> Result<(), TransportError>;
    }
}
