//! Email message

use std::sync::Arc;

use tracing::debug;

use crate::domain::communication::templates::{recipient_variables, substitute, Variables};

/// Name used for attachments uploaded without one
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

/// A file sent with every message of a dispatch.
///
/// The payload is reference counted, so cloning an attachment into each message never copies
/// the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    data: Arc<[u8]>,
}

impl Attachment {
    /// Create an attachment, naming it [`DEFAULT_ATTACHMENT_NAME`] when `filename` is blank
    pub fn new(filename: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let filename = filename.into();
        let filename = if filename.trim().is_empty() {
            DEFAULT_ATTACHMENT_NAME.to_string()
        } else {
            filename
        };

        Self {
            filename,
            data: data.into(),
        }
    }

    /// File name shown to the recipient
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The parts of a message shared by every recipient of a dispatch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageTemplate {
    /// Subject with `{{name}}` placeholders
    pub subject: String,

    /// Plain text body with `{{name}}` placeholders
    pub body: String,

    /// Values available to every recipient
    pub variables: Variables,

    /// Files attached to every message
    pub attachments: Vec<Attachment>,
}

/// A single-recipient email ready for the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The sender of the email
    pub from: String,

    /// The one recipient of the email
    pub to: String,

    /// The substituted subject
    pub subject: String,

    /// The substituted plain text body
    pub plain_body: String,

    /// Attachments, sent as `application/octet-stream`
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Renders `template` for `to`, with `{{email}}` bound to the recipient
    pub fn build(from: &str, to: &str, template: &MessageTemplate) -> Self {
        let variables = recipient_variables(&template.variables, to);

        debug!(to, attachments = template.attachments.len(), "building message");

        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: substitute(&template.subject, &variables),
            plain_body: substitute(&template.body, &variables),
            attachments: template.attachments.clone(),
        }
    }
}
