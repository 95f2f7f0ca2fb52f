//! Email addresses, templating and the mail transport seam

pub mod email_addresses;
pub mod mailer;
pub mod templates;
