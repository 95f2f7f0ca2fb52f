//! Bulk dispatch: request assembly, the engine and its per-recipient report.

mod outcome;
mod request;
mod service;

pub mod errors;

pub use outcome::{DispatchResult, DispatchSummary, RecipientOutcome, SENT};
pub use request::{parse_recipients, DispatchPolicy, SendForm, SendRequest};
pub use service::{DispatchService, DispatchServiceImpl};
