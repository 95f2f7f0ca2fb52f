//! Per-recipient outcomes and the dispatch report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message recorded for a successful send
pub const SENT: &str = "Sent";

/// The result of attempting to send to one recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    email: String,
    success: bool,
    message: String,
    timestamp: DateTime<Utc>,
}

impl RecipientOutcome {
    /// A delivered message, stamped now
    pub fn sent(recipient: &str) -> Self {
        Self {
            email: recipient.to_string(),
            success: true,
            message: SENT.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// A failed attempt, stamped now
    pub fn failed(recipient: &str, reason: impl ToString) -> Self {
        Self {
            email: recipient.to_string(),
            success: false,
            message: reason.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Recipient address as given in the request
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether the relay accepted the message
    pub fn success(&self) -> bool {
        self.success
    }

    /// `"Sent"` or the failure description
    pub fn message(&self) -> &str {
        &self.message
    }

    /// When the attempt finished
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Outcome counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Recipients attempted
    pub total: usize,

    /// Accepted by the relay
    pub successful: usize,

    /// Not delivered
    pub failed: usize,
}

/// Everything a dispatch did, in recipient order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    success: bool,
    message: String,
    results: Vec<RecipientOutcome>,
    summary: DispatchSummary,
    truncated: bool,
    skipped: usize,
}

impl DispatchResult {
    /// Summarises `outcomes`, which must be in request order.
    ///
    /// `requested` is the number of recipients in the request; any shortfall means the dispatch
    /// was cancelled and the result is flagged as truncated.
    pub fn from_outcomes(outcomes: Vec<RecipientOutcome>, requested: usize) -> Self {
        let successful = outcomes.iter().filter(|outcome| outcome.success).count();
        let total = outcomes.len();
        let failed = total - successful;
        let skipped = requested.saturating_sub(total);

        Self {
            success: failed == 0,
            message: format!("Sent {successful}/{total} emails successfully"),
            results: outcomes,
            summary: DispatchSummary {
                total,
                successful,
                failed,
            },
            truncated: skipped > 0,
            skipped,
        }
    }

    /// True when no attempted send failed
    pub fn success(&self) -> bool {
        self.success
    }

    /// `"Sent X/Y emails successfully"`
    pub fn message(&self) -> &str {
        &self.message
    }

    /// One outcome per attempted recipient, in request order
    pub fn results(&self) -> &[RecipientOutcome] {
        &self.results
    }

    /// Outcome counts
    pub fn summary(&self) -> DispatchSummary {
        self.summary
    }

    /// Whether the dispatch was cancelled before every recipient was attempted
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Recipients never attempted because of cancellation
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Recipients whose send failed, in request order, ready for a retry
    pub fn failed_recipients(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|outcome| !outcome.success)
            .map(RecipientOutcome::email)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_from_outcomes_counts() {
        let result = DispatchResult::from_outcomes(
            vec![
                RecipientOutcome::sent("a@example.com"),
                RecipientOutcome::failed("b@example.com", "Connection failed: refused"),
                RecipientOutcome::sent("c@example.com"),
            ],
            3,
        );

        assert!(!result.success());
        assert_eq!(result.message(), "Sent 2/3 emails successfully");
        assert_eq!(
            result.summary(),
            DispatchSummary {
                total: 3,
                successful: 2,
                failed: 1
            }
        );
        assert!(!result.truncated());
        assert_eq!(result.failed_recipients().collect::<Vec<_>>(), vec!["b@example.com"]);
    }

    #[test]
    fn test_from_outcomes_truncated() {
        let result = DispatchResult::from_outcomes(vec![RecipientOutcome::sent("a@example.com")], 4);

        assert!(result.success());
        assert!(result.truncated());
        assert_eq!(result.skipped(), 3);
        assert_eq!(result.summary().total, 1);
    }

    #[test]
    fn test_result_serialization() -> TestResult {
        let result = DispatchResult::from_outcomes(
            vec![RecipientOutcome::failed("a@example.com", "Timed out after 30s")],
            1,
        );

        let json = serde_json::to_value(&result)?;

        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Sent 0/1 emails successfully");
        assert_eq!(json["results"][0]["email"], "a@example.com");
        assert_eq!(json["results"][0]["success"], false);
        assert_eq!(json["results"][0]["message"], "Timed out after 30s");
        assert!(json["results"][0]["timestamp"].is_string());
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["truncated"], false);

        let parsed: DispatchResult = serde_json::from_value(json)?;
        assert_eq!(parsed, result);

        Ok(())
    }
}
