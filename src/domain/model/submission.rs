//! Submission record: one attempt to deliver an invoice to DIAN.

use crate::infra::config::DianEnvironment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Submission lifecycle. Accepted, Rejected and Error are terminal;
/// a retry is a fresh submission row, never a mutation of a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    Processing,
    Accepted,
    Rejected,
    Error,
}

impl SubmissionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Accepted | SubmissionStatus::Rejected | SubmissionStatus::Error
        )
    }

    /// Position in the lattice, used to assert monotone progress.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            SubmissionStatus::Pending => 0,
            SubmissionStatus::Submitted => 1,
            SubmissionStatus::Processing => 2,
            SubmissionStatus::Accepted | SubmissionStatus::Rejected | SubmissionStatus::Error => 3,
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (Pending, Submitted) => true,
            (Pending, Error) => true,
            (Submitted, Processing | Accepted | Rejected | Error) => true,
            (Processing, Processing | Accepted | Rejected | Error) => true,
            (a, b) => !a.is_terminal() && *a == b,
        }
    }
}

/// One delivery attempt. All payload columns are sealed at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub environment: DianEnvironment,
    /// Opaque tracking id issued by DIAN, absent until Submitted.
    pub track_id: Option<String>,
    pub status: SubmissionStatus,
    /// Request ZIP (base64), sealed under the master key.
    pub request_zip_blob: Option<String>,
    /// DIAN response payload, sealed under the master key.
    pub response_blob: Option<String>,
    pub dian_error_code: Option<String>,
    pub dian_error_message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Fresh Pending submission for an invoice.
    #[must_use]
    pub fn new(invoice_id: Uuid, environment: DianEnvironment) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            environment,
            track_id: None,
            status: SubmissionStatus::Pending,
            request_zip_blob: None,
            response_blob: None,
            dian_error_code: None,
            dian_error_message: None,
            submitted_at: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_state_machine() {
        use SubmissionStatus::*;
        assert!(Pending.can_transition_to(Submitted));
        assert!(Pending.can_transition_to(Error));
        assert!(Submitted.can_transition_to(Processing));
        assert!(Submitted.can_transition_to(Error));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Accepted));
        assert!(Processing.can_transition_to(Rejected));
        assert!(!Accepted.can_transition_to(Rejected));
        assert!(!Error.can_transition_to(Submitted));
        assert!(!Pending.can_transition_to(Processing));
    }

    #[test]
    fn terminal_states() {
        assert!(SubmissionStatus::Accepted.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
        assert!(SubmissionStatus::Error.is_terminal());
        assert!(!SubmissionStatus::Processing.is_terminal());
    }

    #[test]
    fn rank_is_monotone_along_transitions() {
        use SubmissionStatus::*;
        for from in [Pending, Submitted, Processing] {
            for to in [Pending, Submitted, Processing, Accepted, Rejected, Error] {
                if from.can_transition_to(to) {
                    assert!(to.rank() >= from.rank(), "{from:?} -> {to:?}");
                }
            }
        }
    }
}
