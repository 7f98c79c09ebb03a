//! `check_status` and `poll_until_final`: advance a submission toward its
//! terminal verdict.

use crate::adapters::soap::DianTransport;
use crate::domain::errmap;
use crate::domain::model::{InvoiceStatus, Submission, SubmissionStatus};
use crate::infra::error::{EngineError, EngineResult};
use crate::pipelines::submit::Orchestrator;
use crate::pipelines::CancelFlag;
use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

impl<T: DianTransport> Orchestrator<T> {
    /// Poll DIAN once for a submission's verdict.
    ///
    /// Only ever moves the submission forward in the status lattice;
    /// `"00"` is idempotent, everything else is terminal.
    pub async fn check_status(&self, submission_id: Uuid) -> EngineResult<Submission> {
        let mut submission = self
            .store
            .submission_by_id(submission_id)?
            .ok_or_else(|| EngineError::NotFound(format!("submission {submission_id}")))?;

        let Some(track_id) = submission.track_id.clone() else {
            log::warn!("submission {submission_id} has no track id yet; skipping status check");
            return Ok(submission);
        };
        if submission.status.is_terminal() {
            return Ok(submission);
        }

        let response = self.transport.get_status_zip(&track_id).await?;
        let previous = submission.status;

        match response.status_code.as_str() {
            "00" => {
                if submission.status != SubmissionStatus::Processing {
                    submission.status = SubmissionStatus::Processing;
                    self.advance(&mut submission, previous)?;
                }
                log::debug!("submission {submission_id} still processing");
            }
            "02" => {
                submission.status = SubmissionStatus::Accepted;
                submission.processed_at = Some(Utc::now());
                if !response.zip_base64.is_empty() {
                    submission.response_blob =
                        Some(self.master.seal(response.zip_base64.as_bytes())?);
                }
                self.advance(&mut submission, previous)?;
                self.store.set_invoice_status(
                    submission.invoice_id,
                    InvoiceStatus::SubmittedToDian,
                    InvoiceStatus::AcceptedByDian,
                )?;
                log::info!("submission {submission_id} accepted by DIAN");
            }
            "04" => {
                let message = response
                    .status_message
                    .clone()
                    .unwrap_or_else(|| "documento rechazado".to_string());
                let guidance = errmap::classify(None, &message);
                submission.status = SubmissionStatus::Rejected;
                submission.processed_at = Some(Utc::now());
                submission.dian_error_code = Some(response.status_code.clone());
                submission.dian_error_message = Some(message.clone());
                if !response.zip_base64.is_empty() {
                    submission.response_blob =
                        Some(self.master.seal(response.zip_base64.as_bytes())?);
                }
                self.advance(&mut submission, previous)?;
                self.store.set_invoice_status(
                    submission.invoice_id,
                    InvoiceStatus::SubmittedToDian,
                    InvoiceStatus::RejectedByDian,
                )?;
                log::warn!(
                    "submission {submission_id} rejected ({:?}): {message}",
                    guidance.category
                );
            }
            other => {
                submission.status = SubmissionStatus::Error;
                submission.dian_error_code = Some(other.to_string());
                submission.dian_error_message = response.status_message.clone();
                self.advance(&mut submission, previous)?;
                log::error!(
                    "submission {submission_id} got unexpected status code {other}: {}",
                    response.status_message.as_deref().unwrap_or("-")
                );
            }
        }
        Ok(submission)
    }

    /// Compare-and-set helper: a lost race means another poller already
    /// advanced the row, so adopt the stored state instead of clobbering it.
    fn advance(
        &self,
        submission: &mut Submission,
        expected: SubmissionStatus,
    ) -> EngineResult<()> {
        if !self.store.update_submission(submission, expected)? {
            if let Some(stored) = self.store.submission_by_id(submission.id)? {
                *submission = stored;
            }
        }
        Ok(())
    }

    /// Poll until the submission is terminal, the bounded attempts run
    /// out, or the flag is cancelled. Linear backoff between attempts; the
    /// current persisted state is always returned, never rolled back.
    pub async fn poll_until_final(
        &self,
        submission_id: Uuid,
        max_attempts: u32,
        delay: Duration,
        cancel: &CancelFlag,
    ) -> EngineResult<Submission> {
        let mut current = self.check_status(submission_id).await?;
        for attempt in 1..max_attempts.max(1) {
            if current.status.is_terminal() || cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(delay * attempt).await;
            if cancel.is_cancelled() {
                break;
            }
            current = self.check_status(submission_id).await?;
        }
        Ok(current)
    }
}
