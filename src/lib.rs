//! Tinto DIAN Engine
//!
//! Electronic invoicing engine for Colombia's DIAN: CUFE/CUDE fingerprints,
//! UBL 2.1 document assembly, XAdES enveloped signing, ZIP packaging, SOAP
//! submission, and the asynchronous validation state machine.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use adapters::soap::{AsyncResponse, DianSoapClient, DianTransport, StatusZipResponse};
pub use adapters::store::{EngineStore, MemoryStore};
pub use domain::errmap::{classify, ErrorCategory, ErrorGuidance};
pub use domain::model::{
    ApiKey, Capability, Customer, DocumentType, Invoice, InvoiceStatus, Issuer, LineItem, Role,
    Submission, SubmissionStatus,
};
pub use infra::config::{DianEnvironment, EngineConfig};
pub use infra::error::{
    AuthFailure, CryptoFailure, EngineError, EngineResult, SecurityFailure, SignFailure,
};
pub use pipelines::{CancelFlag, Orchestrator};
pub use services::custody::{derive_api_key, IssuedApiKey, MasterKey};
pub use services::intake::{InvoiceIntake, LineIntake};

use chrono::Utc;
use services::auth::max_request_age;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Live status view for an invoice and its latest submission.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusDetail {
    pub invoice_id: Uuid,
    pub invoice_status: InvoiceStatus,
    pub fingerprint: String,
    pub submission_id: Option<Uuid>,
    pub submission_status: Option<SubmissionStatus>,
    pub track_id: Option<String>,
    pub dian_error_code: Option<String>,
    pub dian_error_message: Option<String>,
    /// Actionable guidance, present on rejected or errored submissions.
    pub guidance: Option<ErrorGuidance>,
}

/// The explicit composition root: one store, one transport, one master key,
/// one configuration, wired at startup and threaded through immutably.
pub struct Engine<T: DianTransport> {
    store: Arc<dyn EngineStore>,
    orchestrator: Orchestrator<T>,
    environment: DianEnvironment,
    master: MasterKey,
}

impl<T: DianTransport> Engine<T> {
    pub fn new(
        store: Arc<dyn EngineStore>,
        transport: T,
        master: MasterKey,
        config: EngineConfig,
    ) -> Self {
        let environment = config.environment;
        let orchestrator = Orchestrator::new(store.clone(), transport, master.clone(), config);
        Self {
            store,
            orchestrator,
            environment,
            master,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    /// Register (or update) an issuer, sealing its signing credential.
    pub fn register_issuer(
        &self,
        mut issuer: Issuer,
        certificate_pem: Option<&[u8]>,
    ) -> EngineResult<()> {
        if let Some(pem) = certificate_pem {
            issuer.certificate_blob = Some(self.master.seal(pem)?);
        }
        self.store.upsert_issuer(issuer)
    }

    pub fn register_customer(&self, customer: Customer) -> EngineResult<()> {
        self.store.upsert_customer(customer)
    }

    /// Derive and persist a fresh API key; the raw secret in the result is
    /// shown once and never again.
    pub fn create_api_key(
        &self,
        name: &str,
        role: Role,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> EngineResult<IssuedApiKey> {
        let issued = derive_api_key(&self.master, name, role, expires_at, Utc::now())?;
        self.store.insert_api_key(issued.record.clone())?;
        Ok(issued)
    }

    /// Create a Draft invoice from an intake request.
    pub fn create_invoice(
        &self,
        intake: &InvoiceIntake,
        created_by_key: Option<String>,
    ) -> EngineResult<Invoice> {
        let nit_digits: String = intake
            .issuer_nit
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let issuer = self
            .store
            .issuer_by_nit(&nit_digits)?
            .ok_or_else(|| EngineError::NotFound(format!("issuer NIT {nit_digits}")))?;
        let customer = self
            .store
            .customer_by_identity(intake.customer_id_type, &intake.customer_id_number)?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "customer {}/{}",
                    intake.customer_id_type.dian_code(),
                    intake.customer_id_number
                ))
            })?;

        let number = match intake.number {
            Some(number) => number,
            None => self
                .store
                .next_invoice_number(issuer.id, intake.prefix.as_deref())?,
        };
        let (invoice, lines) = services::intake::materialize(
            intake,
            issuer.id,
            customer.id,
            self.environment,
            number,
            created_by_key,
        )?;
        self.store.insert_invoice(invoice.clone(), lines)?;
        log::info!("created invoice {} ({})", invoice.id, invoice.document_id());
        Ok(invoice)
    }

    /// Issue an invoice to DIAN (idempotent submission).
    pub async fn issue(&self, invoice_id: Uuid) -> EngineResult<Submission> {
        self.orchestrator.submit(invoice_id).await
    }

    pub fn invoice(&self, id: Uuid) -> EngineResult<Invoice> {
        self.store
            .invoice_by_id(id)?
            .ok_or_else(|| EngineError::NotFound(format!("invoice {id}")))
    }

    pub fn line_items(&self, invoice_id: Uuid) -> EngineResult<Vec<LineItem>> {
        self.store.lines_for_invoice(invoice_id)
    }

    /// List an issuer's invoices by NIT (9-10 digits).
    pub fn invoices_for_issuer_nit(&self, nit: &str) -> EngineResult<Vec<Invoice>> {
        let digits: String = nit.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < 9 || digits.len() > 10 {
            return Err(EngineError::Validation(format!(
                "issuer NIT must be 9-10 digits, got '{nit}'"
            )));
        }
        let issuer = self
            .store
            .issuer_by_nit(&digits)?
            .ok_or_else(|| EngineError::NotFound(format!("issuer NIT {digits}")))?;
        self.store.invoices_for_issuer(issuer.id)
    }

    /// Current status of an invoice and its latest submission.
    pub fn status_detail(&self, invoice_id: Uuid) -> EngineResult<StatusDetail> {
        let invoice = self.invoice(invoice_id)?;
        let submission = self.store.latest_submission_for_invoice(invoice_id)?;
        Ok(Self::detail_from(&invoice, submission.as_ref()))
    }

    /// Poll DIAN once for the latest submission, then report.
    pub async fn refresh_status(&self, invoice_id: Uuid) -> EngineResult<StatusDetail> {
        let invoice = self.invoice(invoice_id)?;
        let submission = match self.store.latest_submission_for_invoice(invoice_id)? {
            Some(submission) => Some(self.orchestrator.check_status(submission.id).await?),
            None => None,
        };
        // Invoice status may have advanced with the submission.
        let invoice = self.invoice(invoice.id)?;
        Ok(Self::detail_from(&invoice, submission.as_ref()))
    }

    /// Poll the latest submission until terminal.
    pub async fn poll_until_final(
        &self,
        invoice_id: Uuid,
        max_attempts: u32,
        delay: Duration,
        cancel: &CancelFlag,
    ) -> EngineResult<StatusDetail> {
        let submission = self
            .store
            .latest_submission_for_invoice(invoice_id)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("invoice {invoice_id} has no submission"))
            })?;
        self.orchestrator
            .poll_until_final(submission.id, max_attempts, delay, cancel)
            .await?;
        self.status_detail(invoice_id)
    }

    /// Drop replay records older than the acceptance window. Run this
    /// periodically from a background task.
    pub fn compact_replay_set(&self) -> EngineResult<usize> {
        let cutoff = Utc::now() - max_request_age();
        let removed = self.store.prune_request_signatures(cutoff)?;
        if removed > 0 {
            log::debug!("compacted {removed} replay records");
        }
        Ok(removed)
    }

    fn detail_from(invoice: &Invoice, submission: Option<&Submission>) -> StatusDetail {
        let guidance = submission.and_then(|s| match s.status {
            SubmissionStatus::Rejected | SubmissionStatus::Error => Some(classify(
                s.dian_error_code.as_deref(),
                s.dian_error_message.as_deref().unwrap_or(""),
            )),
            _ => None,
        });
        StatusDetail {
            invoice_id: invoice.id,
            invoice_status: invoice.status,
            fingerprint: invoice.fingerprint.clone(),
            submission_id: submission.map(|s| s.id),
            submission_status: submission.map(|s| s.status),
            track_id: submission.and_then(|s| s.track_id.clone()),
            dian_error_code: submission.and_then(|s| s.dian_error_code.clone()),
            dian_error_message: submission.and_then(|s| s.dian_error_message.clone()),
            guidance,
        }
    }
}
