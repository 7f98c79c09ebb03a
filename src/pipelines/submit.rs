//! `submit`: drive one invoice through fingerprint, UBL, signature,
//! packaging and `SendBillAsync`, leaving a durable submission trail.

use crate::adapters::soap::DianTransport;
use crate::adapters::store::EngineStore;
use crate::domain::cufe::{self, FingerprintInput, TaxKind, TaxSummary};
use crate::domain::model::{
    Customer, DocumentType, Invoice, InvoiceStatus, Issuer, LineItem, Submission,
    SubmissionStatus,
};
use crate::domain::packaging;
use crate::domain::ubl::{self, UblDocument};
use crate::domain::xmldsig::{sign_xml, verify_signed_xml, Keystore};
use crate::domain::errmap;
use crate::infra::config::EngineConfig;
use crate::infra::error::{EngineError, EngineResult, SignFailure};
use crate::services::custody::MasterKey;
use chrono::{Datelike, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// The composition of everything `submit` and `check_status` need. Built
/// once at startup; immutable afterwards.
pub struct Orchestrator<T: DianTransport> {
    pub(crate) store: Arc<dyn EngineStore>,
    pub(crate) transport: T,
    pub(crate) master: MasterKey,
    pub(crate) config: EngineConfig,
}

impl<T: DianTransport> Orchestrator<T> {
    pub fn new(
        store: Arc<dyn EngineStore>,
        transport: T,
        master: MasterKey,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            master,
            config,
        }
    }

    /// Submit an invoice to DIAN.
    ///
    /// Idempotent: an existing non-terminal submission is returned as-is
    /// with no SOAP traffic. Any failure after the submission row exists
    /// lands it in `Error` with the failure message captured.
    pub async fn submit(&self, invoice_id: Uuid) -> EngineResult<Submission> {
        let mut invoice = self
            .store
            .invoice_by_id(invoice_id)?
            .ok_or_else(|| EngineError::NotFound(format!("invoice {invoice_id}")))?;

        if let Some(latest) = self.store.latest_submission_for_invoice(invoice_id)? {
            if !latest.status.is_terminal() {
                log::info!(
                    "invoice {} already has submission {} in {:?}; returning it",
                    invoice_id,
                    latest.id,
                    latest.status
                );
                return Ok(latest);
            }
        }

        if !matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Signed) {
            return Err(EngineError::Conflict(format!(
                "invoice in {:?} cannot be submitted",
                invoice.status
            )));
        }

        let lines = self.store.lines_for_invoice(invoice_id)?;
        let issuer = self
            .store
            .issuer_by_id(invoice.issuer_id)?
            .ok_or_else(|| EngineError::NotFound(format!("issuer {}", invoice.issuer_id)))?;
        let customer = self
            .store
            .customer_by_id(invoice.customer_id)?
            .ok_or_else(|| EngineError::NotFound(format!("customer {}", invoice.customer_id)))?;
        invoice.validate(&lines)?;

        let mut submission = Submission::new(invoice_id, invoice.environment);
        self.store.insert_submission(submission.clone())?;

        match self
            .run_pipeline(&mut submission, &mut invoice, &lines, &issuer, &customer)
            .await
        {
            Ok(()) => Ok(submission),
            Err(error) => {
                if !submission.status.is_terminal() {
                    let previous = submission.status;
                    submission.status = SubmissionStatus::Error;
                    submission.dian_error_message = Some(error.to_string());
                    if let Err(persist_error) =
                        self.store.update_submission(&submission, previous)
                    {
                        log::error!(
                            "failed to persist error state for submission {}: {persist_error}",
                            submission.id
                        );
                    }
                }
                Err(error)
            }
        }
    }

    async fn run_pipeline(
        &self,
        submission: &mut Submission,
        invoice: &mut Invoice,
        lines: &[LineItem],
        issuer: &Issuer,
        customer: &Customer,
    ) -> EngineResult<()> {
        // The fingerprint is a pure function of invoice data and is
        // recomputed on every attempt.
        let issuer_nit = issuer.nit_digits();
        let taxes = invoice_taxes(invoice);
        let document_id = invoice.document_id();
        let fingerprint = cufe::compute(&FingerprintInput {
            document_id: &document_id,
            issue_date: invoice.issue_date,
            subtotal_minor: invoice.subtotal_minor,
            taxes: &taxes,
            total_minor: invoice.total_minor,
            issuer_nit_digits: &issuer_nit,
            customer_id_type_code: customer.id_type.dian_code(),
            customer_id_number: &customer.id_number,
            secret: self.fingerprint_secret(invoice.document_type),
            is_production: self.config.environment.is_production(),
        });
        invoice.fingerprint = fingerprint;

        if invoice.status == InvoiceStatus::Draft {
            if !self.store.set_invoice_status(
                invoice.id,
                InvoiceStatus::Draft,
                InvoiceStatus::PendingSignature,
            )? {
                return Err(EngineError::Conflict(
                    "concurrent issue attempt won the draft".to_string(),
                ));
            }
            invoice.status = InvoiceStatus::PendingSignature;
        }

        let ubl_xml = ubl::build(&UblDocument {
            invoice: &*invoice,
            lines,
            issuer,
            customer,
            software_id: &self.config.software_id,
            software_provider_nit: &self.config.software_provider_nit,
        })?;
        invoice.ubl_blob = Some(self.master.seal(ubl_xml.as_bytes())?);
        self.store.update_invoice(invoice)?;

        let keystore = self.resolve_keystore(issuer)?;
        let signed_xml = sign_xml(&ubl_xml, &keystore)?;
        // The signed document must verify under its own certificate
        // before it is packaged.
        let report = verify_signed_xml(&signed_xml)?;
        if !report.digest_ok {
            return Err(SignFailure::DigestMismatch.into());
        }
        if !report.signature_ok {
            return Err(SignFailure::SignatureInvalid.into());
        }
        invoice.signed_xml_blob = Some(self.master.seal(signed_xml.as_bytes())?);
        if invoice.status == InvoiceStatus::PendingSignature {
            self.store.set_invoice_status(
                invoice.id,
                InvoiceStatus::PendingSignature,
                InvoiceStatus::Signed,
            )?;
            invoice.status = InvoiceStatus::Signed;
        }
        self.store.update_invoice(invoice)?;

        let package = packaging::package_to_zip(
            &signed_xml,
            packaging::archive_name(
                &issuer_nit,
                invoice.document_type,
                invoice.issue_date.year(),
                invoice.number,
            ),
            packaging::inner_xml_name(&invoice.document_id()),
        )?;
        submission.request_zip_blob = Some(self.master.seal(package.zip_base64.as_bytes())?);
        self.store
            .update_submission(submission, SubmissionStatus::Pending)?;

        let response = self
            .transport
            .send_bill_async(&package.archive_name, &package.zip_base64)
            .await?;

        match (response.success, response.track_id) {
            (true, Some(track_id)) => {
                submission.track_id = Some(track_id);
                submission.status = SubmissionStatus::Submitted;
                submission.submitted_at = Some(Utc::now());
                self.store
                    .update_submission(submission, SubmissionStatus::Pending)?;
                self.store.set_invoice_status(
                    invoice.id,
                    InvoiceStatus::Signed,
                    InvoiceStatus::SubmittedToDian,
                )?;
                log::info!(
                    "submission {} accepted for processing, track {}",
                    submission.id,
                    submission.track_id.as_deref().unwrap_or("-")
                );
                Ok(())
            }
            _ => {
                let message = response
                    .error_message
                    .unwrap_or_else(|| "SendBillAsync returned no track id".to_string());
                let guidance =
                    errmap::classify(response.error_code.as_deref(), &message);
                submission.status = SubmissionStatus::Error;
                submission.dian_error_code = response.error_code;
                submission.dian_error_message = Some(message.clone());
                self.store
                    .update_submission(submission, SubmissionStatus::Pending)?;
                log::warn!(
                    "submission {} rejected by DIAN ({:?}): {message}",
                    submission.id,
                    guidance.category
                );
                // Invoice stays Signed and can be retried with a fresh
                // submission.
                Err(EngineError::Upstream(message))
            }
        }
    }

    /// CUFE hashes the technical key; CUDE (notes) hashes the software PIN.
    fn fingerprint_secret(&self, document_type: DocumentType) -> &str {
        match document_type {
            DocumentType::SalesInvoice => &self.config.technical_key,
            DocumentType::CreditNote | DocumentType::DebitNote => &self.config.software_pin,
        }
    }

    /// Prefer the issuer's own sealed credential; fall back to the
    /// configured PKCS#12 keystore.
    fn resolve_keystore(&self, issuer: &Issuer) -> EngineResult<Keystore> {
        if let Some(blob) = &issuer.certificate_blob {
            if let Some(expiry) = issuer.certificate_expiry {
                if expiry < Utc::now() {
                    return Err(SignFailure::KeystoreUnreadable(format!(
                        "issuer certificate expired at {expiry}"
                    ))
                    .into());
                }
            }
            let pem = self.master.open(blob)?;
            return Ok(Keystore::from_pem_parts(&pem, &pem)?);
        }
        match (&self.config.certificate_path, &self.config.certificate_password) {
            (Some(path), Some(password)) => Ok(Keystore::open_pkcs12(
                path,
                password,
                self.config.certificate_alias.as_deref(),
            )?),
            _ => Err(SignFailure::KeystoreUnreadable(
                "no signing credential: issuer has no certificate and none is configured"
                    .to_string(),
            )
            .into()),
        }
    }
}

/// Invoice-level tax summary entering the fingerprint: IVA only in v1,
/// emitted when a tax amount is present.
fn invoice_taxes(invoice: &Invoice) -> Vec<TaxSummary> {
    if invoice.tax_minor > 0 {
        vec![TaxSummary {
            kind: TaxKind::Iva,
            amount_minor: invoice.tax_minor,
            taxable_base_minor: invoice.subtotal_minor,
        }]
    } else {
        Vec::new()
    }
}
