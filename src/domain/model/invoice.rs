//! Invoice and line-item value types with their state machine.

use crate::domain::model::money;
use crate::infra::config::DianEnvironment;
use crate::infra::error::{EngineError, EngineResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// DIAN document type. Determines the fingerprint flavor (CUFE vs CUDE)
/// and the archive filename code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    SalesInvoice,
    CreditNote,
    DebitNote,
}

impl DocumentType {
    #[must_use]
    pub fn dian_code(&self) -> &'static str {
        match self {
            DocumentType::SalesInvoice => "01",
            DocumentType::CreditNote => "91",
            DocumentType::DebitNote => "92",
        }
    }
}

/// Invoice lifecycle. Transitions only move forward; see `can_transition_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    PendingSignature,
    Signed,
    SubmittedToDian,
    AcceptedByDian,
    RejectedByDian,
    Cancelled,
}

impl InvoiceStatus {
    /// True for states that have not yet been handed to DIAN; only these
    /// may be cancelled.
    #[must_use]
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::PendingSignature | InvoiceStatus::Signed
        )
    }

    #[must_use]
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (Draft, PendingSignature) => true,
            (PendingSignature, Signed) => true,
            (Signed, SubmittedToDian) => true,
            (SubmittedToDian, AcceptedByDian) => true,
            (SubmittedToDian, RejectedByDian) => true,
            (from, Cancelled) => from.is_pre_submission(),
            // Idempotent re-application is allowed, everything else is not.
            (a, b) => *a == b,
        }
    }
}

/// The document being issued. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub issuer_id: Uuid,
    pub customer_id: Uuid,
    pub environment: DianEnvironment,
    pub document_type: DocumentType,
    /// Optional numbering prefix, at most 10 characters.
    pub prefix: Option<String>,
    /// Positive sequence number within `(issuer, prefix)`.
    pub number: i64,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    /// ISO-4217 currency code.
    pub currency: String,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    /// CUFE/CUDE, empty until computed.
    pub fingerprint: String,
    pub status: InvoiceStatus,
    /// UBL XML sealed under the master key.
    pub ubl_blob: Option<String>,
    /// Signed XML sealed under the master key.
    pub signed_xml_blob: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fingerprint of the API key that created the invoice, when known.
    pub created_by_key: Option<String>,
}

impl Invoice {
    /// Document id as DIAN sees it: `{prefix}{number}` with no separator.
    #[must_use]
    pub fn document_id(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{}", self.number),
            None => self.number.to_string(),
        }
    }

    /// Validate the invoice header against its line items.
    pub fn validate(&self, lines: &[LineItem]) -> EngineResult<()> {
        if self.number <= 0 {
            return Err(EngineError::Validation(format!(
                "invoice number must be positive, got {}",
                self.number
            )));
        }
        if let Some(prefix) = &self.prefix {
            if prefix.len() > 10 {
                return Err(EngineError::Validation(format!(
                    "invoice prefix '{prefix}' exceeds 10 characters"
                )));
            }
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(EngineError::Validation(format!(
                "currency '{}' is not an ISO-4217 code",
                self.currency
            )));
        }
        if let Some(due) = self.due_date {
            if due <= self.issue_date {
                return Err(EngineError::Validation(
                    "due date must be after issue date".to_string(),
                ));
            }
        }
        if lines.is_empty() {
            return Err(EngineError::Validation(
                "invoice must carry at least one line item".to_string(),
            ));
        }
        for (index, line) in lines.iter().enumerate() {
            line.validate()?;
            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if line.line_number != expected {
                return Err(EngineError::Validation(format!(
                    "line numbers must be contiguous from 1; position {} holds line {}",
                    index + 1,
                    line.line_number
                )));
            }
        }

        let line_subtotal: i64 = lines.iter().map(|l| l.line_total_minor).sum();
        let line_tax: i64 = lines.iter().filter_map(|l| l.tax_minor).sum();
        if line_subtotal != self.subtotal_minor {
            return Err(EngineError::BusinessRule(format!(
                "subtotal mismatch: lines sum to {} but invoice declares {}",
                money::format_minor(line_subtotal),
                money::format_minor(self.subtotal_minor)
            )));
        }
        if line_tax != self.tax_minor {
            return Err(EngineError::BusinessRule(format!(
                "tax mismatch: lines sum to {} but invoice declares {}",
                money::format_minor(line_tax),
                money::format_minor(self.tax_minor)
            )));
        }
        if self.subtotal_minor + self.tax_minor != self.total_minor {
            return Err(EngineError::BusinessRule(format!(
                "total mismatch: expected {} but invoice declares {}",
                money::format_minor(self.subtotal_minor + self.tax_minor),
                money::format_minor(self.total_minor)
            )));
        }
        Ok(())
    }
}

/// A single billed good or service. Born with the invoice, immutable once
/// the invoice leaves Draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub invoice_id: Uuid,
    /// 1-based position within the invoice.
    pub line_number: u32,
    pub description: String,
    /// Quantity in ten-thousandths (1.0 == 10_000).
    pub quantity_e4: i64,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    /// Tax rate in hundredths of a percent (19% == 1900).
    pub tax_rate_e2: Option<i64>,
    pub tax_minor: Option<i64>,
    /// Standard item identification; rendered as "999" when absent.
    pub item_code: Option<String>,
}

impl LineItem {
    pub fn validate(&self) -> EngineResult<()> {
        if self.line_number == 0 {
            return Err(EngineError::Validation(
                "line numbers are 1-based".to_string(),
            ));
        }
        if self.quantity_e4 < 1 {
            return Err(EngineError::Validation(format!(
                "line {} quantity must be at least 0.0001",
                self.line_number
            )));
        }
        let expected_total = money::line_total(self.quantity_e4, self.unit_price_minor);
        if self.line_total_minor != expected_total {
            return Err(EngineError::BusinessRule(format!(
                "line {} total {} does not match quantity * unit price = {}",
                self.line_number,
                money::format_minor(self.line_total_minor),
                money::format_minor(expected_total)
            )));
        }
        match (self.tax_rate_e2, self.tax_minor) {
            (Some(rate), Some(tax)) => {
                let expected_tax = money::line_tax(self.line_total_minor, rate);
                if tax != expected_tax {
                    return Err(EngineError::BusinessRule(format!(
                        "line {} tax {} does not match {}% of {}",
                        self.line_number,
                        money::format_minor(tax),
                        money::format_percent(rate),
                        money::format_minor(self.line_total_minor)
                    )));
                }
            }
            (Some(_), None) => {
                return Err(EngineError::Validation(format!(
                    "line {} declares a tax rate without a tax amount",
                    self.line_number
                )));
            }
            (None, Some(_)) => {
                return Err(EngineError::Validation(format!(
                    "line {} declares a tax amount without a rate",
                    self.line_number
                )));
            }
            (None, None) => {}
        }
        Ok(())
    }
}
