//! Issuance intake: turn an already-parsed request into a Draft invoice.
//!
//! Line totals are recomputed here; a declared total that disagrees with
//! the computed one aborts the intake before anything is persisted.

use crate::domain::model::money::{self, format_minor};
use crate::domain::model::{DocumentType, IdType, Invoice, InvoiceStatus, LineItem};
use crate::infra::config::DianEnvironment;
use crate::infra::error::{EngineError, EngineResult};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// One line of an intake request.
#[derive(Debug, Clone, Deserialize)]
pub struct LineIntake {
    pub description: String,
    /// Quantity in ten-thousandths.
    pub quantity_e4: i64,
    pub unit_price_minor: i64,
    /// Rate in hundredths of a percent when the line is taxed.
    pub tax_rate_e2: Option<i64>,
    pub item_code: Option<String>,
}

/// An invoice creation request, already parsed and typed by the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceIntake {
    pub issuer_nit: String,
    pub customer_id_type: IdType,
    pub customer_id_number: String,
    pub document_type: DocumentType,
    pub prefix: Option<String>,
    /// Explicit sequence number; allocated from the issuer's sequence
    /// when absent.
    pub number: Option<i64>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub lines: Vec<LineIntake>,
    /// Caller's declared grand total for cross-checking, minor units.
    pub declared_total_minor: Option<i64>,
}

/// Materialize the intake into a Draft invoice plus its line items.
/// `number` must already be resolved by the caller.
pub fn materialize(
    intake: &InvoiceIntake,
    issuer_id: Uuid,
    customer_id: Uuid,
    environment: DianEnvironment,
    number: i64,
    created_by_key: Option<String>,
) -> EngineResult<(Invoice, Vec<LineItem>)> {
    let invoice_id = Uuid::new_v4();
    let mut lines = Vec::with_capacity(intake.lines.len());
    for (index, line) in intake.lines.iter().enumerate() {
        let line_total = money::line_total(line.quantity_e4, line.unit_price_minor);
        let tax = line.tax_rate_e2.map(|rate| money::line_tax(line_total, rate));
        lines.push(LineItem {
            invoice_id,
            line_number: u32::try_from(index + 1)
                .map_err(|_| EngineError::Validation("too many line items".to_string()))?,
            description: line.description.clone(),
            quantity_e4: line.quantity_e4,
            unit_price_minor: line.unit_price_minor,
            line_total_minor: line_total,
            tax_rate_e2: line.tax_rate_e2,
            tax_minor: tax,
            item_code: line.item_code.clone(),
        });
    }

    let subtotal: i64 = lines.iter().map(|l| l.line_total_minor).sum();
    let tax: i64 = lines.iter().filter_map(|l| l.tax_minor).sum();
    let total = subtotal + tax;

    if let Some(declared) = intake.declared_total_minor {
        if declared != total {
            return Err(EngineError::BusinessRule(format!(
                "declared total {} does not match computed total {}",
                format_minor(declared),
                format_minor(total)
            )));
        }
    }

    let now = Utc::now();
    let invoice = Invoice {
        id: invoice_id,
        issuer_id,
        customer_id,
        environment,
        document_type: intake.document_type,
        prefix: intake.prefix.clone(),
        number,
        issue_date: intake.issue_date,
        due_date: intake.due_date,
        currency: intake.currency.clone(),
        subtotal_minor: subtotal,
        tax_minor: tax,
        total_minor: total,
        fingerprint: String::new(),
        status: InvoiceStatus::Draft,
        ubl_blob: None,
        signed_xml_blob: None,
        created_at: now,
        updated_at: now,
        created_by_key,
    };
    invoice.validate(&lines)?;
    Ok((invoice, lines))
}
