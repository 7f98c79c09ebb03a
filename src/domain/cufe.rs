//! CUFE/CUDE fingerprint engine.
//!
//! The fingerprint is SHA-384 over an exact, order-sensitive concatenation
//! of invoice fields. Sales invoices hash the DIAN technical key in position
//! ten (CUFE); credit and debit notes hash the software PIN there instead
//! (CUDE). Everything is derived from stored invoice data, so a Draft can
//! always regenerate its fingerprint from scratch.

use crate::domain::crypto::{constant_time_eq, sha384_hex};
use crate::domain::model::money::format_minor;
use chrono::NaiveDate;

/// Deterministic placeholder for the issue time-of-day. Invoices do not
/// carry a time component yet; the intake contract must grow one before
/// production CUFEs can carry real times.
pub const ISSUE_TIME_PLACEHOLDER: &str = "120000";

/// Tax kinds DIAN recognizes in the fingerprint, in their mandated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaxKind {
    Iva,
    Inc,
    Ica,
}

impl TaxKind {
    #[must_use]
    pub fn dian_code(&self) -> &'static str {
        match self {
            TaxKind::Iva => "01",
            TaxKind::Inc => "04",
            TaxKind::Ica => "03",
        }
    }
}

/// One invoice-level tax total entering the fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct TaxSummary {
    pub kind: TaxKind,
    pub amount_minor: i64,
    pub taxable_base_minor: i64,
}

/// Everything the fingerprint depends on, already resolved by the caller.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    /// `{prefix}{number}`, no separator.
    pub document_id: &'a str,
    pub issue_date: NaiveDate,
    pub subtotal_minor: i64,
    /// Present taxes in any order; absent taxes emit no fields.
    pub taxes: &'a [TaxSummary],
    pub total_minor: i64,
    /// Issuer tax id, digits only, no check digit.
    pub issuer_nit_digits: &'a str,
    /// DIAN two-digit customer identification-type code.
    pub customer_id_type_code: &'a str,
    pub customer_id_number: &'a str,
    /// Technical key for CUFE, software PIN for CUDE.
    pub secret: &'a str,
    pub is_production: bool,
}

/// Build the exact concatenation DIAN hashes.
fn input_string(input: &FingerprintInput<'_>) -> String {
    let mut s = String::with_capacity(256);
    s.push_str(input.document_id);
    s.push_str(&input.issue_date.format("%Y%m%d").to_string());
    s.push_str(ISSUE_TIME_PLACEHOLDER);
    s.push_str(&format_minor(input.subtotal_minor));

    let mut taxes: Vec<&TaxSummary> = input.taxes.iter().collect();
    taxes.sort_by_key(|t| t.kind);
    for tax in taxes {
        s.push_str(tax.kind.dian_code());
        s.push_str(&format_minor(tax.amount_minor));
        s.push_str(&format_minor(tax.taxable_base_minor));
    }

    s.push_str(&format_minor(input.total_minor));
    s.push_str(input.issuer_nit_digits);
    s.push_str(input.customer_id_type_code);
    s.push_str(input.customer_id_number);
    s.push_str(input.secret);
    s.push(if input.is_production { '1' } else { '2' });
    s
}

/// Compute the fingerprint: lowercase hex SHA-384, 96 characters.
#[must_use]
pub fn compute(input: &FingerprintInput<'_>) -> String {
    sha384_hex(input_string(input).as_bytes())
}

/// Recompute and compare in constant time.
#[must_use]
pub fn verify(input: &FingerprintInput<'_>, fingerprint: &str) -> bool {
    is_well_formed(fingerprint) && constant_time_eq(compute(input).as_bytes(), fingerprint.as_bytes())
}

/// `^[0-9a-f]{96}$`
#[must_use]
pub fn is_well_formed(fingerprint: &str) -> bool {
    fingerprint.len() == 96
        && fingerprint
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
