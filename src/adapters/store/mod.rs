//! Persistence port.
//!
//! Typed operations per entity; implementations own all mutable domain
//! state and the serialization points the concurrency model relies on:
//! invoice-status compare-and-set, submission-status compare-and-set, and
//! replay-signature insert-if-absent.

pub mod memory;

pub use memory::MemoryStore;

use crate::domain::model::{
    ApiKey, Customer, Invoice, InvoiceStatus, Issuer, LineItem, RequestSignature, Submission,
    SubmissionStatus,
};
use crate::infra::error::EngineResult;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Abstract store for invoices, parties, submissions, keys and the
/// replay-nonce set.
pub trait EngineStore: Send + Sync {
    // Parties
    fn upsert_issuer(&self, issuer: Issuer) -> EngineResult<()>;
    fn issuer_by_id(&self, id: Uuid) -> EngineResult<Option<Issuer>>;
    fn issuer_by_nit(&self, nit_digits: &str) -> EngineResult<Option<Issuer>>;
    fn upsert_customer(&self, customer: Customer) -> EngineResult<()>;
    fn customer_by_id(&self, id: Uuid) -> EngineResult<Option<Customer>>;
    fn customer_by_identity(
        &self,
        id_type: crate::domain::model::IdType,
        id_number: &str,
    ) -> EngineResult<Option<Customer>>;

    // Invoices. Insert enforces `(issuer, prefix, number)` uniqueness.
    fn insert_invoice(&self, invoice: Invoice, lines: Vec<LineItem>) -> EngineResult<()>;
    fn update_invoice(&self, invoice: &Invoice) -> EngineResult<()>;
    fn invoice_by_id(&self, id: Uuid) -> EngineResult<Option<Invoice>>;
    fn lines_for_invoice(&self, invoice_id: Uuid) -> EngineResult<Vec<LineItem>>;
    fn invoices_for_issuer(&self, issuer_id: Uuid) -> EngineResult<Vec<Invoice>>;
    /// `max(number) + 1` scoped by `(issuer, prefix)`, atomically.
    fn next_invoice_number(&self, issuer_id: Uuid, prefix: Option<&str>) -> EngineResult<i64>;
    /// Compare-and-set on the status column; false when the expectation
    /// no longer holds.
    fn set_invoice_status(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        next: InvoiceStatus,
    ) -> EngineResult<bool>;

    // Submissions. Insert enforces at most one non-terminal submission per
    // invoice; update is a compare-and-set on the previous status.
    fn insert_submission(&self, submission: Submission) -> EngineResult<()>;
    fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> EngineResult<bool>;
    fn submission_by_id(&self, id: Uuid) -> EngineResult<Option<Submission>>;
    fn latest_submission_for_invoice(&self, invoice_id: Uuid) -> EngineResult<Option<Submission>>;

    // API keys
    fn insert_api_key(&self, key: ApiKey) -> EngineResult<()>;
    fn api_key_by_fingerprint(&self, fingerprint: &str) -> EngineResult<Option<ApiKey>>;
    fn touch_api_key(&self, fingerprint: &str, when: DateTime<Utc>) -> EngineResult<()>;

    // Replay-nonce set. Returns false when `(signature, timestamp)` was
    // already recorded; the single serialization point for request auth.
    fn record_request_signature(&self, record: RequestSignature) -> EngineResult<bool>;
    /// Drop replay records older than the acceptance window. Returns the
    /// number removed.
    fn prune_request_signatures(&self, older_than: DateTime<Utc>) -> EngineResult<usize>;
}
