//! In-memory reference implementation of the persistence port.
//!
//! Mutex-guarded tables with the same unique constraints and
//! compare-and-set semantics a relational backend would enforce. Suitable
//! for tests and single-process deployments.

use crate::adapters::store::EngineStore;
use crate::domain::model::{
    ApiKey, Customer, Invoice, InvoiceStatus, Issuer, LineItem, RequestSignature, Submission,
    SubmissionStatus,
};
use crate::infra::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    issuers: HashMap<Uuid, Issuer>,
    customers: HashMap<Uuid, Customer>,
    invoices: HashMap<Uuid, Invoice>,
    lines: HashMap<Uuid, Vec<LineItem>>,
    submissions: HashMap<Uuid, Submission>,
    /// Insertion order per invoice, newest last.
    submissions_by_invoice: HashMap<Uuid, Vec<Uuid>>,
    api_keys: HashMap<String, ApiKey>,
    replay: HashSet<(String, DateTime<Utc>)>,
    replay_records: Vec<RequestSignature>,
}

/// Mutex-guarded store; all operations take the single lock briefly.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| EngineError::Conflict("store lock poisoned".to_string()))
    }
}

impl EngineStore for MemoryStore {
    fn upsert_issuer(&self, issuer: Issuer) -> EngineResult<()> {
        let mut t = self.lock()?;
        let nit = issuer.nit_digits();
        if t.issuers
            .values()
            .any(|i| i.id != issuer.id && i.nit_digits() == nit)
        {
            return Err(EngineError::Conflict(format!(
                "issuer with NIT {nit} already exists"
            )));
        }
        t.issuers.insert(issuer.id, issuer);
        Ok(())
    }

    fn issuer_by_id(&self, id: Uuid) -> EngineResult<Option<Issuer>> {
        Ok(self.lock()?.issuers.get(&id).cloned())
    }

    fn issuer_by_nit(&self, nit_digits: &str) -> EngineResult<Option<Issuer>> {
        Ok(self
            .lock()?
            .issuers
            .values()
            .find(|i| i.nit_digits() == nit_digits)
            .cloned())
    }

    fn upsert_customer(&self, customer: Customer) -> EngineResult<()> {
        let mut t = self.lock()?;
        if t.customers.values().any(|c| {
            c.id != customer.id
                && c.id_type == customer.id_type
                && c.id_number == customer.id_number
        }) {
            return Err(EngineError::Conflict(format!(
                "customer {}/{} already exists",
                customer.id_type.dian_code(),
                customer.id_number
            )));
        }
        t.customers.insert(customer.id, customer);
        Ok(())
    }

    fn customer_by_id(&self, id: Uuid) -> EngineResult<Option<Customer>> {
        Ok(self.lock()?.customers.get(&id).cloned())
    }

    fn customer_by_identity(
        &self,
        id_type: crate::domain::model::IdType,
        id_number: &str,
    ) -> EngineResult<Option<Customer>> {
        Ok(self
            .lock()?
            .customers
            .values()
            .find(|c| c.id_type == id_type && c.id_number == id_number)
            .cloned())
    }

    fn insert_invoice(&self, invoice: Invoice, lines: Vec<LineItem>) -> EngineResult<()> {
        let mut t = self.lock()?;
        if t.invoices.values().any(|existing| {
            existing.issuer_id == invoice.issuer_id
                && existing.prefix == invoice.prefix
                && existing.number == invoice.number
        }) {
            return Err(EngineError::Conflict(format!(
                "invoice {} already exists for this issuer",
                invoice.document_id()
            )));
        }
        t.lines.insert(invoice.id, lines);
        t.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn update_invoice(&self, invoice: &Invoice) -> EngineResult<()> {
        let mut t = self.lock()?;
        if !t.invoices.contains_key(&invoice.id) {
            return Err(EngineError::NotFound(format!("invoice {}", invoice.id)));
        }
        let mut updated = invoice.clone();
        updated.updated_at = Utc::now();
        t.invoices.insert(invoice.id, updated);
        Ok(())
    }

    fn invoice_by_id(&self, id: Uuid) -> EngineResult<Option<Invoice>> {
        Ok(self.lock()?.invoices.get(&id).cloned())
    }

    fn lines_for_invoice(&self, invoice_id: Uuid) -> EngineResult<Vec<LineItem>> {
        Ok(self.lock()?.lines.get(&invoice_id).cloned().unwrap_or_default())
    }

    fn invoices_for_issuer(&self, issuer_id: Uuid) -> EngineResult<Vec<Invoice>> {
        let t = self.lock()?;
        let mut list: Vec<Invoice> = t
            .invoices
            .values()
            .filter(|i| i.issuer_id == issuer_id)
            .cloned()
            .collect();
        list.sort_by_key(|i| i.created_at);
        Ok(list)
    }

    fn next_invoice_number(&self, issuer_id: Uuid, prefix: Option<&str>) -> EngineResult<i64> {
        let t = self.lock()?;
        let max = t
            .invoices
            .values()
            .filter(|i| i.issuer_id == issuer_id && i.prefix.as_deref() == prefix)
            .map(|i| i.number)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    fn set_invoice_status(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        next: InvoiceStatus,
    ) -> EngineResult<bool> {
        let mut t = self.lock()?;
        let invoice = t
            .invoices
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("invoice {id}")))?;
        if invoice.status != expected {
            return Ok(false);
        }
        if !expected.can_transition_to(next) {
            return Err(EngineError::Conflict(format!(
                "invoice status {expected:?} cannot move to {next:?}"
            )));
        }
        invoice.status = next;
        invoice.updated_at = Utc::now();
        Ok(true)
    }

    fn insert_submission(&self, submission: Submission) -> EngineResult<()> {
        let mut t = self.lock()?;
        let open_exists = t
            .submissions_by_invoice
            .get(&submission.invoice_id)
            .map_or(false, |ids| {
                ids.iter().any(|id| {
                    t.submissions
                        .get(id)
                        .map_or(false, |s| !s.status.is_terminal())
                })
            });
        if open_exists {
            return Err(EngineError::Conflict(format!(
                "invoice {} already has a submission in flight",
                submission.invoice_id
            )));
        }
        t.submissions_by_invoice
            .entry(submission.invoice_id)
            .or_default()
            .push(submission.id);
        t.submissions.insert(submission.id, submission);
        Ok(())
    }

    fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> EngineResult<bool> {
        let mut t = self.lock()?;
        let stored = t
            .submissions
            .get_mut(&submission.id)
            .ok_or_else(|| EngineError::NotFound(format!("submission {}", submission.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        if stored.status.is_terminal() {
            return Err(EngineError::Conflict(
                "terminal submissions never mutate".to_string(),
            ));
        }
        if !expected.can_transition_to(submission.status) {
            return Err(EngineError::Conflict(format!(
                "submission status {expected:?} cannot move to {:?}",
                submission.status
            )));
        }
        let mut updated = submission.clone();
        updated.updated_at = Utc::now();
        *stored = updated;
        Ok(true)
    }

    fn submission_by_id(&self, id: Uuid) -> EngineResult<Option<Submission>> {
        Ok(self.lock()?.submissions.get(&id).cloned())
    }

    fn latest_submission_for_invoice(&self, invoice_id: Uuid) -> EngineResult<Option<Submission>> {
        let t = self.lock()?;
        Ok(t.submissions_by_invoice
            .get(&invoice_id)
            .and_then(|ids| ids.last())
            .and_then(|id| t.submissions.get(id))
            .cloned())
    }

    fn insert_api_key(&self, key: ApiKey) -> EngineResult<()> {
        let mut t = self.lock()?;
        if t.api_keys.contains_key(&key.fingerprint) {
            return Err(EngineError::Conflict("API key fingerprint collision".to_string()));
        }
        t.api_keys.insert(key.fingerprint.clone(), key);
        Ok(())
    }

    fn api_key_by_fingerprint(&self, fingerprint: &str) -> EngineResult<Option<ApiKey>> {
        Ok(self.lock()?.api_keys.get(fingerprint).cloned())
    }

    fn touch_api_key(&self, fingerprint: &str, when: DateTime<Utc>) -> EngineResult<()> {
        let mut t = self.lock()?;
        if let Some(key) = t.api_keys.get_mut(fingerprint) {
            key.last_used_at = Some(when);
        }
        Ok(())
    }

    fn record_request_signature(&self, record: RequestSignature) -> EngineResult<bool> {
        let mut t = self.lock()?;
        let replay_key = (record.signature.clone(), record.requested_at);
        if !t.replay.insert(replay_key) {
            return Ok(false);
        }
        t.replay_records.push(record);
        Ok(true)
    }

    fn prune_request_signatures(&self, older_than: DateTime<Utc>) -> EngineResult<usize> {
        let mut t = self.lock()?;
        let before = t.replay.len();
        t.replay.retain(|(_, ts)| *ts >= older_than);
        t.replay_records.retain(|r| r.requested_at >= older_than);
        Ok(before - t.replay.len())
    }
}
