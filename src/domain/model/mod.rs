//! Domain value types: invoices, parties, submissions, fixed-point money.
//!
//! Plain data with explicit validation; persistence is someone else's job.

pub mod credentials;
pub mod invoice;
pub mod money;
pub mod party;
pub mod submission;

pub use credentials::{ApiKey, Capability, RequestSignature, Role};
pub use invoice::{DocumentType, Invoice, InvoiceStatus, LineItem};
pub use party::{Customer, IdType, Issuer};
pub use submission::{Submission, SubmissionStatus};
