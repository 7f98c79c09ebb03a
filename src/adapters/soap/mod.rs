//! SOAP transport to DIAN.
//!
//! Two operations matter: `SendBillAsync` delivers the ZIP, `GetStatusZip`
//! polls the verdict. The trait seam lets the orchestrator run against a
//! scripted transport in tests while production uses the HTTP client.

pub mod client;
pub mod envelope;
pub mod response;

pub use client::DianSoapClient;

use crate::infra::error::EngineResult;

/// Result of `SendBillAsync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncResponse {
    pub success: bool,
    pub track_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Result of `GetStatusZip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusZipResponse {
    pub track_id: String,
    /// "00" in process, "02" accepted, "04" rejected.
    pub status_code: String,
    pub status_message: Option<String>,
    /// ApplicationResponse ZIP, base64.
    pub zip_base64: String,
}

/// Outbound DIAN operations.
pub trait DianTransport: Send + Sync {
    fn send_bill_async(
        &self,
        filename: &str,
        zip_base64: &str,
    ) -> impl std::future::Future<Output = EngineResult<AsyncResponse>> + Send;

    fn get_status_zip(
        &self,
        track_id: &str,
    ) -> impl std::future::Future<Output = EngineResult<StatusZipResponse>> + Send;
}

impl<T: DianTransport + ?Sized> DianTransport for std::sync::Arc<T> {
    fn send_bill_async(
        &self,
        filename: &str,
        zip_base64: &str,
    ) -> impl std::future::Future<Output = EngineResult<AsyncResponse>> + Send {
        T::send_bill_async(self, filename, zip_base64)
    }

    fn get_status_zip(
        &self,
        track_id: &str,
    ) -> impl std::future::Future<Output = EngineResult<StatusZipResponse>> + Send {
        T::get_status_zip(self, track_id)
    }
}
