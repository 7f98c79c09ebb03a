//! HTTP SOAP client for DIAN with retry and backoff.
//!
//! Connection failures and 5xx responses retry with exponential backoff;
//! 4xx responses and SOAP faults are handed to the parsers as final
//! outcomes.

use crate::adapters::soap::envelope::{self, SoapCredentials};
use crate::adapters::soap::{response, AsyncResponse, DianTransport, StatusZipResponse};
use crate::infra::error::{EngineError, EngineResult};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);
/// Backoff schedule; its length is the attempt cap.
const BACKOFF: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

/// SOAP 1.2 client bound to one environment endpoint.
pub struct DianSoapClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: SoapCredentials,
}

impl DianSoapClient {
    pub fn new(endpoint: &str, software_id: &str, software_pin: &str) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(RECEIVE_TIMEOUT)
            .user_agent("tinto-dian/0.3")
            .build()
            .map_err(|e| EngineError::Upstream(format!("HTTP client build: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            credentials: SoapCredentials {
                software_id: software_id.to_string(),
                software_pin: software_pin.to_string(),
            },
        })
    }

    /// POST an envelope; retry connect errors and 5xx per the backoff
    /// schedule, return the final `(status, body)` otherwise.
    async fn post_envelope(&self, action: &str, envelope: String) -> EngineResult<(u16, String)> {
        let mut last_error = String::new();
        for (attempt, delay) in BACKOFF.iter().enumerate() {
            match self.single_post(action, &envelope).await {
                Ok((status, body)) => {
                    if status >= 500 {
                        last_error = format!("HTTP {status} from DIAN");
                        log::warn!("{last_error} (attempt {})", attempt + 1);
                    } else {
                        return Ok((status, body));
                    }
                }
                Err(e) => {
                    last_error = e;
                    log::warn!("DIAN request failed: {last_error} (attempt {})", attempt + 1);
                }
            }
            if attempt + 1 < BACKOFF.len() {
                tokio::time::sleep(*delay).await;
            }
        }
        Err(EngineError::Upstream(format!(
            "DIAN unreachable after {} attempts: {last_error}",
            BACKOFF.len()
        )))
    }

    async fn single_post(&self, action: &str, envelope: &str) -> Result<(u16, String), String> {
        let content_type = format!("application/soap+xml;charset=UTF-8;action=\"{action}\"");
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", content_type)
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| format!("transport: {e}"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| format!("read body: {e}"))?;
        Ok((status, body))
    }
}

impl DianTransport for DianSoapClient {
    async fn send_bill_async(
        &self,
        filename: &str,
        zip_base64: &str,
    ) -> EngineResult<AsyncResponse> {
        log::info!("SendBillAsync {filename} -> {}", self.endpoint);
        let envelope =
            envelope::send_bill_async(&self.credentials, &self.endpoint, filename, zip_base64);
        let (status, body) = self
            .post_envelope(envelope::ACTION_SEND_BILL_ASYNC, envelope)
            .await?;

        if (400..500).contains(&status) {
            // 4xx is final; a fault body still yields a classified error.
            if let Some(fault) = response::parse_fault(&body) {
                return Ok(AsyncResponse {
                    success: false,
                    track_id: None,
                    error_code: fault.code,
                    error_message: Some(fault.reason),
                });
            }
            return Err(EngineError::Upstream(format!(
                "SendBillAsync rejected with HTTP {status}"
            )));
        }
        response::parse_send_bill(&body)
    }

    async fn get_status_zip(&self, track_id: &str) -> EngineResult<StatusZipResponse> {
        log::debug!("GetStatusZip {track_id}");
        let envelope = envelope::get_status_zip(&self.credentials, &self.endpoint, track_id);
        let (status, body) = self
            .post_envelope(envelope::ACTION_GET_STATUS_ZIP, envelope)
            .await?;
        if (400..500).contains(&status) {
            return Err(EngineError::Upstream(format!(
                "GetStatusZip rejected with HTTP {status}"
            )));
        }
        response::parse_get_status(&body, track_id)
    }
}
