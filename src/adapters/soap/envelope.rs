//! SOAP 1.2 envelope assembly with WS-Security UsernameToken.

use crate::domain::crypto::{random_bytes, sha256_hex};
use base64::engine::general_purpose;
use base64::Engine;
use chrono::Utc;

pub const ACTION_SEND_BILL_ASYNC: &str =
    "http://wcf.dian.colombia/IWcfDianCustomerServices/SendBillAsync";
pub const ACTION_GET_STATUS_ZIP: &str =
    "http://wcf.dian.colombia/IWcfDianCustomerServices/GetStatusZip";

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_WSA: &str = "http://www.w3.org/2005/08/addressing";
const NS_WCF: &str = "http://wcf.dian.colombia";
const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
const NONCE_B64: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// WS-Security credentials: DIAN authenticates the software, not a user.
#[derive(Debug, Clone)]
pub struct SoapCredentials {
    pub software_id: String,
    pub software_pin: String,
}

impl SoapCredentials {
    /// `SHA-256(SoftwarePIN || SoftwareID)` as hex text.
    #[must_use]
    fn password_digest(&self) -> String {
        sha256_hex(format!("{}{}", self.software_pin, self.software_id).as_bytes())
    }
}

/// Envelope for `SendBillAsync(fileName, contentFile)`.
#[must_use]
pub fn send_bill_async(credentials: &SoapCredentials, endpoint: &str, filename: &str, zip_base64: &str) -> String {
    let body = format!(
        "<wcf:SendBillAsync><wcf:fileName>{}</wcf:fileName>\
         <wcf:contentFile>{}</wcf:contentFile></wcf:SendBillAsync>",
        escape_text(filename),
        zip_base64,
    );
    wrap(credentials, endpoint, ACTION_SEND_BILL_ASYNC, &body)
}

/// Envelope for `GetStatusZip(trackId)`.
#[must_use]
pub fn get_status_zip(credentials: &SoapCredentials, endpoint: &str, track_id: &str) -> String {
    let body = format!(
        "<wcf:GetStatusZip><wcf:trackId>{}</wcf:trackId></wcf:GetStatusZip>",
        escape_text(track_id),
    );
    wrap(credentials, endpoint, ACTION_GET_STATUS_ZIP, &body)
}

fn wrap(credentials: &SoapCredentials, endpoint: &str, action: &str, body: &str) -> String {
    let nonce = general_purpose::STANDARD.encode(random_bytes(16));
    let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soap:Envelope xmlns:soap=\"{NS_SOAP}\" xmlns:wsa=\"{NS_WSA}\" xmlns:wcf=\"{NS_WCF}\">\
         <soap:Header>\
         <wsse:Security xmlns:wsse=\"{NS_WSSE}\" xmlns:wsu=\"{NS_WSU}\" soap:mustUnderstand=\"true\">\
         <wsse:UsernameToken wsu:Id=\"UsernameToken-1\">\
         <wsse:Username>{username}</wsse:Username>\
         <wsse:Password Type=\"{PASSWORD_TEXT}\">{password}</wsse:Password>\
         <wsse:Nonce EncodingType=\"{NONCE_B64}\">{nonce}</wsse:Nonce>\
         <wsu:Created>{created}</wsu:Created>\
         </wsse:UsernameToken>\
         </wsse:Security>\
         <wsa:Action>{action}</wsa:Action>\
         <wsa:To>{endpoint}</wsa:To>\
         </soap:Header>\
         <soap:Body>{body}</soap:Body>\
         </soap:Envelope>",
        username = escape_text(&credentials.software_id),
        password = credentials.password_digest(),
        endpoint = escape_text(endpoint),
    )
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
