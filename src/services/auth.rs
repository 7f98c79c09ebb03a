//! Request authentication: signed headers, timestamp window, replay set,
//! key lookup and role check, in that order.

use crate::adapters::store::EngineStore;
use crate::domain::crypto::{constant_time_eq, sha512_hex};
use crate::domain::model::{Capability, RequestSignature, Role};
use crate::infra::error::{AuthFailure, EngineResult};
use chrono::{DateTime, Duration, Utc};

pub const HEADER_API_KEY: &str = "X-Tinto-API-Key";
pub const HEADER_SIGNATURE: &str = "X-Tinto-Signature";
pub const HEADER_TIMESTAMP: &str = "X-Tinto-Timestamp";

/// Requests older than this are rejected; replay records beyond it are
/// prunable.
#[must_use]
pub fn max_request_age() -> Duration {
    Duration::minutes(5)
}

/// Small positive window absorbing clock skew.
#[must_use]
pub fn max_clock_skew() -> Duration {
    Duration::minutes(1)
}

/// The three authentication headers as the transport handed them over.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthHeaders<'a> {
    pub api_key: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
}

/// Identity attached to the request after successful validation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub key_name: String,
    pub key_fingerprint: String,
    pub role: Role,
}

/// Validate an authenticated request. All five checks must hold.
pub fn validate<S: EngineStore + ?Sized>(
    store: &S,
    headers: AuthHeaders<'_>,
    method: &str,
    path: &str,
    body: &str,
    capability: Capability,
    now: DateTime<Utc>,
) -> EngineResult<AuthContext> {
    let api_key = headers
        .api_key
        .ok_or(AuthFailure::Missing(HEADER_API_KEY.to_string()))?;
    let signature = headers
        .signature
        .ok_or(AuthFailure::Missing(HEADER_SIGNATURE.to_string()))?;
    let timestamp = headers
        .timestamp
        .ok_or(AuthFailure::Missing(HEADER_TIMESTAMP.to_string()))?;

    // V1: timestamp parses and sits inside the acceptance window.
    let requested_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| AuthFailure::BadFormat(HEADER_TIMESTAMP.to_string()))?
        .with_timezone(&Utc);
    if requested_at < now - max_request_age() || requested_at > now + max_clock_skew() {
        return Err(AuthFailure::Expired.into());
    }

    // V2: signature over key, method, path, timestamp and body.
    let expected = sha512_hex(
        format!("{api_key}:{method}:{path}:{timestamp}:{body}").as_bytes(),
    );
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(AuthFailure::BadSignature.into());
    }

    let fingerprint = sha512_hex(api_key.as_bytes());

    // V3: (signature, timestamp) must be fresh; insert-if-absent is atomic.
    let inserted = store.record_request_signature(RequestSignature {
        api_key_fingerprint: fingerprint.clone(),
        signature: signature.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        requested_at,
    })?;
    if !inserted {
        return Err(AuthFailure::Replay.into());
    }

    // V4: the key must exist, be active and unexpired.
    let key = store
        .api_key_by_fingerprint(&fingerprint)?
        .ok_or(AuthFailure::UnknownKey)?;
    if !key.is_usable(now) {
        return Err(AuthFailure::UnknownKey.into());
    }

    // V5: role capability table.
    if !key.role.permits(capability) {
        return Err(AuthFailure::RoleDenied.into());
    }

    store.touch_api_key(&fingerprint, now)?;
    log::debug!("authenticated key '{}' for {method} {path}", key.name);
    Ok(AuthContext {
        key_name: key.name,
        key_fingerprint: fingerprint,
        role: key.role,
    })
}

/// Compute the signature a client must send. Shared with the CLI and tests.
#[must_use]
pub fn sign_request(api_key: &str, method: &str, path: &str, timestamp: &str, body: &str) -> String {
    sha512_hex(format!("{api_key}:{method}:{path}:{timestamp}:{body}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::domain::crypto::random_bytes;
    use crate::domain::model::Role;
    use crate::services::custody::{derive_api_key, MasterKey};
    use crate::infra::error::EngineError;

    fn setup(role: Role) -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let master = MasterKey::from_material(&random_bytes(32)).unwrap();
        let issued = derive_api_key(&master, "test-key", role, None, Utc::now()).unwrap();
        store.insert_api_key(issued.record).unwrap();
        (store, issued.raw_secret)
    }

    fn headers<'a>(key: &'a str, signature: &'a str, timestamp: &'a str) -> AuthHeaders<'a> {
        AuthHeaders {
            api_key: Some(key),
            signature: Some(signature),
            timestamp: Some(timestamp),
        }
    }

    #[test]
    fn valid_request_passes() {
        let (store, secret) = setup(Role::Operator);
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let sig = sign_request(&secret, "GET", "/v1/invoices", &ts, "");
        let ctx = validate(
            &store,
            headers(&secret, &sig, &ts),
            "GET",
            "/v1/invoices",
            "",
            Capability::ReadInvoices,
            now,
        )
        .unwrap();
        assert_eq!(ctx.role, Role::Operator);
        assert_eq!(ctx.key_name, "test-key");
    }

    #[test]
    fn missing_header_is_named() {
        let (store, _) = setup(Role::Operator);
        let err = validate(
            &store,
            AuthHeaders::default(),
            "GET",
            "/v1/invoices",
            "",
            Capability::ReadInvoices,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Auth(AuthFailure::Missing(ref h)) if h == HEADER_API_KEY
        ));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let (store, secret) = setup(Role::Operator);
        let now = Utc::now();
        let stale = (now - Duration::minutes(6)).to_rfc3339();
        let sig = sign_request(&secret, "GET", "/v1/invoices", &stale, "");
        let err = validate(
            &store,
            headers(&secret, &sig, &stale),
            "GET",
            "/v1/invoices",
            "",
            Capability::ReadInvoices,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthFailure::Expired)));
    }

    #[test]
    fn future_timestamp_within_skew_is_accepted() {
        let (store, secret) = setup(Role::Operator);
        let now = Utc::now();
        let ahead = (now + Duration::seconds(30)).to_rfc3339();
        let sig = sign_request(&secret, "GET", "/v1/invoices", &ahead, "");
        validate(
            &store,
            headers(&secret, &sig, &ahead),
            "GET",
            "/v1/invoices",
            "",
            Capability::ReadInvoices,
            now,
        )
        .unwrap();
    }

    #[test]
    fn tampered_body_fails_signature() {
        let (store, secret) = setup(Role::Operator);
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let sig = sign_request(&secret, "POST", "/v1/invoices", &ts, "{\"a\":1}");
        let err = validate(
            &store,
            headers(&secret, &sig, &ts),
            "POST",
            "/v1/invoices",
            "{\"a\":2}",
            Capability::CreateInvoice,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthFailure::BadSignature)));
    }

    #[test]
    fn replay_fails_second_time() {
        let (store, secret) = setup(Role::Operator);
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let sig = sign_request(&secret, "GET", "/v1/invoices/abc", &ts, "");
        let h = headers(&secret, &sig, &ts);
        validate(&store, h, "GET", "/v1/invoices/abc", "", Capability::ReadInvoices, now).unwrap();
        let err = validate(
            &store,
            h,
            "GET",
            "/v1/invoices/abc",
            "",
            Capability::ReadInvoices,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthFailure::Replay)));
    }

    #[test]
    fn unknown_key_rejected() {
        let (store, _) = setup(Role::Operator);
        let rogue = "f".repeat(64);
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let sig = sign_request(&rogue, "GET", "/v1/invoices", &ts, "");
        let err = validate(
            &store,
            headers(&rogue, &sig, &ts),
            "GET",
            "/v1/invoices",
            "",
            Capability::ReadInvoices,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthFailure::UnknownKey)));
    }

    #[test]
    fn auditor_cannot_issue() {
        let (store, secret) = setup(Role::Auditor);
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let path = "/v1/invoices/abc/issue";
        let sig = sign_request(&secret, "POST", path, &ts, "");
        let err = validate(
            &store,
            headers(&secret, &sig, &ts),
            "POST",
            path,
            "",
            Capability::IssueToDian,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthFailure::RoleDenied)));
    }
}
