//! Error types for the DIAN invoicing engine.
//! Closed taxonomy: every fallible operation returns one of these categories.

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error taxonomy for the invoicing engine
#[derive(Error, Debug, miette::Diagnostic)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoFailure),

    #[error("Security policy violation: {0}")]
    Security(#[from] SecurityFailure),

    #[error("XML signature error: {0}")]
    Sign(#[from] SignFailure),

    #[error("Upstream DIAN error: {0}")]
    Upstream(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Request authentication failures (maps to 401/403 at the API layer)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing authentication header: {0}")]
    Missing(String),

    #[error("malformed authentication header: {0}")]
    BadFormat(String),

    #[error("request timestamp outside acceptance window")]
    Expired,

    #[error("request signature already seen (replay)")]
    Replay,

    #[error("role does not permit this operation")]
    RoleDenied,

    #[error("unknown or inactive API key")]
    UnknownKey,

    #[error("request signature mismatch")]
    BadSignature,
}

/// Failures from the crypto primitives layer
#[derive(Error, Debug)]
pub enum CryptoFailure {
    #[error("authentication tag mismatch (ciphertext tampered or wrong key)")]
    AuthTagMismatch,

    #[error("internal crypto failure: {0}")]
    Internal(String),
}

/// Key-custody policy failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityFailure {
    #[error("master key operations require direct console access")]
    ConsoleOnly,

    #[error("key material rejected: {0}")]
    BadKeyMaterial(String),
}

/// XML digital signature failures
#[derive(Error, Debug)]
pub enum SignFailure {
    #[error("keystore unreadable: {0}")]
    KeystoreUnreadable(String),

    #[error("keystore alias not found: {0}")]
    AliasMissing(String),

    #[error("private key is not usable for RSA signing")]
    PrivateKeyUnusableForRsa,

    #[error("canonicalization failed: {0}")]
    CanonicalizationFailed(String),

    #[error("reference digest mismatch")]
    DigestMismatch,

    #[error("signature value did not verify")]
    SignatureInvalid,
}

impl From<openssl::error::ErrorStack> for CryptoFailure {
    fn from(error: openssl::error::ErrorStack) -> Self {
        CryptoFailure::Internal(error.to_string())
    }
}

impl From<openssl::error::ErrorStack> for EngineError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        EngineError::Crypto(CryptoFailure::Internal(error.to_string()))
    }
}

impl From<quick_xml::Error> for SignFailure {
    fn from(error: quick_xml::Error) -> Self {
        SignFailure::CanonicalizationFailed(error.to_string())
    }
}

impl EngineError {
    /// HTTP status class the API layer should map this error to.
    #[must_use]
    pub fn status_class(&self) -> u16 {
        match self {
            EngineError::Validation(_) | EngineError::BusinessRule(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::Conflict(_) => 409,
            EngineError::Auth(AuthFailure::RoleDenied) => 403,
            EngineError::Auth(_) => 401,
            EngineError::Upstream(_) => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EngineError::Upstream("DIAN timeout".to_string());
        assert_eq!(error.to_string(), "Upstream DIAN error: DIAN timeout");

        let error = EngineError::Auth(AuthFailure::Replay);
        assert!(error.to_string().contains("replay"));
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(EngineError::NotFound("x".into()).status_class(), 404);
        assert_eq!(EngineError::Auth(AuthFailure::Replay).status_class(), 401);
        assert_eq!(EngineError::Auth(AuthFailure::RoleDenied).status_class(), 403);
        assert_eq!(EngineError::Upstream("x".into()).status_class(), 502);
        assert_eq!(
            EngineError::Crypto(CryptoFailure::AuthTagMismatch).status_class(),
            500
        );
    }
}
