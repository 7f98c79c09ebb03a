//! Key custody: master-key loading and API-key derivation.
//!
//! The master key is the single root credential. It is loaded once at
//! startup, only from a local console session, and never persisted or
//! transmitted in plaintext. Every API key is derived from it and can be
//! recreated for audit, but the raw secret is surfaced exactly once.

use crate::domain::crypto::{cipher, sha512_hex};
use crate::domain::model::{ApiKey, Role};
use crate::infra::config::{EngineConfig, ENV_CONSOLE_ACCESS, ENV_SYSTEM_KEY};
use crate::infra::error::{EngineError, EngineResult, SecurityFailure};
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::fmt;

/// The process-wide root credential. Immutable after load.
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; 32],
}

// Never let key material reach logs.
impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

impl MasterKey {
    /// Load the master key per the console-only policy.
    ///
    /// The console discriminator is checked before any filesystem access so
    /// a remote invocation leaves no trace of the key file path being read.
    pub fn load(config: &EngineConfig) -> EngineResult<Self> {
        if std::env::var(ENV_CONSOLE_ACCESS).map_or(true, |v| v.trim().is_empty()) {
            return Err(EngineError::Security(SecurityFailure::ConsoleOnly));
        }

        let system_key = system_key_from_env()?;
        let sealed = std::fs::read_to_string(&config.master_key_file).map_err(|e| {
            EngineError::Security(SecurityFailure::BadKeyMaterial(format!(
                "master key file {}: {e}",
                config.master_key_file.display()
            )))
        })?;
        let material = cipher::open(&system_key, sealed.trim())
            .map_err(|_| EngineError::Security(SecurityFailure::BadKeyMaterial(
                "master key file failed to decrypt under the system key".to_string(),
            )))?;
        Self::from_material(&material)
    }

    /// Wrap raw 32-byte material (tests and provisioning).
    pub fn from_material(material: &[u8]) -> EngineResult<Self> {
        let key: [u8; 32] = material.try_into().map_err(|_| {
            EngineError::Security(SecurityFailure::BadKeyMaterial(format!(
                "expected 32 bytes of key material, got {}",
                material.len()
            )))
        })?;
        Ok(Self { key })
    }

    #[must_use]
    pub fn material(&self) -> &[u8; 32] {
        &self.key
    }

    /// Seal arbitrary plaintext under this key.
    pub fn seal(&self, plaintext: &[u8]) -> EngineResult<String> {
        Ok(cipher::seal(&self.key, plaintext)?)
    }

    /// Open a blob sealed with [`MasterKey::seal`].
    pub fn open(&self, blob: &str) -> EngineResult<Vec<u8>> {
        Ok(cipher::open(&self.key, blob)?)
    }

    pub fn open_string(&self, blob: &str) -> EngineResult<String> {
        Ok(cipher::open_string(&self.key, blob)?)
    }
}

/// Produce the sealed file content for a fresh master key. Used by the
/// provisioning CLI; the inverse of [`MasterKey::load`]'s decryption step.
pub fn seal_master_key_file(system_key: &[u8; 32], master_material: &[u8; 32]) -> EngineResult<String> {
    Ok(cipher::seal(system_key, master_material)?)
}

fn system_key_from_env() -> EngineResult<[u8; 32]> {
    let b64 = std::env::var(ENV_SYSTEM_KEY).map_err(|_| {
        EngineError::Security(SecurityFailure::BadKeyMaterial(format!(
            "missing {ENV_SYSTEM_KEY}"
        )))
    })?;
    let bytes = general_purpose::STANDARD.decode(b64.trim()).map_err(|e| {
        EngineError::Security(SecurityFailure::BadKeyMaterial(format!(
            "{ENV_SYSTEM_KEY} is not base64: {e}"
        )))
    })?;
    bytes.as_slice().try_into().map_err(|_| {
        EngineError::Security(SecurityFailure::BadKeyMaterial(format!(
            "{ENV_SYSTEM_KEY} must decode to 32 bytes, got {}",
            bytes.len()
        )))
    })
}

/// A freshly derived key with its one-time plaintext secret.
pub struct IssuedApiKey {
    pub record: ApiKey,
    /// Surfaced exactly once; never recoverable from the record alone
    /// without the master key.
    pub raw_secret: String,
}

/// Derive a new API key from the master key.
///
/// Raw secret: first 64 hex chars of
/// `SHA-512(master || ":" || name || ":" || role || ":" || epoch_ms)`.
/// Stored fingerprint: `SHA-512(raw)`.
pub fn derive_api_key(
    master: &MasterKey,
    name: &str,
    role: Role,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> EngineResult<IssuedApiKey> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("API key name must not be empty".into()));
    }

    let epoch_ms = now.timestamp_millis();
    let mut input = Vec::with_capacity(64 + name.len() + 16);
    input.extend_from_slice(master.material());
    input.push(b':');
    input.extend_from_slice(name.as_bytes());
    input.push(b':');
    input.extend_from_slice(role.as_str().as_bytes());
    input.push(b':');
    input.extend_from_slice(epoch_ms.to_string().as_bytes());

    let raw_secret = sha512_hex(&input)[..64].to_string();
    let fingerprint = sha512_hex(raw_secret.as_bytes());
    let secret_blob = master.seal(raw_secret.as_bytes())?;

    log::info!("derived API key '{name}' with role {}", role.as_str());
    Ok(IssuedApiKey {
        record: ApiKey {
            name: name.to_string(),
            role,
            fingerprint,
            secret_blob,
            expires_at,
            last_used_at: None,
            active: true,
            created_at: now,
        },
        raw_secret,
    })
}
