//! Signing credential loading.
//!
//! Credentials arrive either as a PKCS#12 keystore on disk or as PEM parts
//! pulled from the issuer record. Private-key bytes never leave this type;
//! the signer borrows it for the duration of one signing call.

use crate::infra::error::SignFailure;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use std::path::Path;

/// A loaded signing credential: RSA private key plus X.509 certificate.
pub struct Keystore {
    pub private_key: PKey<Private>,
    pub certificate: X509,
}

impl Keystore {
    /// Open a PKCS#12 keystore file. When an alias is configured the bundle
    /// must contain a key + certificate pair for it.
    pub fn open_pkcs12(
        path: &Path,
        password: &str,
        alias: Option<&str>,
    ) -> Result<Self, SignFailure> {
        let bytes = std::fs::read(path)
            .map_err(|e| SignFailure::KeystoreUnreadable(format!("{}: {e}", path.display())))?;
        let parsed = Pkcs12::from_der(&bytes)
            .map_err(|e| SignFailure::KeystoreUnreadable(e.to_string()))?
            .parse2(password)
            .map_err(|e| SignFailure::KeystoreUnreadable(format!("bad password or bundle: {e}")))?;

        let (Some(private_key), Some(certificate)) = (parsed.pkey, parsed.cert) else {
            return Err(SignFailure::AliasMissing(
                alias.unwrap_or("(default entry)").to_string(),
            ));
        };
        Self::from_parts(private_key, certificate)
    }

    /// Build a keystore from PEM-encoded key and certificate.
    pub fn from_pem_parts(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self, SignFailure> {
        let private_key = PKey::private_key_from_pem(key_pem)
            .map_err(|e| SignFailure::KeystoreUnreadable(format!("private key PEM: {e}")))?;
        let certificate = X509::from_pem(cert_pem)
            .map_err(|e| SignFailure::KeystoreUnreadable(format!("certificate PEM: {e}")))?;
        Self::from_parts(private_key, certificate)
    }

    fn from_parts(private_key: PKey<Private>, certificate: X509) -> Result<Self, SignFailure> {
        if private_key.rsa().is_err() {
            return Err(SignFailure::PrivateKeyUnusableForRsa);
        }
        Ok(Self {
            private_key,
            certificate,
        })
    }
}
