//! Enveloped XML digital signatures (XAdES-EPES profile) for UBL documents.

pub mod keystore;
pub mod signer;
pub mod verifier;

pub use keystore::Keystore;
pub use signer::sign_xml;
pub use verifier::{verify_signed_xml, VerificationReport};

/// Algorithm URIs for the DIAN signature profile.
pub mod algorithms {
    /// Canonical XML 1.0, comments omitted.
    pub const C14N_10: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

use crate::infra::error::SignFailure;
use xml_c14n::{canonicalize_xml, CanonicalizationMode, CanonicalizationOptions};

/// Canonical XML 1.0 without comments, as both reference digests and the
/// SignedInfo signature require.
pub(crate) fn c14n(xml: &str) -> Result<String, SignFailure> {
    let options = CanonicalizationOptions {
        mode: CanonicalizationMode::Canonical1_0,
        keep_comments: false,
        inclusive_ns_prefixes: vec![],
    };
    canonicalize_xml(xml, options).map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))
}
