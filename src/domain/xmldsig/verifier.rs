//! Enveloped signature verification.
//!
//! The inverse of the signer: extract the lone `ds:Signature`, recompute the
//! reference digest with the signature removed, and check the SignedInfo
//! signature under the embedded certificate.

use crate::domain::crypto::sha256;
use crate::domain::xmldsig::c14n;
use crate::infra::error::SignFailure;
use base64::engine::general_purpose;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::x509::X509;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

/// Outcome of verifying a signed document. Success requires both checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Recomputed reference digest matches `ds:DigestValue`.
    pub digest_ok: bool,
    /// `ds:SignatureValue` verifies over canonical SignedInfo.
    pub signature_ok: bool,
}

impl VerificationReport {
    #[must_use]
    pub fn success(&self) -> bool {
        self.digest_ok && self.signature_ok
    }
}

/// Pieces pulled out of the signed document in one streaming pass.
struct ExtractedSignature {
    signed_info_xml: String,
    digest_value: String,
    signature_value: String,
    certificate_b64: String,
    document_without_signature: String,
}

/// Verify an enveloped signature produced by [`super::sign_xml`].
pub fn verify_signed_xml(xml: &str) -> Result<VerificationReport, SignFailure> {
    let extracted = extract(xml)?;

    let certificate_der = general_purpose::STANDARD
        .decode(extracted.certificate_b64.trim())
        .map_err(|_| SignFailure::SignatureInvalid)?;
    let certificate = X509::from_der(&certificate_der).map_err(|_| SignFailure::SignatureInvalid)?;

    let canonical_doc = c14n(&extracted.document_without_signature)?;
    let recomputed = general_purpose::STANDARD.encode(sha256(canonical_doc.as_bytes()));
    let digest_ok = recomputed == extracted.digest_value.trim();

    let canonical_signed_info = c14n(&extracted.signed_info_xml)?;
    let signature = general_purpose::STANDARD
        .decode(extracted.signature_value.trim())
        .map_err(|_| SignFailure::SignatureInvalid)?;
    let public_key = certificate
        .public_key()
        .map_err(|_| SignFailure::SignatureInvalid)?;
    let mut verifier = openssl::sign::Verifier::new(MessageDigest::sha256(), &public_key)
        .map_err(|_| SignFailure::SignatureInvalid)?;
    verifier
        .update(canonical_signed_info.as_bytes())
        .map_err(|_| SignFailure::SignatureInvalid)?;
    let signature_ok = verifier.verify(&signature).unwrap_or(false);

    Ok(VerificationReport {
        digest_ok,
        signature_ok,
    })
}

/// One pass over the document: capture the SignedInfo subtree, the three
/// text values, and the document with the whole Signature subtree removed
/// (the enveloped transform).
fn extract(xml: &str) -> Result<ExtractedSignature, SignFailure> {
    let mut reader = Reader::from_str(xml);
    let mut doc_writer = Writer::new(Vec::new());
    let mut signed_info_writer = Writer::new(Vec::new());

    let mut signature_depth = 0usize;
    let mut signed_info_depth = 0usize;
    let mut saw_signature = false;
    let mut capture: Option<&'static str> = None;
    let mut digest_value = String::new();
    let mut signature_value = String::new();
    let mut certificate_b64 = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Eof => break,
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"Signature" && signature_depth == 0 {
                    signature_depth = 1;
                    saw_signature = true;
                } else if signature_depth > 0 {
                    signature_depth += 1;
                    if local == b"SignedInfo" && signed_info_depth == 0 {
                        signed_info_depth = 1;
                    } else if signed_info_depth > 0 {
                        signed_info_depth += 1;
                    }
                    capture = match local.as_slice() {
                        b"DigestValue" => Some("digest"),
                        b"SignatureValue" => Some("signature"),
                        b"X509Certificate" => Some("certificate"),
                        _ => None,
                    };
                }
            }
            Event::End(_) => {
                if signature_depth > 0 {
                    capture = None;
                }
            }
            _ => {}
        }

        // Route the event to the right sinks.
        match event {
            Event::Eof => unreachable!(),
            Event::Start(e) => {
                if signed_info_depth > 0 {
                    signed_info_writer
                        .write_event(Event::Start(e.to_owned()))
                        .map_err(write_err)?;
                } else if signature_depth == 0 {
                    doc_writer
                        .write_event(Event::Start(e.to_owned()))
                        .map_err(write_err)?;
                }
            }
            Event::End(e) => {
                if signed_info_depth > 0 {
                    signed_info_writer
                        .write_event(Event::End(e.to_owned()))
                        .map_err(write_err)?;
                    signed_info_depth -= 1;
                }
                if signature_depth > 0 {
                    signature_depth -= 1;
                } else {
                    doc_writer
                        .write_event(Event::End(e.to_owned()))
                        .map_err(write_err)?;
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))?;
                match capture {
                    Some("digest") => digest_value.push_str(&text),
                    Some("signature") => signature_value.push_str(&text),
                    Some("certificate") => certificate_b64.push_str(&text),
                    _ => {}
                }
                if signed_info_depth > 0 {
                    signed_info_writer
                        .write_event(Event::Text(t.to_owned()))
                        .map_err(write_err)?;
                } else if signature_depth == 0 {
                    doc_writer
                        .write_event(Event::Text(t.to_owned()))
                        .map_err(write_err)?;
                }
            }
            other => {
                if signed_info_depth > 0 {
                    signed_info_writer
                        .write_event(other.into_owned())
                        .map_err(write_err)?;
                } else if signature_depth == 0 {
                    doc_writer
                        .write_event(other.into_owned())
                        .map_err(write_err)?;
                }
            }
        }
    }

    if !saw_signature {
        return Err(SignFailure::SignatureInvalid);
    }

    let signed_info_xml = String::from_utf8(signed_info_writer.into_inner())
        .map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))?;
    let document_without_signature = String::from_utf8(doc_writer.into_inner())
        .map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))?;

    if signed_info_xml.is_empty() || signature_value.is_empty() || certificate_b64.is_empty() {
        return Err(SignFailure::SignatureInvalid);
    }

    Ok(ExtractedSignature {
        signed_info_xml,
        digest_value,
        signature_value,
        certificate_b64,
        document_without_signature,
    })
}

fn write_err<E: std::fmt::Display>(e: E) -> SignFailure {
    SignFailure::CanonicalizationFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::xmldsig::signer::sign_xml;
    use crate::domain::xmldsig::test_support::test_keystore;

    #[test]
    fn unsigned_document_is_an_error() {
        let err = verify_signed_xml("<Invoice xmlns=\"urn:test\"><A>1</A></Invoice>")
            .err()
            .unwrap();
        assert!(matches!(err, SignFailure::SignatureInvalid));
    }

    #[test]
    fn report_success_requires_both_checks() {
        let ok = VerificationReport {
            digest_ok: true,
            signature_ok: true,
        };
        assert!(ok.success());
        let half = VerificationReport {
            digest_ok: true,
            signature_ok: false,
        };
        assert!(!half.success());
    }

    #[test]
    fn verifies_freshly_signed_document() {
        let ks = test_keystore();
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <Invoice xmlns=\"urn:test\" xmlns:ext=\"urn:ext\">\
            <ext:UBLExtensions><ext:UBLExtension>\
            <ext:ExtensionContent></ext:ExtensionContent>\
            </ext:UBLExtension></ext:UBLExtensions>\
            <Total>42</Total></Invoice>";
        let signed = sign_xml(xml, &ks).unwrap();
        assert!(verify_signed_xml(&signed).unwrap().success());
    }
}
