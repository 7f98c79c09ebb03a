//! Enveloped signature creation.
//!
//! The signature lands inside the first empty `ext:ExtensionContent` slot.
//! Serialization is event-for-event, never pretty-printed: any whitespace
//! introduced after signing would invalidate the reference digest.

use crate::domain::crypto::sha256;
use crate::domain::xmldsig::keystore::Keystore;
use crate::domain::xmldsig::{algorithms, c14n};
use crate::infra::error::SignFailure;
use base64::engine::general_purpose;
use base64::Engine;
use openssl::hash::MessageDigest;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

/// Sign an XML document, returning it with the `ds:Signature` embedded.
pub fn sign_xml(xml: &str, keystore: &Keystore) -> Result<String, SignFailure> {
    let prepared = ensure_signature_slot(xml)?;

    // Reference digest over the whole document; the enveloped transform is
    // the identity here because no signature exists yet.
    let canonical_doc = c14n(&prepared)?;
    let doc_digest = general_purpose::STANDARD.encode(sha256(canonical_doc.as_bytes()));

    let signed_info = build_signed_info(&doc_digest);
    let canonical_signed_info = c14n(&signed_info)?;

    let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &keystore.private_key)
        .map_err(|_| SignFailure::PrivateKeyUnusableForRsa)?;
    signer
        .update(canonical_signed_info.as_bytes())
        .map_err(|_| SignFailure::PrivateKeyUnusableForRsa)?;
    let signature = signer
        .sign_to_vec()
        .map_err(|_| SignFailure::PrivateKeyUnusableForRsa)?;
    let signature_b64 = general_purpose::STANDARD.encode(signature);

    let cert_der = keystore
        .certificate
        .to_der()
        .map_err(|e| SignFailure::KeystoreUnreadable(e.to_string()))?;
    let cert_b64 = general_purpose::STANDARD.encode(cert_der);

    let ds_signature = format!(
        "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\" Id=\"signature-1\">\
         {signed_info}\
         <ds:SignatureValue>{signature_b64}</ds:SignatureValue>\
         <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert_b64}</ds:X509Certificate>\
         </ds:X509Data></ds:KeyInfo>\
         </ds:Signature>"
    );

    inject_into_slot(&prepared, &ds_signature)
}

/// SignedInfo with its namespace bound inline so it canonicalizes the same
/// standalone (during signing) and extracted (during verification).
fn build_signed_info(doc_digest_b64: &str) -> String {
    format!(
        "<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
         <ds:CanonicalizationMethod Algorithm=\"{c14n}\"></ds:CanonicalizationMethod>\
         <ds:SignatureMethod Algorithm=\"{rsa}\"></ds:SignatureMethod>\
         <ds:Reference URI=\"\">\
         <ds:Transforms><ds:Transform Algorithm=\"{env}\"></ds:Transform></ds:Transforms>\
         <ds:DigestMethod Algorithm=\"{sha}\"></ds:DigestMethod>\
         <ds:DigestValue>{digest}</ds:DigestValue>\
         </ds:Reference>\
         </ds:SignedInfo>",
        c14n = algorithms::C14N_10,
        rsa = algorithms::RSA_SHA256,
        env = algorithms::ENVELOPED_SIGNATURE,
        sha = algorithms::SHA256,
        digest = doc_digest_b64,
    )
}

/// Return the document with a guaranteed empty `ext:ExtensionContent` slot,
/// creating the UBLExtensions chain as first child of the root if absent.
fn ensure_signature_slot(xml: &str) -> Result<String, SignFailure> {
    if find_empty_slot(xml)? {
        return Ok(xml.to_string());
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut injected = false;
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                let is_root = !injected;
                writer.write_event(Event::Start(e)).map_err(write_err)?;
                if is_root {
                    let chain = "<ext:UBLExtensions><ext:UBLExtension>\
                                 <ext:ExtensionContent></ext:ExtensionContent>\
                                 </ext:UBLExtension></ext:UBLExtensions>";
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(chain)))
                        .map_err(write_err)?;
                    injected = true;
                }
            }
            event => writer.write_event(event).map_err(write_err)?,
        }
    }
    String::from_utf8(writer.into_inner())
        .map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))
}

/// True when the document holds an empty ExtensionContent pair.
fn find_empty_slot(xml: &str) -> Result<bool, SignFailure> {
    let mut reader = Reader::from_str(xml);
    let mut last_was_slot_start = false;
    loop {
        match reader.read_event()? {
            Event::Eof => return Ok(false),
            Event::Start(e) => {
                last_was_slot_start = e.local_name().as_ref() == b"ExtensionContent";
            }
            Event::End(e) => {
                if last_was_slot_start && e.local_name().as_ref() == b"ExtensionContent" {
                    return Ok(true);
                }
                last_was_slot_start = false;
            }
            Event::Text(ref t) if t.iter().all(u8::is_ascii_whitespace) => {}
            _ => last_was_slot_start = false,
        }
    }
}

/// Splice raw signature XML into the first empty ExtensionContent pair.
fn inject_into_slot(xml: &str, raw_signature: &str) -> Result<String, SignFailure> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut injected = false;
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if !injected && e.local_name().as_ref() == b"ExtensionContent" => {
                // Peek: only an immediately-closed pair is the reserved slot.
                let next = reader.read_event()?.into_owned();
                writer
                    .write_event(Event::Start(e.into_owned()))
                    .map_err(write_err)?;
                if matches!(&next, Event::End(end) if end.local_name().as_ref() == b"ExtensionContent")
                {
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(raw_signature)))
                        .map_err(write_err)?;
                    injected = true;
                }
                writer.write_event(next).map_err(write_err)?;
            }
            event => writer.write_event(event).map_err(write_err)?,
        }
    }
    if !injected {
        return Err(SignFailure::CanonicalizationFailed(
            "no reserved extension slot to hold the signature".to_string(),
        ));
    }
    String::from_utf8(writer.into_inner())
        .map_err(|e| SignFailure::CanonicalizationFailed(e.to_string()))
}

fn write_err<E: std::fmt::Display>(e: E) -> SignFailure {
    SignFailure::CanonicalizationFailed(e.to_string())
}
