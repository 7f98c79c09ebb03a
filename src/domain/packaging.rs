//! ZIP packaging for DIAN transport.
//!
//! DIAN receives one ZIP per document with a single XML entry inside,
//! base64-encoded into the SOAP body. Both filenames follow fixed naming
//! conventions that DIAN validates.

use crate::domain::model::DocumentType;
use crate::infra::error::{CryptoFailure, EngineError, EngineResult};
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{Datelike, Timelike, Utc};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A packaged document ready for `SendBillAsync`.
#[derive(Debug, Clone)]
pub struct ZipPackage {
    /// Archive filename DIAN sees, e.g. `z90012345601202600000000001.zip`.
    pub archive_name: String,
    /// XML entry name inside the archive, e.g. `face_fSETT1.xml`.
    pub inner_name: String,
    /// Standard base64 (with padding) of the ZIP bytes.
    pub zip_base64: String,
}

/// `z{nit_digits}{doc_code}{year}{seq:010}.zip`
#[must_use]
pub fn archive_name(nit_digits: &str, document_type: DocumentType, year: i32, sequence: i64) -> String {
    format!(
        "z{nit_digits}{}{year:04}{sequence:010}.zip",
        document_type.dian_code()
    )
}

/// `face_f{prefix}{number}.xml`
#[must_use]
pub fn inner_xml_name(document_id: &str) -> String {
    format!("face_f{document_id}.xml")
}

/// Deflate `xml` into a single-entry ZIP and base64 it for SOAP transport.
pub fn package_to_zip(xml: &str, archive_name: String, inner_name: String) -> EngineResult<ZipPackage> {
    let now = Utc::now();
    let mtime = zip::DateTime::from_date_and_time(
        u16::try_from(now.year()).unwrap_or(1980),
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .map_err(|e| internal(format!("zip mtime: {e}")))?;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(mtime);
        writer
            .start_file(inner_name.as_str(), options)
            .map_err(|e| internal(format!("zip entry: {e}")))?;
        writer
            .write_all(xml.as_bytes())
            .map_err(|e| internal(format!("zip write: {e}")))?;
        writer
            .finish()
            .map_err(|e| internal(format!("zip finish: {e}")))?;
    }

    Ok(ZipPackage {
        archive_name,
        inner_name,
        zip_base64: general_purpose::STANDARD.encode(cursor.into_inner()),
    })
}

/// Peel the first `.xml` entry (case-insensitive) out of a base64 ZIP.
/// Used for DIAN's ApplicationResponse payloads.
pub fn extract_xml_from_zip(zip_base64: &str) -> EngineResult<String> {
    let bytes = general_purpose::STANDARD
        .decode(zip_base64.trim())
        .map_err(|e| EngineError::Validation(format!("payload is not valid base64: {e}")))?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Validation(format!("payload is not a ZIP archive: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| EngineError::Validation(format!("unreadable ZIP entry: {e}")))?;
        if entry.name().to_ascii_lowercase().ends_with(".xml") {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| EngineError::Validation(format!("ZIP entry is not UTF-8: {e}")))?;
            return Ok(content);
        }
    }
    Err(EngineError::Validation(
        "ZIP archive holds no .xml entry".to_string(),
    ))
}

fn internal(message: String) -> EngineError {
    EngineError::Crypto(CryptoFailure::Internal(message))
}
