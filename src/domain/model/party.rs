//! Commercial parties: issuer and customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Colombian identification document type, with DIAN's two-digit code set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdType {
    /// NIT (tax id)
    Nit,
    /// Cédula de ciudadanía
    Cc,
    /// Cédula de extranjería
    Ce,
    /// Passport
    Passport,
    /// Foreign identification document
    ForeignDoc,
    /// NIT of a foreign entity
    ForeignNit,
}

impl IdType {
    /// DIAN code for the identification type. Unknown inputs to
    /// [`IdType::from_label`] collapse to NIT, whose code is "31".
    #[must_use]
    pub fn dian_code(&self) -> &'static str {
        match self {
            IdType::Nit => "31",
            IdType::Cc => "13",
            IdType::Ce => "22",
            IdType::Passport => "41",
            IdType::ForeignDoc => "42",
            IdType::ForeignNit => "50",
        }
    }

    /// Parse an intake label. Unrecognized labels default to NIT.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "NIT" => IdType::Nit,
            "CC" => IdType::Cc,
            "CE" => IdType::Ce,
            "PA" | "PASSPORT" => IdType::Passport,
            "DIE" | "FOREIGN_DOC" => IdType::ForeignDoc,
            "NIT_EXT" | "FOREIGN_NIT" => IdType::ForeignNit,
            _ => IdType::Nit,
        }
    }
}

/// Invoice issuer. Carries the signing credential, sealed at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    pub id: Uuid,
    /// Tax id as registered, possibly with punctuation or a check digit.
    pub nit: String,
    pub legal_name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    /// X.509 credential PEM, sealed under the master key.
    pub certificate_blob: Option<String>,
    pub certificate_expiry: Option<DateTime<Utc>>,
}

impl Issuer {
    /// Tax id stripped to digits only, without the check digit when one is
    /// attached with a dash (e.g. "900.123.456-7" -> "900123456").
    #[must_use]
    pub fn nit_digits(&self) -> String {
        let base = self.nit.split('-').next().unwrap_or(&self.nit);
        base.chars().filter(char::is_ascii_digit).collect()
    }
}

/// Invoice customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub id_type: IdType,
    pub id_number: String,
    pub legal_name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
}
