//! DIAN failure classification.
//!
//! DIAN rejections arrive as an error code plus free-form Spanish text.
//! Classification is two-stage: known codes first, then case-insensitive
//! substring search over the message. Every category carries canned
//! user-facing guidance and a retryability verdict.

use serde::{Deserialize, Serialize};

/// Closed set of rejection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    XmlStructure,
    Signature,
    CufeMismatch,
    Identification,
    Numbering,
    TaxCalculation,
    DateTime,
    Duplicate,
    Authorization,
    DianServiceError,
    Unknown,
}

impl ErrorCategory {
    /// True when resubmitting the same invoice can succeed without
    /// correcting its data.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Signature | ErrorCategory::CufeMismatch | ErrorCategory::DianServiceError
        )
    }
}

/// Actionable guidance attached to a rejected submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorGuidance {
    pub category: ErrorCategory,
    pub explanation: String,
    pub actions: Vec<String>,
    pub retryable: bool,
}

/// Classify a DIAN `(code, message)` pair.
#[must_use]
pub fn classify(code: Option<&str>, message: &str) -> ErrorGuidance {
    let category = by_code(code).unwrap_or_else(|| by_message(message));
    guidance(category)
}

fn by_code(code: Option<&str>) -> Option<ErrorCategory> {
    match code?.trim() {
        "99" => Some(ErrorCategory::DianServiceError),
        "FAD06" => Some(ErrorCategory::Duplicate),
        "FAB27b" => Some(ErrorCategory::Numbering),
        "FAJ43" | "FAJ44" => Some(ErrorCategory::CufeMismatch),
        "ZB01" | "ZB02" => Some(ErrorCategory::Signature),
        _ => None,
    }
}

fn by_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    const RULES: &[(&[&str], ErrorCategory)] = &[
        (&["firma", "signature", "certificado"], ErrorCategory::Signature),
        (&["cufe", "cude"], ErrorCategory::CufeMismatch),
        (&["nit", "identificacion", "documento de identidad"], ErrorCategory::Identification),
        (&["numeracion", "rango", "consecutivo", "prefijo"], ErrorCategory::Numbering),
        (&["impuesto", "iva", "tarifa", "base gravable"], ErrorCategory::TaxCalculation),
        (&["fecha", "hora"], ErrorCategory::DateTime),
        (&["duplicado", "ya fue registrado", "documento procesado"], ErrorCategory::Duplicate),
        (&["autorizacion", "habilitado", "no autorizado"], ErrorCategory::Authorization),
        (&["xml", "xsd", "esquema", "estructura"], ErrorCategory::XmlStructure),
        (&["servicio", "timeout", "intente", "no disponible"], ErrorCategory::DianServiceError),
    ];
    for (needles, category) in RULES {
        if needles.iter().any(|n| lower.contains(n)) {
            return *category;
        }
    }
    ErrorCategory::Unknown
}

fn guidance(category: ErrorCategory) -> ErrorGuidance {
    let (explanation, actions): (&str, &[&str]) = match category {
        ErrorCategory::XmlStructure => (
            "The UBL document does not conform to DIAN's XML schema.",
            &[
                "Regenerate the document from the stored invoice data",
                "Report the invoice id to support if regeneration fails validation again",
            ],
        ),
        ErrorCategory::Signature => (
            "DIAN could not validate the digital signature on the document.",
            &[
                "Check that the signing certificate has not expired",
                "Re-issue the invoice so it is signed with current credentials",
            ],
        ),
        ErrorCategory::CufeMismatch => (
            "The CUFE in the document does not match DIAN's recomputation.",
            &[
                "Verify the technical key configured for this numbering range",
                "Re-issue the invoice to regenerate the fingerprint",
            ],
        ),
        ErrorCategory::Identification => (
            "An issuer or customer identification was rejected.",
            &[
                "Confirm the tax id digits and the identification type code",
                "Correct the party record and create a new invoice",
            ],
        ),
        ErrorCategory::Numbering => (
            "The invoice number is outside the authorized numbering range.",
            &[
                "Check the DIAN resolution for the active prefix and range",
                "Correct the prefix or sequence and create a new invoice",
            ],
        ),
        ErrorCategory::TaxCalculation => (
            "Tax amounts or bases do not add up under DIAN's rules.",
            &[
                "Review line tax rates and rounding",
                "Correct the amounts and create a new invoice",
            ],
        ),
        ErrorCategory::DateTime => (
            "The issue date or time was rejected.",
            &[
                "Confirm the issue date is not in the future nor too far in the past",
                "Correct the dates and create a new invoice",
            ],
        ),
        ErrorCategory::Duplicate => (
            "DIAN has already processed a document with this identification.",
            &[
                "Query the invoice status before retrying",
                "Use the next number in the sequence for new documents",
            ],
        ),
        ErrorCategory::Authorization => (
            "The software or issuer is not authorized for this operation.",
            &[
                "Verify the software id and PIN registered with DIAN",
                "Check the issuer's habilitation status",
            ],
        ),
        ErrorCategory::DianServiceError => (
            "DIAN's validation service reported an internal problem.",
            &["Retry the submission later; the document itself is not at fault"],
        ),
        ErrorCategory::Unknown => (
            "DIAN rejected the document for an unrecognized reason.",
            &[
                "Read the verbatim DIAN message on the submission",
                "Contact support with the submission id",
            ],
        ),
    };
    ErrorGuidance {
        category,
        explanation: explanation.to_string(),
        actions: actions.iter().map(ToString::to_string).collect(),
        retryable: category.retryable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_wins_over_message() {
        let g = classify(Some("99"), "firma invalida");
        assert_eq!(g.category, ErrorCategory::DianServiceError);
        assert!(g.retryable);
    }

    #[test]
    fn message_fallback_is_case_insensitive() {
        let g = classify(None, "FIRMA invalida");
        assert_eq!(g.category, ErrorCategory::Signature);
        assert!(g.retryable);

        let g = classify(Some("not-a-known-code"), "Error en la NUMERACION del rango");
        assert_eq!(g.category, ErrorCategory::Numbering);
        assert!(!g.retryable);
    }

    #[test]
    fn duplicate_code_catalog_hit() {
        let g = classify(Some("FAD06"), "");
        assert_eq!(g.category, ErrorCategory::Duplicate);
        assert!(!g.retryable);
    }

    #[test]
    fn unknown_has_guidance_too() {
        let g = classify(None, "algo completamente inesperado");
        assert_eq!(g.category, ErrorCategory::Unknown);
        assert!(!g.retryable);
        assert!(!g.actions.is_empty());
        assert!(!g.explanation.is_empty());
    }

    #[test]
    fn retryable_set_is_exactly_three() {
        let all = [
            ErrorCategory::XmlStructure,
            ErrorCategory::Signature,
            ErrorCategory::CufeMismatch,
            ErrorCategory::Identification,
            ErrorCategory::Numbering,
            ErrorCategory::TaxCalculation,
            ErrorCategory::DateTime,
            ErrorCategory::Duplicate,
            ErrorCategory::Authorization,
            ErrorCategory::DianServiceError,
            ErrorCategory::Unknown,
        ];
        let retryable: Vec<_> = all.iter().filter(|c| c.retryable()).collect();
        assert_eq!(retryable.len(), 3);
    }
}
