//! UBL 2.1 document assembly for DIAN.

pub mod builder;

pub use builder::{build, UblDocument};

/// Namespace bindings, all declared on the root element only so the
/// signer's canonicalization stays stable.
pub mod ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
    pub const EXT: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
    pub const STS: &str = "dian:gov:co:facturaelectronica:Structures-2-1";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
}
