//! Document pipeline chain: fingerprint -> UBL -> signature -> package,
//! each stage feeding the next exactly as the orchestrator wires them.

use chrono::{Datelike, NaiveDate, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use tinto_dian::domain::cufe::{self, FingerprintInput, TaxKind, TaxSummary};
use tinto_dian::domain::model::{Customer, IdType, Issuer, LineItem};
use tinto_dian::domain::packaging;
use tinto_dian::domain::ubl::{self, UblDocument};
use tinto_dian::domain::xmldsig::{sign_xml, verify_signed_xml, Keystore};
use tinto_dian::{DianEnvironment, DocumentType, Invoice, InvoiceStatus};
use uuid::Uuid;

fn self_signed(key: &PKey<Private>) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "pipeline-test").unwrap();
    let name = name.build();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(3).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn keystore() -> Keystore {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let certificate = self_signed(&key);
    Keystore {
        private_key: key,
        certificate,
    }
}

fn fixture() -> (Invoice, Vec<LineItem>, Issuer, Customer) {
    let invoice_id = Uuid::new_v4();
    let issuer = Issuer {
        id: Uuid::new_v4(),
        nit: "900123456".into(),
        legal_name: "Tinto SAS".into(),
        address_line: None,
        city: Some("Bogota".into()),
        department: None,
        email: None,
        certificate_blob: None,
        certificate_expiry: None,
    };
    let customer = Customer {
        id: Uuid::new_v4(),
        id_type: IdType::Cc,
        id_number: "1234567890".into(),
        legal_name: "Juan Valdez".into(),
        address_line: None,
        city: None,
        email: None,
    };
    let lines = vec![
        LineItem {
            invoice_id,
            line_number: 1,
            description: "Cafe de origen".into(),
            quantity_e4: 10_000,
            unit_price_minor: 100_000_000,
            line_total_minor: 100_000_000,
            tax_rate_e2: Some(1900),
            tax_minor: Some(19_000_000),
            item_code: None,
        },
        LineItem {
            invoice_id,
            line_number: 2,
            description: "Empaque".into(),
            quantity_e4: 30_000,
            unit_price_minor: 1_000,
            line_total_minor: 3_000,
            tax_rate_e2: None,
            tax_minor: None,
            item_code: Some("777".into()),
        },
    ];
    let invoice = Invoice {
        id: invoice_id,
        issuer_id: issuer.id,
        customer_id: customer.id,
        environment: DianEnvironment::Habilitacion,
        document_type: DocumentType::SalesInvoice,
        prefix: Some("SETT".into()),
        number: 1,
        issue_date: NaiveDate::from_ymd_opt(2026, 1, 21).unwrap(),
        due_date: None,
        currency: "COP".into(),
        subtotal_minor: 100_003_000,
        tax_minor: 19_000_000,
        total_minor: 119_003_000,
        fingerprint: String::new(),
        status: InvoiceStatus::Draft,
        ubl_blob: None,
        signed_xml_blob: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        created_by_key: None,
    };
    (invoice, lines, issuer, customer)
}

fn fingerprint(invoice: &Invoice, issuer: &Issuer, customer: &Customer) -> String {
    let taxes = [TaxSummary {
        kind: TaxKind::Iva,
        amount_minor: invoice.tax_minor,
        taxable_base_minor: invoice.subtotal_minor,
    }];
    cufe::compute(&FingerprintInput {
        document_id: &invoice.document_id(),
        issue_date: invoice.issue_date,
        subtotal_minor: invoice.subtotal_minor,
        taxes: &taxes,
        total_minor: invoice.total_minor,
        issuer_nit_digits: &issuer.nit_digits(),
        customer_id_type_code: customer.id_type.dian_code(),
        customer_id_number: &customer.id_number,
        secret: "TK-HAB-ABC",
        is_production: false,
    })
}

#[test]
fn full_chain_fingerprint_build_sign_verify_package() {
    let (mut invoice, lines, issuer, customer) = fixture();
    invoice.validate(&lines).unwrap();

    // Fingerprint: deterministic, well-formed, environment-sensitive.
    invoice.fingerprint = fingerprint(&invoice, &issuer, &customer);
    assert!(cufe::is_well_formed(&invoice.fingerprint));
    assert_eq!(invoice.fingerprint, fingerprint(&invoice, &issuer, &customer));

    // UBL: one line element per item, fingerprint embedded.
    let xml = ubl::build(&UblDocument {
        invoice: &invoice,
        lines: &lines,
        issuer: &issuer,
        customer: &customer,
        software_id: "sw-tinto-01",
        software_provider_nit: "830000000",
    })
    .unwrap();
    assert_eq!(xml.matches("<cac:InvoiceLine>").count(), lines.len());
    assert!(xml.contains(&invoice.fingerprint));
    assert!(xml.contains("<cbc:ID>SETT1</cbc:ID>"));

    // Signature: verifies intact, fails on any content flip.
    let ks = keystore();
    let signed = sign_xml(&xml, &ks).unwrap();
    assert!(verify_signed_xml(&signed).unwrap().success());
    let tampered = signed.replace("Cafe de origen", "Cafe de otra parte");
    assert!(!verify_signed_xml(&tampered).unwrap().success());

    // Packaging round trip with the E1 naming convention.
    let package = packaging::package_to_zip(
        &signed,
        packaging::archive_name(&issuer.nit_digits(), invoice.document_type, 2026, invoice.number),
        packaging::inner_xml_name(&invoice.document_id()),
    )
    .unwrap();
    assert_eq!(package.archive_name, "z90012345601202600000000001.zip");
    assert_eq!(package.inner_name, "face_fSETT1.xml");
    assert_eq!(packaging::extract_xml_from_zip(&package.zip_base64).unwrap(), signed);
}

#[test]
fn fingerprint_depends_on_every_enumerated_field() {
    let (mut invoice, _lines, issuer, customer) = fixture();
    invoice.fingerprint = fingerprint(&invoice, &issuer, &customer);
    let baseline = invoice.fingerprint.clone();

    let mut changed = invoice.clone();
    changed.number = 2;
    assert_ne!(fingerprint(&changed, &issuer, &customer), baseline);

    let mut changed = invoice.clone();
    changed.issue_date = NaiveDate::from_ymd_opt(2026, 1, 22).unwrap();
    assert_ne!(fingerprint(&changed, &issuer, &customer), baseline);

    let mut changed = invoice.clone();
    changed.total_minor += 1;
    assert_ne!(fingerprint(&changed, &issuer, &customer), baseline);

    let mut other_customer = customer.clone();
    other_customer.id_number = "987654321".into();
    assert_ne!(fingerprint(&invoice, &issuer, &other_customer), baseline);
}

#[test]
fn credit_note_packaging_uses_its_document_code() {
    let (invoice, _lines, issuer, _customer) = fixture();
    let name = packaging::archive_name(
        &issuer.nit_digits(),
        DocumentType::CreditNote,
        invoice.issue_date.year(),
        7,
    );
    assert_eq!(name, "z90012345691202600000000007.zip");
}
