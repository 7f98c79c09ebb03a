//! UBL 2.1 invoice document builder.
//!
//! Emits the exact child order DIAN's schema validation expects, with all
//! namespaces bound at the root. The first UBLExtension carries an empty
//! ExtensionContent reserved for the enveloped signature; whitespace is
//! never pretty-printed so the signed bytes stay canonical.

use crate::domain::model::money::{format_minor, format_percent, format_quantity};
use crate::domain::model::{Customer, Invoice, Issuer, LineItem};
use crate::domain::ubl::ns;
use crate::infra::error::{EngineError, EngineResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeMap;

/// Everything the builder needs, already loaded by the orchestrator.
#[derive(Debug, Clone)]
pub struct UblDocument<'a> {
    pub invoice: &'a Invoice,
    pub lines: &'a [LineItem],
    pub issuer: &'a Issuer,
    pub customer: &'a Customer,
    /// Software id registered with DIAN, carried in the sts extension.
    pub software_id: &'a str,
    /// NIT of the software provider, carried in the sts extension.
    pub software_provider_nit: &'a str,
}

/// Issue time rendered into the document. Matches the fingerprint
/// placeholder until the intake contract carries a time of day.
const ISSUE_TIME: &str = "12:00:00-05:00";

struct Xml {
    writer: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn declaration(&mut self) -> EngineResult<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(Self::io)
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> EngineResult<()> {
        let mut start = BytesStart::new(name);
        for (k, v) in attrs {
            start.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Start(start)).map_err(Self::io)
    }

    fn close(&mut self, name: &str) -> EngineResult<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(Self::io)
    }

    /// `<name attrs>text</name>` with text escaped.
    fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> EngineResult<()> {
        self.open(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(Self::io)?;
        self.close(name)
    }

    /// `<name></name>` kept as an open/close pair, not a self-closing tag,
    /// so the signer can splice content between the two.
    fn empty_pair(&mut self, name: &str) -> EngineResult<()> {
        self.open(name, &[])?;
        self.close(name)
    }

    fn finish(self) -> EngineResult<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|_| EngineError::Validation("UBL output is not UTF-8".to_string()))
    }

    fn io<E: std::fmt::Display>(e: E) -> EngineError {
        EngineError::Validation(format!("XML write failed: {e}"))
    }
}

/// Build the UBL 2.1 document. The invoice must already carry its
/// fingerprint; the caller validates header/line invariants beforehand.
pub fn build(doc: &UblDocument<'_>) -> EngineResult<String> {
    if doc.invoice.fingerprint.is_empty() {
        return Err(EngineError::Validation(
            "cannot build UBL before the fingerprint is computed".to_string(),
        ));
    }

    let currency = doc.invoice.currency.as_str();
    let mut xml = Xml::new();
    xml.declaration()?;
    xml.open(
        "Invoice",
        &[
            ("xmlns", ns::INVOICE),
            ("xmlns:cac", ns::CAC),
            ("xmlns:cbc", ns::CBC),
            ("xmlns:ext", ns::EXT),
            ("xmlns:sts", ns::STS),
            ("xmlns:xsi", ns::XSI),
        ],
    )?;

    write_extensions(&mut xml, doc)?;

    xml.leaf("cbc:UBLVersionID", &[], "UBL 2.1")?;
    xml.leaf("cbc:CustomizationID", &[], "10")?;
    xml.leaf("cbc:ProfileID", &[], "DIAN 2.1")?;
    xml.leaf("cbc:ProfileExecutionID", &[], "1")?;
    xml.leaf("cbc:ID", &[], &doc.invoice.document_id())?;
    xml.leaf(
        "cbc:UUID",
        &[("schemeName", "CUFE-SHA384")],
        &doc.invoice.fingerprint,
    )?;
    xml.leaf(
        "cbc:IssueDate",
        &[],
        &doc.invoice.issue_date.format("%Y-%m-%d").to_string(),
    )?;
    xml.leaf("cbc:IssueTime", &[], ISSUE_TIME)?;
    if let Some(due) = doc.invoice.due_date {
        xml.leaf("cbc:DueDate", &[], &due.format("%Y-%m-%d").to_string())?;
    }
    xml.leaf(
        "cbc:InvoiceTypeCode",
        &[],
        doc.invoice.document_type.dian_code(),
    )?;
    xml.leaf("cbc:DocumentCurrencyCode", &[], currency)?;
    xml.leaf("cbc:LineCountNumeric", &[], &doc.lines.len().to_string())?;

    write_supplier(&mut xml, doc.issuer)?;
    write_customer(&mut xml, doc.customer)?;

    // Default cash payment.
    xml.open("cac:PaymentMeans", &[])?;
    xml.leaf("cbc:ID", &[], "1")?;
    xml.leaf("cbc:PaymentMeansCode", &[], "10")?;
    xml.close("cac:PaymentMeans")?;

    write_tax_total(&mut xml, doc, currency)?;
    write_monetary_total(&mut xml, doc, currency)?;

    for line in doc.lines {
        write_line(&mut xml, line, currency)?;
    }

    xml.close("Invoice")?;
    xml.finish()
}

fn write_extensions(xml: &mut Xml, doc: &UblDocument<'_>) -> EngineResult<()> {
    xml.open("ext:UBLExtensions", &[])?;

    // Slot the signer fills in later.
    xml.open("ext:UBLExtension", &[])?;
    xml.empty_pair("ext:ExtensionContent")?;
    xml.close("ext:UBLExtension")?;

    xml.open("ext:UBLExtension", &[])?;
    xml.open("ext:ExtensionContent", &[])?;
    xml.open("sts:DianExtensions", &[])?;
    xml.open("sts:InvoiceSource", &[])?;
    xml.leaf(
        "cbc:IdentificationCode",
        &[("listAgencyID", "6"), ("listAgencyName", "United Nations Economic Commission for Europe")],
        "CO",
    )?;
    xml.close("sts:InvoiceSource")?;
    xml.open("sts:SoftwareProvider", &[])?;
    xml.leaf("sts:ProviderID", &[("schemeID", "31")], doc.software_provider_nit)?;
    xml.leaf("sts:SoftwareID", &[], doc.software_id)?;
    xml.close("sts:SoftwareProvider")?;
    xml.close("sts:DianExtensions")?;
    xml.close("ext:ExtensionContent")?;
    xml.close("ext:UBLExtension")?;

    xml.close("ext:UBLExtensions")
}

fn write_supplier(xml: &mut Xml, issuer: &Issuer) -> EngineResult<()> {
    xml.open("cac:AccountingSupplierParty", &[])?;
    xml.leaf("cbc:AdditionalAccountID", &[], "1")?;
    xml.open("cac:Party", &[])?;
    xml.open("cac:PartyIdentification", &[])?;
    xml.leaf("cbc:ID", &[("schemeID", "31")], &issuer.nit_digits())?;
    xml.close("cac:PartyIdentification")?;
    xml.open("cac:PartyName", &[])?;
    xml.leaf("cbc:Name", &[], &issuer.legal_name)?;
    xml.close("cac:PartyName")?;
    if issuer.address_line.is_some() || issuer.city.is_some() {
        xml.open("cac:PhysicalLocation", &[])?;
        xml.open("cac:Address", &[])?;
        if let Some(city) = &issuer.city {
            xml.leaf("cbc:CityName", &[], city)?;
        }
        if let Some(department) = &issuer.department {
            xml.leaf("cbc:CountrySubentity", &[], department)?;
        }
        if let Some(line) = &issuer.address_line {
            xml.open("cac:AddressLine", &[])?;
            xml.leaf("cbc:Line", &[], line)?;
            xml.close("cac:AddressLine")?;
        }
        xml.close("cac:Address")?;
        xml.close("cac:PhysicalLocation")?;
    }
    xml.open("cac:PartyTaxScheme", &[])?;
    xml.leaf("cbc:RegistrationName", &[], &issuer.legal_name)?;
    xml.leaf("cbc:CompanyID", &[("schemeID", "31")], &issuer.nit_digits())?;
    xml.open("cac:TaxScheme", &[])?;
    xml.leaf("cbc:ID", &[], "01")?;
    xml.leaf("cbc:Name", &[], "IVA")?;
    xml.close("cac:TaxScheme")?;
    xml.close("cac:PartyTaxScheme")?;
    xml.open("cac:PartyLegalEntity", &[])?;
    xml.leaf("cbc:RegistrationName", &[], &issuer.legal_name)?;
    xml.leaf("cbc:CompanyID", &[("schemeID", "31")], &issuer.nit_digits())?;
    xml.close("cac:PartyLegalEntity")?;
    xml.close("cac:Party")?;
    xml.close("cac:AccountingSupplierParty")
}

fn write_customer(xml: &mut Xml, customer: &Customer) -> EngineResult<()> {
    let scheme = customer.id_type.dian_code();
    xml.open("cac:AccountingCustomerParty", &[])?;
    xml.leaf("cbc:AdditionalAccountID", &[], "2")?;
    xml.open("cac:Party", &[])?;
    xml.open("cac:PartyIdentification", &[])?;
    xml.leaf("cbc:ID", &[("schemeID", scheme)], &customer.id_number)?;
    xml.close("cac:PartyIdentification")?;
    xml.open("cac:PartyName", &[])?;
    xml.leaf("cbc:Name", &[], &customer.legal_name)?;
    xml.close("cac:PartyName")?;
    xml.open("cac:PartyTaxScheme", &[])?;
    xml.leaf("cbc:RegistrationName", &[], &customer.legal_name)?;
    xml.leaf("cbc:CompanyID", &[("schemeID", scheme)], &customer.id_number)?;
    xml.open("cac:TaxScheme", &[])?;
    xml.leaf("cbc:ID", &[], "01")?;
    xml.leaf("cbc:Name", &[], "IVA")?;
    xml.close("cac:TaxScheme")?;
    xml.close("cac:PartyTaxScheme")?;
    xml.close("cac:Party")?;
    xml.close("cac:AccountingCustomerParty")
}

fn write_tax_total(xml: &mut Xml, doc: &UblDocument<'_>, currency: &str) -> EngineResult<()> {
    let cur = [("currencyID", currency)];
    xml.open("cac:TaxTotal", &[])?;
    xml.leaf("cbc:TaxAmount", &cur, &format_minor(doc.invoice.tax_minor))?;

    // One subtotal per distinct rate, untaxed lines grouped under 0.00.
    let mut by_rate: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
    for line in doc.lines {
        let rate = line.tax_rate_e2.unwrap_or(0);
        let entry = by_rate.entry(rate).or_insert((0, 0));
        entry.0 += line.line_total_minor;
        entry.1 += line.tax_minor.unwrap_or(0);
    }
    for (rate, (base, amount)) in by_rate {
        xml.open("cac:TaxSubtotal", &[])?;
        xml.leaf("cbc:TaxableAmount", &cur, &format_minor(base))?;
        xml.leaf("cbc:TaxAmount", &cur, &format_minor(amount))?;
        xml.open("cac:TaxCategory", &[])?;
        xml.leaf("cbc:Percent", &[], &format_percent(rate))?;
        xml.open("cac:TaxScheme", &[])?;
        xml.leaf("cbc:ID", &[], "01")?;
        xml.leaf("cbc:Name", &[], "IVA")?;
        xml.close("cac:TaxScheme")?;
        xml.close("cac:TaxCategory")?;
        xml.close("cac:TaxSubtotal")?;
    }
    xml.close("cac:TaxTotal")
}

fn write_monetary_total(xml: &mut Xml, doc: &UblDocument<'_>, currency: &str) -> EngineResult<()> {
    let cur = [("currencyID", currency)];
    xml.open("cac:LegalMonetaryTotal", &[])?;
    xml.leaf(
        "cbc:LineExtensionAmount",
        &cur,
        &format_minor(doc.invoice.subtotal_minor),
    )?;
    xml.leaf(
        "cbc:TaxExclusiveAmount",
        &cur,
        &format_minor(doc.invoice.subtotal_minor),
    )?;
    xml.leaf(
        "cbc:TaxInclusiveAmount",
        &cur,
        &format_minor(doc.invoice.total_minor),
    )?;
    xml.leaf(
        "cbc:PayableAmount",
        &cur,
        &format_minor(doc.invoice.total_minor),
    )?;
    xml.close("cac:LegalMonetaryTotal")
}

fn write_line(xml: &mut Xml, line: &LineItem, currency: &str) -> EngineResult<()> {
    let cur = [("currencyID", currency)];
    xml.open("cac:InvoiceLine", &[])?;
    xml.leaf("cbc:ID", &[], &line.line_number.to_string())?;
    xml.leaf(
        "cbc:InvoicedQuantity",
        &[("unitCode", "EA")],
        &format_quantity(line.quantity_e4),
    )?;
    xml.leaf(
        "cbc:LineExtensionAmount",
        &cur,
        &format_minor(line.line_total_minor),
    )?;
    xml.open("cac:Item", &[])?;
    xml.leaf("cbc:Description", &[], &line.description)?;
    xml.open("cac:StandardItemIdentification", &[])?;
    xml.leaf("cbc:ID", &[], line.item_code.as_deref().unwrap_or("999"))?;
    xml.close("cac:StandardItemIdentification")?;
    xml.close("cac:Item")?;
    xml.open("cac:Price", &[])?;
    xml.leaf(
        "cbc:PriceAmount",
        &cur,
        &format_minor(line.unit_price_minor),
    )?;
    xml.close("cac:Price")?;
    xml.close("cac:InvoiceLine")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DocumentType, IdType, InvoiceStatus};
    use crate::infra::config::DianEnvironment;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn fixture() -> (Invoice, Vec<LineItem>, Issuer, Customer) {
        let id = Uuid::new_v4();
        let invoice = Invoice {
            id,
            issuer_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            environment: DianEnvironment::Habilitacion,
            document_type: DocumentType::SalesInvoice,
            prefix: Some("SETT".into()),
            number: 1,
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 21).unwrap(),
            due_date: None,
            currency: "COP".into(),
            subtotal_minor: 100_000_000,
            tax_minor: 19_000_000,
            total_minor: 119_000_000,
            fingerprint: "ab".repeat(48),
            status: InvoiceStatus::PendingSignature,
            ubl_blob: None,
            signed_xml_blob: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by_key: None,
        };
        let lines = vec![LineItem {
            invoice_id: id,
            line_number: 1,
            description: "Cafe especial <premium> & molido".into(),
            quantity_e4: 10_000,
            unit_price_minor: 100_000_000,
            line_total_minor: 100_000_000,
            tax_rate_e2: Some(1900),
            tax_minor: Some(19_000_000),
            item_code: None,
        }];
        let issuer = Issuer {
            id: invoice.issuer_id,
            nit: "900123456".into(),
            legal_name: "Tinto SAS".into(),
            address_line: Some("Calle 93 #11-27".into()),
            city: Some("Bogota".into()),
            department: Some("Cundinamarca".into()),
            email: None,
            certificate_blob: None,
            certificate_expiry: None,
        };
        let customer = Customer {
            id: invoice.customer_id,
            id_type: IdType::Cc,
            id_number: "1234567890".into(),
            legal_name: "Juan Valdez".into(),
            address_line: None,
            city: None,
            email: None,
        };
        (invoice, lines, issuer, customer)
    }

    fn build_fixture() -> String {
        let (invoice, lines, issuer, customer) = fixture();
        build(&UblDocument {
            invoice: &invoice,
            lines: &lines,
            issuer: &issuer,
            customer: &customer,
            software_id: "sw-tinto-01",
            software_provider_nit: "830000000",
        })
        .unwrap()
    }

    #[test]
    fn declaration_and_root_namespaces() {
        let xml = build_fixture();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("xmlns=\"urn:oasis:names:specification:ubl:schema:xsd:Invoice-2\""));
        assert!(xml.contains("xmlns:sts=\"dian:gov:co:facturaelectronica:Structures-2-1\""));
        assert!(xml.contains("xmlns:xsi="));
    }

    #[test]
    fn reserved_signature_slot_is_first_extension() {
        let xml = build_fixture();
        let slot = xml.find("<ext:ExtensionContent></ext:ExtensionContent>").unwrap();
        let dian = xml.find("<sts:DianExtensions>").unwrap();
        assert!(slot < dian);
    }

    #[test]
    fn header_fields_and_order() {
        let xml = build_fixture();
        assert!(xml.contains("<cbc:UBLVersionID>UBL 2.1</cbc:UBLVersionID>"));
        assert!(xml.contains("<cbc:CustomizationID>10</cbc:CustomizationID>"));
        assert!(xml.contains("<cbc:ProfileID>DIAN 2.1</cbc:ProfileID>"));
        assert!(xml.contains("<cbc:ID>SETT1</cbc:ID>"));
        assert!(xml.contains("schemeName=\"CUFE-SHA384\""));
        assert!(xml.contains("<cbc:IssueDate>2026-01-21</cbc:IssueDate>"));
        assert!(xml.contains("<cbc:IssueTime>12:00:00-05:00</cbc:IssueTime>"));
        assert!(xml.contains("<cbc:InvoiceTypeCode>01</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cbc:LineCountNumeric>1</cbc:LineCountNumeric>"));
        let version = xml.find("<cbc:UBLVersionID>").unwrap();
        let id = xml.find("<cbc:ID>").unwrap();
        let issue = xml.find("<cbc:IssueDate>").unwrap();
        assert!(version < id && id < issue);
    }

    #[test]
    fn amounts_carry_currency_and_two_decimals() {
        let xml = build_fixture();
        assert!(xml.contains(
            "<cbc:TaxAmount currencyID=\"COP\">190000.00</cbc:TaxAmount>"
        ));
        assert!(xml.contains(
            "<cbc:PayableAmount currencyID=\"COP\">1190000.00</cbc:PayableAmount>"
        ));
        assert!(xml.contains("<cbc:Percent>19.00</cbc:Percent>"));
    }

    #[test]
    fn one_invoice_line_per_item_with_escaping() {
        let xml = build_fixture();
        assert_eq!(xml.matches("<cac:InvoiceLine>").count(), 1);
        assert!(xml.contains("Cafe especial &lt;premium&gt; &amp; molido"));
        assert!(xml.contains("<cbc:InvoicedQuantity unitCode=\"EA\">1.0000</cbc:InvoicedQuantity>"));
        assert!(xml.contains("<cac:StandardItemIdentification><cbc:ID>999</cbc:ID>"));
    }

    #[test]
    fn customer_scheme_follows_id_type() {
        let xml = build_fixture();
        assert!(xml.contains("<cbc:ID schemeID=\"13\">1234567890</cbc:ID>"));
    }

    #[test]
    fn line_numbers_are_sequential() {
        let (invoice, mut lines, issuer, customer) = fixture();
        let second = LineItem {
            line_number: 2,
            description: "Bolsa".into(),
            quantity_e4: 20_000,
            unit_price_minor: 500,
            line_total_minor: 1_000,
            tax_rate_e2: None,
            tax_minor: None,
            item_code: Some("123".into()),
            ..lines[0].clone()
        };
        lines.push(second);
        let mut invoice = invoice;
        invoice.subtotal_minor += 1_000;
        invoice.total_minor += 1_000;
        let xml = build(&UblDocument {
            invoice: &invoice,
            lines: &lines,
            issuer: &issuer,
            customer: &customer,
            software_id: "sw",
            software_provider_nit: "830000000",
        })
        .unwrap();
        assert_eq!(xml.matches("<cac:InvoiceLine>").count(), 2);
        let first = xml.find("<cbc:ID>1</cbc:ID>").unwrap();
        let second = xml.find("<cbc:ID>2</cbc:ID>").unwrap();
        assert!(first < second);
    }

    #[test]
    fn build_requires_fingerprint() {
        let (mut invoice, lines, issuer, customer) = fixture();
        invoice.fingerprint = String::new();
        assert!(build(&UblDocument {
            invoice: &invoice,
            lines: &lines,
            issuer: &issuer,
            customer: &customer,
            software_id: "sw",
            software_provider_nit: "830000000",
        })
        .is_err());
    }
}
