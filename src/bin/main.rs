//! DIAN invoicing toolbelt.
//!
//! File-oriented commands over the engine's domain core: fingerprints,
//! signing, verification and packaging, plus console-gated key derivation.

use clap::{Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result};
use std::path::PathBuf;
use tinto_dian::domain::cufe::{self, FingerprintInput, TaxKind, TaxSummary};
use tinto_dian::domain::packaging;
use tinto_dian::domain::xmldsig::{sign_xml, verify_signed_xml, Keystore};
use tinto_dian::services::custody::{derive_api_key, MasterKey};
use tinto_dian::{DocumentType, EngineConfig, Role};

#[derive(Parser)]
#[command(name = "tinto-dian")]
#[command(about = "DIAN electronic invoicing toolbelt")]
#[command(long_about = "
Tinto DIAN toolbelt - fingerprints, signatures and packaging for DIAN
electronic invoices.

EXAMPLES:
    # Compute a CUFE for a habilitacion invoice
    tinto-dian cufe --document-id SETT1 --issue-date 2026-01-21 \\
        --subtotal 1000000.00 --tax 190000.00 --total 1190000.00 \\
        --issuer-nit 900123456 --customer-type 13 --customer-id 1234567890 \\
        --technical-key TK-HAB-ABC

    # Sign a UBL document with a PKCS#12 keystore
    tinto-dian sign factura.xml --keystore firma.p12 --password secreto \\
        -o factura-firmada.xml

    # Verify a signed document
    tinto-dian verify factura-firmada.xml

    # Package a signed document for SendBillAsync
    tinto-dian package factura-firmada.xml --nit 900123456 --year 2026 \\
        --seq 1 -o paquete.b64

ENVIRONMENT VARIABLES:
    TINTO_CONSOLE_ACCESS   required for derive-key (console-only policy)
    TINTO_SYSTEM_KEY       base64 AES-256 system key (derive-key)
    TINTO_MASTER_KEY_FILE  encrypted master key file (derive-key)
    RUST_LOG               logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a CUFE/CUDE fingerprint from invoice fields
    Cufe {
        #[arg(long)]
        document_id: String,
        /// Issue date, yyyy-mm-dd
        #[arg(long)]
        issue_date: String,
        /// Amounts as decimals with two places, e.g. 1000000.00
        #[arg(long)]
        subtotal: String,
        /// IVA amount; omit for untaxed documents
        #[arg(long)]
        tax: Option<String>,
        #[arg(long)]
        total: String,
        #[arg(long)]
        issuer_nit: String,
        /// DIAN identification type code (31, 13, 22, 41, 42, 50)
        #[arg(long, default_value = "31")]
        customer_type: String,
        #[arg(long)]
        customer_id: String,
        /// Technical key (CUFE) or software PIN (CUDE)
        #[arg(long)]
        technical_key: String,
        /// Hash for the production environment instead of habilitacion
        #[arg(long)]
        production: bool,
    },

    /// Sign a UBL document (enveloped XAdES signature)
    Sign {
        /// UBL XML file to sign
        input: PathBuf,
        /// PKCS#12 keystore with the signing credential
        #[arg(long)]
        keystore: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(long)]
        alias: Option<String>,
        /// Output path (defaults to <input>.signed.xml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify the enveloped signature of a signed document
    Verify {
        input: PathBuf,
    },

    /// Package a signed document into the DIAN transport ZIP (base64)
    Package {
        input: PathBuf,
        #[arg(long)]
        nit: String,
        /// Document type: invoice, credit or debit
        #[arg(long, default_value = "invoice")]
        doc_type: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        seq: i64,
        /// Inner document id, e.g. SETT1 (defaults to the file stem)
        #[arg(long)]
        document_id: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract the XML entry from a base64 ZIP (DIAN ApplicationResponse)
    Extract {
        /// File holding the base64 payload
        input: PathBuf,
    },

    /// Derive a new API key from the master key (console only)
    DeriveKey {
        #[arg(long)]
        name: String,
        /// ADMIN, OPERATOR or AUDITOR
        #[arg(long)]
        role: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Cufe {
            document_id,
            issue_date,
            subtotal,
            tax,
            total,
            issuer_nit,
            customer_type,
            customer_id,
            technical_key,
            production,
        } => {
            let issue_date = chrono::NaiveDate::parse_from_str(&issue_date, "%Y-%m-%d")
                .into_diagnostic()?;
            let subtotal_minor = parse_minor(&subtotal)?;
            let total_minor = parse_minor(&total)?;
            let taxes = match tax {
                Some(tax) => vec![TaxSummary {
                    kind: TaxKind::Iva,
                    amount_minor: parse_minor(&tax)?,
                    taxable_base_minor: subtotal_minor,
                }],
                None => Vec::new(),
            };
            let fingerprint = cufe::compute(&FingerprintInput {
                document_id: &document_id,
                issue_date,
                subtotal_minor,
                taxes: &taxes,
                total_minor,
                issuer_nit_digits: &issuer_nit,
                customer_id_type_code: &customer_type,
                customer_id_number: &customer_id,
                secret: &technical_key,
                is_production: production,
            });
            println!("{fingerprint}");
        }

        Commands::Sign {
            input,
            keystore,
            password,
            alias,
            output,
        } => {
            let xml = std::fs::read_to_string(&input).into_diagnostic()?;
            let ks = Keystore::open_pkcs12(&keystore, &password, alias.as_deref())
                .map_err(|e| miette!("{e}"))?;
            let signed = sign_xml(&xml, &ks).map_err(|e| miette!("{e}"))?;
            let output = output.unwrap_or_else(|| input.with_extension("signed.xml"));
            std::fs::write(&output, signed).into_diagnostic()?;
            println!("Signed document written to {}", output.display());
        }

        Commands::Verify { input } => {
            let xml = std::fs::read_to_string(&input).into_diagnostic()?;
            let report = verify_signed_xml(&xml).map_err(|e| miette!("{e}"))?;
            println!("reference digest: {}", verdict(report.digest_ok));
            println!("signature value:  {}", verdict(report.signature_ok));
            if !report.success() {
                return Err(miette!("signature verification failed"));
            }
        }

        Commands::Package {
            input,
            nit,
            doc_type,
            year,
            seq,
            document_id,
            output,
        } => {
            let xml = std::fs::read_to_string(&input).into_diagnostic()?;
            let doc_type = match doc_type.as_str() {
                "invoice" => DocumentType::SalesInvoice,
                "credit" => DocumentType::CreditNote,
                "debit" => DocumentType::DebitNote,
                other => return Err(miette!("unknown document type '{other}'")),
            };
            let document_id = document_id.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let package = packaging::package_to_zip(
                &xml,
                packaging::archive_name(&nit, doc_type, year, seq),
                packaging::inner_xml_name(&document_id),
            )
            .map_err(|e| miette!("{e}"))?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &package.zip_base64).into_diagnostic()?;
                    println!("{} -> {}", package.archive_name, path.display());
                }
                None => println!("{}", package.zip_base64),
            }
        }

        Commands::Extract { input } => {
            let payload = std::fs::read_to_string(&input).into_diagnostic()?;
            let xml = packaging::extract_xml_from_zip(payload.trim()).map_err(|e| miette!("{e}"))?;
            println!("{xml}");
        }

        Commands::DeriveKey { name, role } => {
            let role = Role::parse(&role).ok_or_else(|| miette!("unknown role '{role}'"))?;
            let config = EngineConfig::from_env().map_err(|e| miette!("{e}"))?;
            let master = MasterKey::load(&config).map_err(|e| miette!("{e}"))?;
            let issued = derive_api_key(&master, &name, role, None, chrono::Utc::now())
                .map_err(|e| miette!("{e}"))?;
            println!("secret: {}", issued.raw_secret);
            println!();
            println!(
                "{}",
                serde_json::to_string_pretty(&issued.record).into_diagnostic()?
            );
            println!();
            println!("The secret is shown once. Store it now; only the sealed");
            println!("blob survives in the key record above.");
        }
    }
    Ok(())
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAILED"
    }
}

/// Parse a two-decimal amount like `1000000.00` into minor units.
fn parse_minor(value: &str) -> Result<i64> {
    let (units, cents) = match value.split_once('.') {
        Some((units, cents)) => {
            if cents.len() != 2 || !cents.bytes().all(|b| b.is_ascii_digit()) {
                return Err(miette!("amount '{value}' must have exactly two decimals"));
            }
            (units, cents.parse::<i64>().into_diagnostic()?)
        }
        None => (value, 0),
    };
    let units: i64 = units.parse().into_diagnostic()?;
    if units < 0 {
        Ok(units * 100 - cents)
    } else {
        Ok(units * 100 + cents)
    }
}
