//! Engine configuration loaded from the process environment.
//!
//! Every external input the engine depends on is enumerated here and
//! validated once at startup; components receive an immutable handle.

use crate::infra::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Environment variable carrying the base64 AES-256 system key.
pub const ENV_SYSTEM_KEY: &str = "TINTO_SYSTEM_KEY";
/// Environment variable that gates master-key operations to local consoles.
pub const ENV_CONSOLE_ACCESS: &str = "TINTO_CONSOLE_ACCESS";
/// Environment variable pointing at the encrypted master-key file.
pub const ENV_MASTER_KEY_FILE: &str = "TINTO_MASTER_KEY_FILE";

/// DIAN endpoint selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DianEnvironment {
    Habilitacion,
    Produccion,
}

impl DianEnvironment {
    pub fn parse(name: &str) -> EngineResult<Self> {
        match name {
            "habilitacion" => Ok(DianEnvironment::Habilitacion),
            "produccion" => Ok(DianEnvironment::Produccion),
            other => Err(EngineError::Configuration(format!(
                "unknown DIAN environment '{other}' (expected habilitacion or produccion)"
            ))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DianEnvironment::Habilitacion => "habilitacion",
            DianEnvironment::Produccion => "produccion",
        }
    }

    /// SOAP endpoint for this environment.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            DianEnvironment::Habilitacion => {
                "https://vpfe-hab.dian.gov.co/WcfDianCustomerServices.svc"
            }
            DianEnvironment::Produccion => "https://vpfe.dian.gov.co/WcfDianCustomerServices.svc",
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, DianEnvironment::Produccion)
    }
}

/// All engine settings, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// DIAN-issued technical key for the active numbering range (CUFE input).
    pub technical_key: String,
    /// Software id registered with DIAN (WS-Security username, UBL extension).
    pub software_id: String,
    /// Software PIN registered with DIAN (WS-Security password input, CUDE input).
    pub software_pin: String,
    /// NIT of the software provider carried in the DIAN UBL extension.
    pub software_provider_nit: String,
    /// Target environment.
    pub environment: DianEnvironment,
    /// Path to the encrypted master-key file.
    pub master_key_file: PathBuf,
    /// Optional PKCS#12 keystore for signing.
    pub certificate_path: Option<PathBuf>,
    pub certificate_password: Option<String>,
    pub certificate_alias: Option<String>,
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> EngineResult<Self> {
        let environment = DianEnvironment::parse(&require("DIAN_ENVIRONMENT")?)?;
        let config = Self {
            technical_key: require("DIAN_TECHNICAL_KEY")?,
            software_id: require("DIAN_SOFTWARE_ID")?,
            software_pin: require("DIAN_SOFTWARE_PIN")?,
            software_provider_nit: require("DIAN_SOFTWARE_PROVIDER_NIT")?,
            environment,
            master_key_file: PathBuf::from(require(ENV_MASTER_KEY_FILE)?),
            certificate_path: env::var("DIAN_CERT_PATH").ok().map(PathBuf::from),
            certificate_password: env::var("DIAN_CERT_PASSWORD").ok(),
            certificate_alias: env::var("DIAN_CERT_ALIAS").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> EngineResult<()> {
        if self.technical_key.trim().is_empty() {
            return Err(EngineError::Configuration(
                "DIAN technical key must not be empty".to_string(),
            ));
        }
        if self.software_id.trim().is_empty() {
            return Err(EngineError::Configuration(
                "DIAN software id must not be empty".to_string(),
            ));
        }
        if !self
            .software_provider_nit
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Err(EngineError::Configuration(format!(
                "software provider NIT must be digits only, got '{}'",
                self.software_provider_nit
            )));
        }
        if self.certificate_path.is_some() && self.certificate_password.is_none() {
            return Err(EngineError::Configuration(
                "certificate path set without certificate password".to_string(),
            ));
        }
        Ok(())
    }
}

fn require(var: &str) -> EngineResult<String> {
    env::var(var).map_err(|_| EngineError::Configuration(format!("missing environment variable {var}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_round_trip() {
        assert_eq!(
            DianEnvironment::parse("habilitacion").unwrap(),
            DianEnvironment::Habilitacion
        );
        assert_eq!(
            DianEnvironment::parse("produccion").unwrap(),
            DianEnvironment::Produccion
        );
        assert!(DianEnvironment::parse("staging").is_err());
    }

    #[test]
    fn environment_endpoints() {
        assert!(DianEnvironment::Habilitacion.endpoint().contains("vpfe-hab"));
        assert!(!DianEnvironment::Habilitacion.is_production());
        assert!(DianEnvironment::Produccion.is_production());
    }

    #[test]
    fn validate_rejects_bad_provider_nit() {
        let config = EngineConfig {
            technical_key: "TK-HAB-ABC".into(),
            software_id: "sw-1".into(),
            software_pin: "12345".into(),
            software_provider_nit: "900-123".into(),
            environment: DianEnvironment::Habilitacion,
            master_key_file: PathBuf::from("/tmp/master.key"),
            certificate_path: None,
            certificate_password: None,
            certificate_alias: None,
        };
        assert!(config.validate().is_err());
    }
}
