//! Master-key loading policy: console-only access and the encrypted key
//! file round trip. Kept in one test function because the scenarios
//! manipulate process-wide environment variables.

use base64::engine::general_purpose;
use base64::Engine;
use std::io::Write;
use std::path::PathBuf;
use tinto_dian::domain::crypto::random_bytes;
use tinto_dian::infra::config::{ENV_CONSOLE_ACCESS, ENV_SYSTEM_KEY};
use tinto_dian::services::custody::seal_master_key_file;
use tinto_dian::{
    DianEnvironment, EngineConfig, EngineError, MasterKey, SecurityFailure,
};

fn config_with_key_file(path: PathBuf) -> EngineConfig {
    EngineConfig {
        technical_key: "TK-HAB-ABC".into(),
        software_id: "sw".into(),
        software_pin: "pin".into(),
        software_provider_nit: "830000000".into(),
        environment: DianEnvironment::Habilitacion,
        master_key_file: path,
        certificate_path: None,
        certificate_password: None,
        certificate_alias: None,
    }
}

#[test]
fn console_gate_and_key_file_round_trip() {
    let system_key: [u8; 32] = random_bytes(32).try_into().unwrap();
    let master_material: [u8; 32] = random_bytes(32).try_into().unwrap();

    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    let sealed = seal_master_key_file(&system_key, &master_material).unwrap();
    key_file.write_all(sealed.as_bytes()).unwrap();
    key_file.flush().unwrap();
    let config = config_with_key_file(key_file.path().to_path_buf());

    // Without the console discriminator every load fails closed, even with
    // the system key present.
    std::env::remove_var(ENV_CONSOLE_ACCESS);
    std::env::set_var(
        ENV_SYSTEM_KEY,
        general_purpose::STANDARD.encode(system_key),
    );
    let err = MasterKey::load(&config).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Security(SecurityFailure::ConsoleOnly)
    ));

    // Gate set: the key loads and matches the provisioned material.
    std::env::set_var(ENV_CONSOLE_ACCESS, "1");
    let master = MasterKey::load(&config).unwrap();
    assert_eq!(master.material(), &master_material);

    // A wrong system key fails the decryption, not the gate.
    std::env::set_var(
        ENV_SYSTEM_KEY,
        general_purpose::STANDARD.encode(random_bytes(32)),
    );
    let err = MasterKey::load(&config).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Security(SecurityFailure::BadKeyMaterial(_))
    ));

    // Missing key file also reports bad key material.
    std::env::set_var(
        ENV_SYSTEM_KEY,
        general_purpose::STANDARD.encode(system_key),
    );
    let missing = config_with_key_file(PathBuf::from("/nonexistent/master.key"));
    let err = MasterKey::load(&missing).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Security(SecurityFailure::BadKeyMaterial(_))
    ));

    std::env::remove_var(ENV_CONSOLE_ACCESS);
    std::env::remove_var(ENV_SYSTEM_KEY);
}
