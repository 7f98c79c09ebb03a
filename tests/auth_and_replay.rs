//! Authenticated request validation against the live store: replay
//! protection, role gating, and replay-set compaction.

use chrono::{Duration, Utc};
use tinto_dian::domain::crypto::random_bytes;
use tinto_dian::domain::model::Capability;
use tinto_dian::services::auth::{self, AuthHeaders};
use tinto_dian::services::custody::derive_api_key;
use tinto_dian::{AuthFailure, EngineError, EngineStore, MasterKey, MemoryStore, Role};

fn store_with_key(role: Role) -> (MemoryStore, String) {
    let store = MemoryStore::new();
    let master = MasterKey::from_material(&random_bytes(32)).unwrap();
    let issued = derive_api_key(&master, "itest", role, None, Utc::now()).unwrap();
    store.insert_api_key(issued.record).unwrap();
    (store, issued.raw_secret)
}

#[test]
fn identical_requests_succeed_once() {
    let (store, secret) = store_with_key(Role::Operator);
    let now = Utc::now();
    let ts = now.to_rfc3339();
    let path = "/v1/invoices/3f0f9c3a";
    let sig = auth::sign_request(&secret, "GET", path, &ts, "");
    let headers = AuthHeaders {
        api_key: Some(&secret),
        signature: Some(&sig),
        timestamp: Some(&ts),
    };

    auth::validate(&store, headers, "GET", path, "", Capability::ReadInvoices, now).unwrap();
    let err = auth::validate(&store, headers, "GET", path, "", Capability::ReadInvoices, now)
        .unwrap_err();
    assert!(matches!(err, EngineError::Auth(AuthFailure::Replay)));
}

#[test]
fn distinct_timestamps_are_independent() {
    let (store, secret) = store_with_key(Role::Operator);
    let now = Utc::now();
    let path = "/v1/invoices";
    for offset in 0..3 {
        let ts = (now + Duration::seconds(offset)).to_rfc3339();
        let sig = auth::sign_request(&secret, "GET", path, &ts, "");
        let headers = AuthHeaders {
            api_key: Some(&secret),
            signature: Some(&sig),
            timestamp: Some(&ts),
        };
        auth::validate(&store, headers, "GET", path, "", Capability::ReadInvoices, now).unwrap();
    }
}

#[test]
fn replay_set_compaction_respects_window() {
    let store = MemoryStore::new();
    let now = Utc::now();
    for (name, age_secs) in [("old", 400i64), ("fresh", 10)] {
        store
            .record_request_signature(tinto_dian::domain::model::RequestSignature {
                api_key_fingerprint: "fp".into(),
                signature: name.to_string(),
                method: "GET".into(),
                path: "/".into(),
                requested_at: now - Duration::seconds(age_secs),
            })
            .unwrap();
    }
    let removed = store
        .prune_request_signatures(now - auth::max_request_age())
        .unwrap();
    assert_eq!(removed, 1);

    // The fresh record still blocks its replay.
    let blocked = store
        .record_request_signature(tinto_dian::domain::model::RequestSignature {
            api_key_fingerprint: "fp".into(),
            signature: "fresh".into(),
            method: "GET".into(),
            path: "/".into(),
            requested_at: now - Duration::seconds(10),
        })
        .unwrap();
    assert!(!blocked);
}

#[test]
fn auditor_reads_but_never_writes() {
    let (store, secret) = store_with_key(Role::Auditor);
    let now = Utc::now();

    let ts = now.to_rfc3339();
    let sig = auth::sign_request(&secret, "GET", "/v1/invoices", &ts, "");
    auth::validate(
        &store,
        AuthHeaders {
            api_key: Some(&secret),
            signature: Some(&sig),
            timestamp: Some(&ts),
        },
        "GET",
        "/v1/invoices",
        "",
        Capability::ReadInvoices,
        now,
    )
    .unwrap();

    let ts = (now + Duration::seconds(1)).to_rfc3339();
    let body = "{\"prefix\":\"SETT\"}";
    let sig = auth::sign_request(&secret, "POST", "/v1/invoices", &ts, body);
    let err = auth::validate(
        &store,
        AuthHeaders {
            api_key: Some(&secret),
            signature: Some(&sig),
            timestamp: Some(&ts),
        },
        "POST",
        "/v1/invoices",
        body,
        Capability::CreateInvoice,
        now,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Auth(AuthFailure::RoleDenied)));
}

#[test]
fn deactivated_key_is_rejected() {
    let store = MemoryStore::new();
    let master = MasterKey::from_material(&random_bytes(32)).unwrap();
    let issued = derive_api_key(&master, "stale", Role::Admin, None, Utc::now()).unwrap();
    let mut record = issued.record;
    record.active = false;
    store.insert_api_key(record).unwrap();

    let now = Utc::now();
    let ts = now.to_rfc3339();
    let sig = auth::sign_request(&issued.raw_secret, "GET", "/v1/invoices", &ts, "");
    let err = auth::validate(
        &store,
        AuthHeaders {
            api_key: Some(&issued.raw_secret),
            signature: Some(&sig),
            timestamp: Some(&ts),
        },
        "GET",
        "/v1/invoices",
        "",
        Capability::ReadInvoices,
        now,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Auth(AuthFailure::UnknownKey)));
}
