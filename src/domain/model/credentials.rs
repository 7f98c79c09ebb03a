//! Derived API keys, roles, and replay-protection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role attached to a derived API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Operator,
    Auditor,
}

/// Operations the role capability table gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadInvoices,
    CreateInvoice,
    IssueToDian,
    ManageIssuersAndKeys,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Operator => "OPERATOR",
            Role::Auditor => "AUDITOR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "OPERATOR" => Some(Role::Operator),
            "AUDITOR" => Some(Role::Auditor),
            _ => None,
        }
    }

    /// Role capability table.
    #[must_use]
    pub fn permits(&self, capability: Capability) -> bool {
        match (self, capability) {
            (_, Capability::ReadInvoices) => true,
            (Role::Admin | Role::Operator, Capability::CreateInvoice | Capability::IssueToDian) => {
                true
            }
            (Role::Admin, Capability::ManageIssuersAndKeys) => true,
            _ => false,
        }
    }
}

/// A derived credential. The raw secret exists in plaintext only at
/// creation time; afterwards only the fingerprint and the sealed blob remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub name: String,
    pub role: Role,
    /// SHA-512 of the raw secret; unique lookup key.
    pub fingerprint: String,
    /// Raw secret sealed under the master key.
    pub secret_blob: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// A usable key is active and not past its expiry.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

/// Replay-protection record; `(signature, timestamp)` is the replay key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSignature {
    pub api_key_fingerprint: String,
    pub signature: String,
    pub method: String,
    pub path: String,
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn capability_table() {
        assert!(Role::Auditor.permits(Capability::ReadInvoices));
        assert!(!Role::Auditor.permits(Capability::CreateInvoice));
        assert!(!Role::Auditor.permits(Capability::IssueToDian));
        assert!(Role::Operator.permits(Capability::CreateInvoice));
        assert!(Role::Operator.permits(Capability::IssueToDian));
        assert!(!Role::Operator.permits(Capability::ManageIssuersAndKeys));
        assert!(Role::Admin.permits(Capability::ManageIssuersAndKeys));
    }

    #[test]
    fn usability_window() {
        let now = Utc::now();
        let mut key = ApiKey {
            name: "ops".into(),
            role: Role::Operator,
            fingerprint: "fp".into(),
            secret_blob: "blob".into(),
            expires_at: Some(now + Duration::hours(1)),
            last_used_at: None,
            active: true,
            created_at: now,
        };
        assert!(key.is_usable(now));
        key.active = false;
        assert!(!key.is_usable(now));
        key.active = true;
        key.expires_at = Some(now - Duration::seconds(1));
        assert!(!key.is_usable(now));
        key.expires_at = None;
        assert!(key.is_usable(now));
    }

    #[test]
    fn role_round_trip() {
        for role in [Role::Admin, Role::Operator, Role::Auditor] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}
