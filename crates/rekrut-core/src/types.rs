//! Domain types shared across the workspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authorization role carried by an identity.
///
/// The role is written only during directory reconciliation (from group
/// membership) or by administrative action, never taken from client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Administrator,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Administrator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Administrator => "administrator",
        }
    }

    pub fn from_group_membership(is_admin_group_member: bool) -> Self {
        if is_admin_group_member {
            Role::Administrator
        } else {
            Role::Standard
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "standard" => Ok(Role::Standard),
            "administrator" => Ok(Role::Administrator),
            other => Err(crate::Error::Internal(format!("unknown role: {}", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the local identity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable server-assigned identifier, never reused
    pub id: Uuid,

    /// Globally unique, stored lowercased
    pub email: String,

    /// Directory UID, set on first successful directory login
    pub directory_id: Option<String>,

    /// Argon2 hash; None means the local path is disabled for this identity
    #[serde(skip_serializing)]
    pub local_credential_hash: Option<String>,

    pub role: Role,

    pub first_name: String,

    pub last_name: String,

    /// Last time directory reconciliation touched this row
    pub last_directory_sync_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// Fields for a new identity row.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub directory_id: Option<String>,
    pub local_credential_hash: Option<String>,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub last_directory_sync_at: Option<DateTime<Utc>>,
}

/// Profile returned by the directory service.
///
/// Transient: consumed once by reconciliation, never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryProfile {
    pub directory_id: String,
    pub email: String,
    pub given_name: String,
    pub surname: String,
    pub groups: Vec<String>,
}

/// A single audit log record. Writes are fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub detail: String,
}

impl AuditEntry {
    pub fn login(email: &str, method: &str, outcome: &str, peer: &str) -> Self {
        Self {
            action: "login".to_string(),
            entity_type: "identity".to_string(),
            entity_id: email.to_string(),
            actor: peer.to_string(),
            detail: format!("method={} outcome={}", method, outcome),
        }
    }
}

/// Derive a default first/last name from the email local part.
///
/// Convenience fill for local registration only; explicit name fields
/// always win over this.
pub fn names_from_email(email: &str) -> (String, String) {
    let local = email.split('@').next().unwrap_or(email);
    let mut parts = local.splitn(2, ['.', '_', '-']);
    let first = parts.next().unwrap_or("").to_string();
    let last = parts.next().unwrap_or("").to_string();
    (capitalize(&first), capitalize(&last))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
