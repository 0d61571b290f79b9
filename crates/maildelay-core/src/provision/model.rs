//! Identity model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A login identity belonging to an account.
///
/// An account may own several identities, one per claimed address. All of
/// them share the owner's credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable local identifier.
    pub username: String,
    /// Claimed email address.
    pub email: String,
    /// Opaque credential hash.
    pub password_hash: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Whether the address was confirmed.
    pub is_active: bool,
    /// Key the pending address is confirmed with.
    pub activation_key: Option<String>,
    /// When the identity was created.
    pub date_joined: DateTime<Utc>,
    /// Most recent login.
    pub last_login: Option<DateTime<Utc>>,
}

impl Identity {
    /// Pending secondary identity for `email`, sharing `owner`'s credential.
    #[must_use]
    pub fn pending_secondary(
        username: impl Into<String>,
        email: impl Into<String>,
        owner: &Self,
        activation_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: owner.password_hash.clone(),
            account_id: owner.account_id,
            is_active: false,
            activation_key: Some(activation_key.into()),
            date_joined: now,
            last_login: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_secondary_shares_credential() {
        let now = Utc::now();
        let owner = Identity {
            username: "owner".into(),
            email: "owner@example.org".into(),
            password_hash: "argon2$abc".into(),
            account_id: AccountId::new(3),
            is_active: true,
            activation_key: None,
            date_joined: now,
            last_login: Some(now),
        };

        let pending =
            Identity::pending_secondary("id1", "second@example.org", &owner, "abcdefgh23", now);
        assert_eq!(pending.password_hash, owner.password_hash);
        assert_eq!(pending.account_id, AccountId::new(3));
        assert!(!pending.is_active);
        assert_eq!(pending.activation_key.as_deref(), Some("abcdefgh23"));
        assert_eq!(pending.last_login, None);
    }
}
