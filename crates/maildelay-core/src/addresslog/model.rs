//! Address log data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which notification flow created a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogReason {
    /// Registration nudge to an unknown sender. Sent at most once.
    NotRegistered,
    /// Notice that a mail was addressed wrongly and dropped.
    WrongRecipient,
    /// Escalating guard for activation and connection mails.
    SpamGuard,
}

impl LogReason {
    /// Every reason, in storage order.
    pub const ALL: [Self; 3] = [Self::NotRegistered, Self::WrongRecipient, Self::SpamGuard];

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NREG" => Some(Self::NotRegistered),
            "WRONG" => Some(Self::WrongRecipient),
            "SPAM" => Some(Self::SpamGuard),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NREG",
            Self::WrongRecipient => "WRONG",
            Self::SpamGuard => "SPAM",
        }
    }
}

impl std::fmt::Display for LogReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted guard state for one `(email, reason)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLogEntry {
    /// Tracked recipient address.
    pub email: String,
    /// Flow that created the entry.
    pub reason: LogReason,
    /// Number of guarded attempts that escalated.
    pub attempt: u32,
    /// Gate for the spam guard flow; `None` where it does not apply.
    pub next_eligible_at: Option<DateTime<Utc>>,
}

impl AddressLogEntry {
    /// Entry recorded after the registration nudge was sent.
    #[must_use]
    pub fn not_registered(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            reason: LogReason::NotRegistered,
            attempt: 1,
            next_eligible_at: None,
        }
    }

    /// Entry recorded after the wrong-recipient notice was sent.
    #[must_use]
    pub fn wrong_recipient(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            reason: LogReason::WrongRecipient,
            attempt: 1,
            next_eligible_at: None,
        }
    }

    /// Entry recorded after the first spam-guarded mail was sent.
    #[must_use]
    pub fn spam_guard(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            reason: LogReason::SpamGuard,
            attempt: 0,
            next_eligible_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_roundtrip() {
        for reason in LogReason::ALL {
            assert_eq!(LogReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(LogReason::parse("spam"), None);
    }

    #[test]
    fn test_constructors() {
        let now = Utc::now();
        let entry = AddressLogEntry::spam_guard("a@b.c", now);
        assert_eq!(entry.attempt, 0);
        assert_eq!(entry.next_eligible_at, Some(now));

        let entry = AddressLogEntry::not_registered("a@b.c");
        assert_eq!(entry.attempt, 1);
        assert_eq!(entry.next_eligible_at, None);
        assert_eq!(entry.reason, LogReason::NotRegistered);
    }
}
