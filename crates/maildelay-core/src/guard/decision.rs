//! The guard's state machine, without I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::addresslog::{AddressLogEntry, LogReason};

/// Spam-guarded entries with more escalations than this are blocked for good.
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff in days for attempts without a configured delay.
pub const DEFAULT_BLOCK_DELAY_DAYS: i64 = 7;

/// Backoff per attempt number.
///
/// Exact matches from the configuration win; every other attempt gets
/// [`DEFAULT_BLOCK_DELAY_DAYS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSchedule {
    delays: BTreeMap<u32, Duration>,
}

impl BlockSchedule {
    /// Create a schedule from explicit delays.
    #[must_use]
    pub const fn new(delays: BTreeMap<u32, Duration>) -> Self {
        Self { delays }
    }

    /// Create a schedule from delays given in seconds.
    #[must_use]
    pub fn from_seconds(delays: &BTreeMap<u32, u64>) -> Self {
        let delays = delays
            .iter()
            .map(|(&attempt, &secs)| {
                let delay = i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .unwrap_or(Duration::MAX);
                (attempt, delay)
            })
            .collect();
        Self { delays }
    }

    /// Backoff after the given attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(&attempt)
            .copied()
            .unwrap_or_else(|| Duration::days(DEFAULT_BLOCK_DELAY_DAYS))
    }
}

/// Why a send was withheld.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    /// A once-only notification was already recorded for this address.
    AlreadyNotified {
        /// Reason of the record that caused the suppression.
        reason: LogReason,
    },
    /// The spam guard blocks this address.
    Blocked {
        /// Stored attempt counter.
        attempt: u32,
        /// Stored eligibility timestamp.
        next_eligible_at: Option<DateTime<Utc>>,
    },
}

/// When the new log state is written relative to the transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrder {
    /// Persist first, then send. A failed send still counts.
    BeforeSend,
    /// Send first, then persist. A failed send leaves no trace.
    AfterSend,
}

/// Outcome of evaluating one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send, and store `record`.
    Allow {
        /// New state for the key.
        record: AddressLogEntry,
        /// Ordering of the write against the send.
        write: WriteOrder,
    },
    /// Do not send; the stored state stays as it is.
    Suppress(Suppression),
}

/// Evaluate an attempt for `(email, reason)` given the stored entry.
///
/// For [`LogReason::WrongRecipient`], `existing` is whatever entry the store
/// holds for `email`, of any reason.
#[must_use]
pub fn decide(
    email: &str,
    reason: LogReason,
    existing: Option<&AddressLogEntry>,
    now: DateTime<Utc>,
    schedule: &BlockSchedule,
) -> Decision {
    match (reason, existing) {
        (LogReason::NotRegistered, None) => Decision::Allow {
            record: AddressLogEntry::not_registered(email),
            write: WriteOrder::AfterSend,
        },
        (LogReason::WrongRecipient, None) => Decision::Allow {
            record: AddressLogEntry::wrong_recipient(email),
            write: WriteOrder::AfterSend,
        },
        (LogReason::NotRegistered | LogReason::WrongRecipient, Some(entry)) => {
            Decision::Suppress(Suppression::AlreadyNotified {
                reason: entry.reason,
            })
        }
        (LogReason::SpamGuard, None) => Decision::Allow {
            record: AddressLogEntry::spam_guard(email, now),
            write: WriteOrder::AfterSend,
        },
        (LogReason::SpamGuard, Some(entry)) => {
            // An eligibility time in the past blocks, not one in the future.
            let expired = entry.next_eligible_at.is_some_and(|at| at < now);
            if expired || entry.attempt > MAX_ATTEMPTS {
                return Decision::Suppress(Suppression::Blocked {
                    attempt: entry.attempt,
                    next_eligible_at: entry.next_eligible_at,
                });
            }

            let attempt = entry.attempt.saturating_add(1);
            let next_eligible_at = now
                .checked_add_signed(schedule.delay_for(attempt))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            Decision::Allow {
                record: AddressLogEntry {
                    email: entry.email.clone(),
                    reason: LogReason::SpamGuard,
                    attempt,
                    next_eligible_at: Some(next_eligible_at),
                },
                write: WriteOrder::BeforeSend,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_schedule_fallback() {
        let schedule = BlockSchedule::new(BTreeMap::from([(1, Duration::hours(1))]));
        assert_eq!(schedule.delay_for(1), Duration::hours(1));
        assert_eq!(schedule.delay_for(2), Duration::days(7));
        assert_eq!(schedule.delay_for(0), Duration::days(7));
        assert_eq!(BlockSchedule::default().delay_for(4), Duration::days(7));
    }

    #[test]
    fn test_schedule_from_huge_seconds() {
        let schedule = BlockSchedule::from_seconds(&BTreeMap::from([(1, u64::MAX)]));
        assert_eq!(schedule.delay_for(1), Duration::MAX);
    }

    #[test]
    fn test_not_registered() {
        let schedule = BlockSchedule::default();
        let decision = decide("a@x.org", LogReason::NotRegistered, None, t0(), &schedule);
        assert_eq!(
            decision,
            Decision::Allow {
                record: AddressLogEntry::not_registered("a@x.org"),
                write: WriteOrder::AfterSend,
            }
        );

        let existing = AddressLogEntry::not_registered("a@x.org");
        let decision = decide(
            "a@x.org",
            LogReason::NotRegistered,
            Some(&existing),
            t0() + Duration::days(365),
            &schedule,
        );
        assert_eq!(
            decision,
            Decision::Suppress(Suppression::AlreadyNotified {
                reason: LogReason::NotRegistered
            })
        );
    }

    #[test]
    fn test_wrong_recipient_any_reason_suppresses() {
        let schedule = BlockSchedule::default();
        let existing = AddressLogEntry::spam_guard("a@x.org", t0());
        let decision = decide(
            "a@x.org",
            LogReason::WrongRecipient,
            Some(&existing),
            t0(),
            &schedule,
        );
        assert_eq!(
            decision,
            Decision::Suppress(Suppression::AlreadyNotified {
                reason: LogReason::SpamGuard
            })
        );
    }

    #[test]
    fn test_spam_guard_fresh() {
        let decision = decide(
            "a@x.org",
            LogReason::SpamGuard,
            None,
            t0(),
            &BlockSchedule::default(),
        );
        assert_eq!(
            decision,
            Decision::Allow {
                record: AddressLogEntry::spam_guard("a@x.org", t0()),
                write: WriteOrder::AfterSend,
            }
        );
    }

    #[test]
    fn test_spam_guard_escalates_at_same_instant() {
        let schedule = BlockSchedule::new(BTreeMap::from([(1, Duration::hours(2))]));
        let existing = AddressLogEntry::spam_guard("a@x.org", t0());

        let decision = decide("a@x.org", LogReason::SpamGuard, Some(&existing), t0(), &schedule);
        let Decision::Allow { record, write } = decision else {
            panic!("expected escalation");
        };
        assert_eq!(write, WriteOrder::BeforeSend);
        assert_eq!(record.attempt, 1);
        assert_eq!(record.next_eligible_at, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_spam_guard_blocks_after_eligibility_passed() {
        let existing = AddressLogEntry::spam_guard("a@x.org", t0());
        let decision = decide(
            "a@x.org",
            LogReason::SpamGuard,
            Some(&existing),
            t0() + Duration::seconds(1),
            &BlockSchedule::default(),
        );
        assert_eq!(
            decision,
            Decision::Suppress(Suppression::Blocked {
                attempt: 0,
                next_eligible_at: Some(t0()),
            })
        );
    }

    #[test]
    fn test_spam_guard_attempt_cap() {
        let schedule = BlockSchedule::default();
        let mut existing = AddressLogEntry::spam_guard("a@x.org", t0() + Duration::days(3));

        existing.attempt = MAX_ATTEMPTS;
        assert!(matches!(
            decide("a@x.org", LogReason::SpamGuard, Some(&existing), t0(), &schedule),
            Decision::Allow { .. }
        ));

        existing.attempt = MAX_ATTEMPTS + 1;
        assert!(matches!(
            decide("a@x.org", LogReason::SpamGuard, Some(&existing), t0(), &schedule),
            Decision::Suppress(Suppression::Blocked { .. })
        ));
    }
}
