//! Abuse guard for transactional notifications.
//!
//! Decides per `(recipient, reason)` whether a notification may be sent and
//! records what was sent in the address log:
//!
//! - **Not registered**: sent at most once per address.
//! - **Wrong recipient**: sent once, and never if the address has any log
//!   entry at all.
//! - **Spam guard**: escalating backoff for activation and connection mails,
//!   blocked for good after [`MAX_ATTEMPTS`] escalations.
//!
//! Read, decision, transport call and write for one key run under a per-key
//! async mutex, so concurrent attempts cannot both pass the guard.
//!
//! # Example
//!
//! ```ignore
//! use maildelay_core::guard::{AbuseGuard, BlockSchedule, SendOutcome};
//! use maildelay_core::{InMemoryAddressLog, LogReason, SystemClock};
//!
//! let guard = AbuseGuard::new(InMemoryAddressLog::new(), SystemClock, BlockSchedule::default());
//! let outcome = guard
//!     .attempt_send("alice@example.org", LogReason::NotRegistered, || async { Ok(()) })
//!     .await?;
//! assert_eq!(outcome, SendOutcome::Sent);
//! ```

mod decision;
mod locks;

use std::future::Future;

use tracing::{debug, error, info, warn};

pub use decision::{
    BlockSchedule, DEFAULT_BLOCK_DELAY_DAYS, Decision, MAX_ATTEMPTS, Suppression, WriteOrder,
    decide,
};

use crate::Result;
use crate::addresslog::{AddressLogEntry, LogReason, LogStore};
use crate::clock::Clock;
use crate::notify::TransportError;
use locks::KeyedLocks;

/// Result of a guarded send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport accepted the notification and the log is up to date.
    Sent,
    /// The guard withheld the notification.
    Suppressed(Suppression),
}

impl SendOutcome {
    /// Whether the notification went out.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Rate limiter for transactional notifications.
pub struct AbuseGuard<S, C> {
    store: S,
    clock: C,
    schedule: BlockSchedule,
    locks: KeyedLocks,
}

impl<S: LogStore, C: Clock> AbuseGuard<S, C> {
    /// Create a guard over a log store.
    pub fn new(store: S, clock: C, schedule: BlockSchedule) -> Self {
        Self {
            store,
            clock,
            schedule,
            locks: KeyedLocks::default(),
        }
    }

    /// The underlying log store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The guard's time source.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// The backoff schedule.
    pub const fn schedule(&self) -> &BlockSchedule {
        &self.schedule
    }

    /// Evaluate an attempt without touching the store.
    #[must_use]
    pub fn decide(
        &self,
        email: &str,
        reason: LogReason,
        existing: Option<&AddressLogEntry>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Decision {
        decide(email, reason, existing, now, &self.schedule)
    }

    /// Run `send` if the guard allows a notification of `reason` to `email`,
    /// and record it.
    ///
    /// `send` is only called after the guard decided to allow. When this
    /// returns [`SendOutcome::Sent`] the new log state is stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transport`] if `send` fails and
    /// [`crate::Error::Store`] if the log cannot be read or written. A store
    /// error after a successful send means the mail went out but the guard
    /// state did not advance; this is logged at error level.
    pub async fn attempt_send<F, Fut>(
        &self,
        email: &str,
        reason: LogReason,
        send: F,
    ) -> Result<SendOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), TransportError>>,
    {
        let _permit = self.locks.acquire(email, reason).await;

        let existing = match reason {
            // Any entry for the address counts, whatever its reason.
            LogReason::WrongRecipient => self.store.get_any(email).await?,
            LogReason::NotRegistered | LogReason::SpamGuard => {
                self.store.get(email, reason).await?
            }
        };
        let now = self.clock.now();

        let (record, write) = match self.decide(email, reason, existing.as_ref(), now) {
            Decision::Suppress(suppression) => {
                match &suppression {
                    Suppression::Blocked {
                        attempt,
                        next_eligible_at,
                    } => warn!(
                        email,
                        %reason,
                        attempt,
                        ?next_eligible_at,
                        "No notification was sent, address is blocked"
                    ),
                    Suppression::AlreadyNotified { reason: recorded } => debug!(
                        email,
                        %reason,
                        %recorded,
                        "No notification was sent, address already notified"
                    ),
                }
                return Ok(SendOutcome::Suppressed(suppression));
            }
            Decision::Allow { record, write } => (record, write),
        };

        if write == WriteOrder::BeforeSend {
            self.store.put(&record).await?;
        }

        send().await?;

        if write == WriteOrder::AfterSend
            && let Err(e) = self.store.put(&record).await
        {
            error!(
                email,
                %reason,
                error = %e,
                "Notification sent but the address log could not be updated"
            );
            return Err(e);
        }

        info!(email, %reason, attempt = record.attempt, "Notification sent");
        Ok(SendOutcome::Sent)
    }
}
