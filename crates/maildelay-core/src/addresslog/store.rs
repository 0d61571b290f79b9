//! Storage contract for the address log.

use std::future::Future;

use super::model::{AddressLogEntry, LogReason};
use crate::Result;

/// Storage for address log entries.
///
/// Implementations keep at most one entry per `(email, reason)`; `put`
/// replaces an existing one. Serialization of concurrent read-modify-write
/// cycles is done by the caller (see [`crate::guard::AbuseGuard`]).
pub trait LogStore: Send + Sync {
    /// Entry for an `(email, reason)` pair.
    fn get(
        &self,
        email: &str,
        reason: LogReason,
    ) -> impl Future<Output = Result<Option<AddressLogEntry>>> + Send;

    /// Any entry for `email`, whatever its reason.
    fn get_any(&self, email: &str) -> impl Future<Output = Result<Option<AddressLogEntry>>> + Send;

    /// Insert or replace the entry for `(entry.email, entry.reason)`.
    fn put(&self, entry: &AddressLogEntry) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry for `email`. Returns the number removed; zero is
    /// not an error.
    fn delete_all(&self, email: &str) -> impl Future<Output = Result<u64>> + Send;
}
