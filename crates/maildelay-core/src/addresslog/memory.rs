//! In-memory address log.
//!
//! Used by tests and by hosts that embed the guard without a database.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::model::{AddressLogEntry, LogReason};
use super::store::LogStore;
use crate::Result;

/// In-memory implementation of [`LogStore`].
#[derive(Debug, Default)]
pub struct InMemoryAddressLog {
    entries: RwLock<HashMap<(String, LogReason), AddressLogEntry>>,
}

impl InMemoryAddressLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, ordered by email then reason.
    #[must_use]
    pub fn entries(&self) -> Vec<AddressLogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<AddressLogEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| (&a.email, a.reason).cmp(&(&b.email, b.reason)));
        all
    }
}

impl LogStore for InMemoryAddressLog {
    async fn get(&self, email: &str, reason: LogReason) -> Result<Option<AddressLogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(email.to_string(), reason)).cloned())
    }

    async fn get_any(&self, email: &str) -> Result<Option<AddressLogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(LogReason::ALL
            .iter()
            .find_map(|&reason| entries.get(&(email.to_string(), reason)))
            .cloned())
    }

    async fn put(&self, entry: &AddressLogEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert((entry.email.clone(), entry.reason), entry.clone());
        Ok(())
    }

    async fn delete_all(&self, email: &str) -> Result<u64> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(tracked, _), _| tracked != email);
        Ok((before - entries.len()) as u64)
    }
}
