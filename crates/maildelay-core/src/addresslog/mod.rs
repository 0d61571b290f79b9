//! Address log.
//!
//! One record per `(recipient, reason)` remembering which transactional
//! notifications were already sent, so the abuse guard can decide on the
//! next one.

mod memory;
mod model;
mod repository;
mod store;

pub use memory::InMemoryAddressLog;
pub use model::{AddressLogEntry, LogReason};
pub use repository::AddressLogRepository;
pub use store::LogStore;
