//! # maildelay-core
//!
//! Core logic for `maildelay`, a service that holds mail back until the
//! delay encoded in its recipient address has passed.
//!
//! This crate provides:
//! - **Delay addresses** - decode `<amount><unit>.<key>@host` recipients
//! - **Correlation keys** - short random keys and stable local identifiers
//! - **Subject cleanup** - strip reply/forward prefixes
//! - **Abuse guard** - per-recipient rate limiting of transactional mails
//! - **Notifications** - guard-gated registration, wrong-recipient,
//!   activation and connection mails
//! - **Provisioning** - secondary identities sharing an owner's credential
//! - Local storage (`SQLite`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod addresslog;
pub mod clock;
pub mod config;
mod error;
pub mod guard;
pub mod key;
pub mod notify;
pub mod provision;
pub mod subject;

pub use address::{AddressCodec, DelaySpec, DelayUnitTable, Recipient};
pub use addresslog::{
    AddressLogEntry, AddressLogRepository, InMemoryAddressLog, LogReason, LogStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use guard::{AbuseGuard, BlockSchedule, SendOutcome, Suppression};
pub use key::{KeyGenerator, derive_local_id};
pub use notify::{Notification, NotificationDispatcher, Template, Transport, TransportError};
pub use provision::{
    AccountId, AccountProvisioner, Identity, IdentityRepository, IdentityStore, ProvisionOutcome,
};
pub use subject::SubjectNormalizer;
