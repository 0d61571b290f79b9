//! Error types for the core library.

use thiserror::Error;

use crate::notify::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The local-part carries no usable `<digits><unit>` prefix.
    #[error("Invalid delay: {0}")]
    InvalidDelay(String),

    /// None of the recipients is a delay address.
    #[error("Could not find a delay address")]
    NoDelayAddress,

    /// The address is already claimed by another account.
    #[error("Address already belongs to another account: {0}")]
    IdentityTaken(String),

    /// The address was already confirmed; there is nothing to activate.
    #[error("Address is already confirmed: {0}")]
    IdentityActive(String),

    /// Handing a notification to the transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Address log or identity storage failed.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
