//! Error types for the farmer

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the farmer
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Vault errors
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Vault corrupt: {0}")]
    VaultCorrupt(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(u32),

    #[error("Invalid wallet count: {0} (must be at least 1)")]
    InvalidWalletCount(usize),

    // Capability errors
    #[error("Capability failure: {0}")]
    Capability(String),

    #[error("Capability timed out after {0}s")]
    CapabilityTimeout(u64),

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    // Sink errors
    #[error("Sink delivery failed: {0}")]
    SinkDelivery(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error prevents startup (surfaces to the operator as a
    /// non-zero exit). Everything else is captured into persisted records.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this error came from the vault. A vault failure aborts the
    /// affected wallet's remaining activities but never the whole cycle.
    pub fn is_vault_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredential(_) | Error::VaultCorrupt(_) | Error::WalletNotFound(_)
        )
    }
}

// Conversion from rusqlite errors
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
