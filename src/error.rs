//! Error types for the escrow tooling

use thiserror::Error;

/// Main error type for deployment and swap workflows
#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Invalid address {0:?}")]
    InvalidAddress(String),

    #[error("Compilation failed:\n{}", diagnostics.join("\n"))]
    Compilation { diagnostics: Vec<String> },

    #[error("Contract {contract} not found in compiler output")]
    ArtifactNotFound { contract: String },

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Gas estimation error: {0}")]
    Estimation(String),

    #[error("Call would revert: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Timed out after {waited_secs}s waiting for confirmations of {tx_hash}")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    #[error("Reorg detected: transaction {tx_hash} is no longer included")]
    ReorgDetected { tx_hash: String },

    #[error("No signer registered for {address}")]
    SignerNotRegistered { address: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EscrowError {
    /// Check if the error was raised before any network I/O took place
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EscrowError::Config(_)
                | EscrowError::InvalidMnemonic(_)
                | EscrowError::MissingParameter(_)
                | EscrowError::InvalidParameter { .. }
                | EscrowError::InvalidAddress(_)
                | EscrowError::Compilation { .. }
                | EscrowError::ArtifactNotFound { .. }
                | EscrowError::SignerNotRegistered { .. }
        )
    }

    pub(crate) fn invalid(name: &str, message: impl Into<String>) -> Self {
        EscrowError::InvalidParameter {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
