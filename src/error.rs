//! Error types for the operator service

use ethers::types::H256;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the operator service
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contract interface error: {0}")]
    Interface(String),

    #[error("Encoding error for {method}: {message}")]
    Encoding { method: String, message: String },

    #[error("Decoding error for {method}: {message}")]
    Decoding { method: String, message: String },

    #[error("Remote call error: {0}")]
    Remote(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Timeout waiting {waited:?} for transaction {tx_hash:?}; it may still confirm")]
    Timeout { tx_hash: H256, waited: Duration },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("{source} ({} transactions submitted before the failure)", .submitted.len())]
    PartialSubmission {
        submitted: Vec<H256>,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OperatorError {
    /// Check if the caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::Remote(_)
            | OperatorError::Broadcast(_)
            | OperatorError::GasEstimation(_)
            | OperatorError::Signing(_) => true,
            OperatorError::PartialSubmission { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether a nonce was spent before the failure.
    ///
    /// `false` means the same nonce is handed to the next sender. `true` means at
    /// least one transaction left the process and must be reconciled by hash.
    pub fn nonce_consumed(&self) -> bool {
        match self {
            OperatorError::Timeout { .. } => true,
            OperatorError::PartialSubmission { submitted, .. } => !submitted.is_empty(),
            _ => false,
        }
    }

    /// Hashes already broadcast when this error was raised
    pub fn submitted(&self) -> Vec<H256> {
        match self {
            OperatorError::Timeout { tx_hash, .. } => vec![*tx_hash],
            OperatorError::PartialSubmission { submitted, .. } => submitted.clone(),
            _ => Vec::new(),
        }
    }

    /// Short label of the failing stage, used for metrics
    pub fn stage(&self) -> &'static str {
        match self {
            OperatorError::Encoding { .. } => "encode",
            OperatorError::Decoding { .. } => "decode",
            OperatorError::Remote(_) => "remote",
            OperatorError::GasEstimation(_) => "gas",
            OperatorError::Signing(_) => "sign",
            OperatorError::Broadcast(_) => "broadcast",
            OperatorError::Timeout { .. } => "timeout",
            OperatorError::PartialSubmission { source, .. } => source.stage(),
            _ => "other",
        }
    }

    pub(crate) fn encoding(method: &str, message: impl ToString) -> Self {
        OperatorError::Encoding {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn decoding(method: &str, message: impl ToString) -> Self {
        OperatorError::Decoding {
            method: method.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type for operator operations
pub type OperatorResult<T> = Result<T, OperatorError>;
