//! Error types for the airdrop distributor

use std::fmt;

use alloy_primitives::{Address, TxHash};
use thiserror::Error;

/// Result type alias
pub type AirdropResult<T> = std::result::Result<T, AirdropError>;

/// Contiguous slice of recipients, used in every diagnostic that has to point
/// the operator at the addresses affected by a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    /// Snapshot index of the first recipient (inclusive)
    pub start: usize,
    /// Snapshot index of the last recipient (inclusive)
    pub end: usize,
    pub first: Address,
    pub last: Address,
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}..=#{} ({}..{})",
            self.start, self.end, self.first, self.last
        )
    }
}

/// Error raised by the chain adapter. Callers decide which taxonomy entry it
/// maps to, since the same RPC failure means different things on the read and
/// write paths.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call error: {0}")]
    ContractCall(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(TxHash),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Main error type for the distributor
#[derive(Debug, Error)]
pub enum AirdropError {
    /// Snapshot could not be parsed or failed validation. Fatal, pre-flight.
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A balance query chunk failed after all retries.
    #[error("Balance query failed for {range}: {source}")]
    OracleQueryFailed {
        range: AddressRange,
        #[source]
        source: ChainError,
    },

    /// A mint batch could not be sent, or its fate is unknown. Fatal for the run.
    #[error("Submission of batch {batch} (nonce {nonce}) failed for {range}: {source}")]
    SubmissionFailed {
        batch: usize,
        nonce: u64,
        range: AddressRange,
        #[source]
        source: ChainError,
    },

    /// A mint batch was mined but reverted. The nonce is consumed.
    #[error("Batch {batch} (nonce {nonce}, tx {tx_hash}) reverted for {range}")]
    ConfirmationReverted {
        batch: usize,
        nonce: u64,
        tx_hash: TxHash,
        range: AddressRange,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for AirdropError {
    fn from(err: config::ConfigError) -> Self {
        AirdropError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_range_display() {
        let range = AddressRange {
            start: 3,
            end: 7,
            first: Address::repeat_byte(0x11),
            last: Address::repeat_byte(0x22),
        };

        let rendered = range.to_string();
        assert!(rendered.starts_with("#3..=#7 ("));
        assert!(rendered.contains(&Address::repeat_byte(0x11).to_string()));
        assert!(rendered.contains(&Address::repeat_byte(0x22).to_string()));
    }

    #[test]
    fn test_submission_failed_mentions_range() {
        let range = AddressRange {
            start: 0,
            end: 1,
            first: Address::repeat_byte(0xaa),
            last: Address::repeat_byte(0xbb),
        };
        let err = AirdropError::SubmissionFailed {
            batch: 2,
            nonce: 41,
            range,
            source: ChainError::Rpc("connection reset".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("batch 2"));
        assert!(message.contains("nonce 41"));
        assert!(message.contains(&range.to_string()));
    }
}
