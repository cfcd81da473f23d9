//! # Multisig Error
//!
//! Unified error types for the multisig wallet client. Every crate in the
//! workspace reports failures through [`MultisigError`] so the CLI can map
//! them to one consistent set of messages and exit codes.
//!
//! ## Error Categories
//!
//! - address and amount validation
//! - wallet connection state
//! - multisig transaction eligibility (executed, confirmations, ownership)
//! - network / RPC failures
//! - contract calls and reverts
//! - indexer (GraphQL) failures
//!
//! ## Example
//!
//! ```
//! use multisig_error::{MultisigError, Result};
//!
//! fn require_amount(amount: &str) -> Result<()> {
//!     if amount.trim().is_empty() {
//!         return Err(MultisigError::MissingField("amount".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use thiserror::Error;

/// The main error type for multisig client operations.
#[derive(Error, Debug)]
pub enum MultisigError {
    // ============ Input Errors ============
    /// Invalid address format or checksum
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The invalid address
        address: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A required form field was left empty
    #[error("Please fill in all fields (missing {0})")]
    MissingField(String),

    /// Amount could not be parsed or is not positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount overflow during calculation
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    // ============ Wallet Errors ============
    /// No account source is available (no keys, no node accounts)
    #[error("No wallet found: {0}")]
    NoWalletFound(String),

    /// An action needs a connected account
    #[error("Please connect your wallet first")]
    WalletNotConnected,

    /// The requested account is not offered by the account source
    #[error("Account {0} is not available from the connected wallet")]
    AccountNotAvailable(String),

    /// The account source refused the request
    #[error("Wallet request rejected: {0}")]
    WalletRejected(String),

    // ============ Multisig Transaction Errors ============
    /// Transaction id not present on chain
    #[error("Transaction {0} not found")]
    TransactionNotFound(u64),

    /// Transaction was already executed
    #[error("Transaction {0} has already been executed")]
    AlreadyExecuted(u64),

    /// Transaction lacks confirmations for execution
    #[error("Transaction {id} needs {need} confirmations, has {have}")]
    InsufficientConfirmations {
        /// Transaction id
        id: u64,
        /// Current confirmations
        have: u64,
        /// Threshold
        need: u64,
    },

    /// Owner already confirmed the transaction
    #[error("{owner} has already confirmed transaction {id}")]
    AlreadyConfirmed {
        /// Transaction id
        id: u64,
        /// Confirming owner
        owner: String,
    },

    /// Account is not one of the multisig owners
    #[error("{0} is not an owner of this multisig")]
    NotOwner(String),

    /// Token allowance is lower than the requested deposit
    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance {
        /// Current allowance (smallest unit)
        have: String,
        /// Required allowance (smallest unit)
        need: String,
    },

    /// Transaction was mined but reverted
    #[error("Transaction {0} reverted")]
    TransactionReverted(String),

    /// Transaction could not be broadcast
    #[error("Failed to send transaction: {0}")]
    BroadcastError(String),

    // ============ Network Errors ============
    /// RPC connection failed
    #[error("RPC connection failed: {url} - {reason}")]
    RpcConnectionError {
        /// RPC URL
        url: String,
        /// Error reason
        reason: String,
    },

    /// RPC request failed
    #[error("RPC request failed: {method} - {reason}")]
    RpcRequestError {
        /// RPC method or contract function
        method: String,
        /// Error reason
        reason: String,
    },

    /// Network timeout
    #[error("Network timeout after {seconds}s")]
    NetworkTimeout {
        /// Timeout duration
        seconds: u64,
    },

    /// Rate limited by provider
    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay
        retry_after_secs: u64,
    },

    /// Connected to an unexpected chain
    #[error("Invalid chain ID: expected {expected}, got {got}")]
    ChainIdMismatch {
        /// Expected chain ID
        expected: u64,
        /// Actual chain ID
        got: u64,
    },

    // ============ Contract Errors ============
    /// Contract call reverted
    #[error("Contract call reverted: {0}")]
    ContractReverted(String),

    /// Contract call failed for another reason
    #[error("Contract call failed: {0}")]
    ContractError(String),

    /// ABI encoding/decoding error
    #[error("ABI error: {0}")]
    AbiError(String),

    // ============ Indexer Errors ============
    /// Indexer request failed or returned GraphQL errors
    #[error("Indexer error: {0}")]
    IndexerError(String),

    /// Indexer is not configured
    #[error("Indexer URL not configured")]
    IndexerNotConfigured,

    // ============ Parsing Errors ============
    /// JSON parse error
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Invalid format
    #[error("Invalid format: {0}")]
    FormatError(String),

    // ============ IO / Config ============
    /// File IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ Generic ============
    /// Unknown/other error
    #[error("{0}")]
    Other(String),

    /// Wrapped error from external source
    #[error("External error: {message}")]
    External {
        /// Error message
        message: String,
    },
}

/// Convenient Result type using MultisigError
pub type Result<T> = std::result::Result<T, MultisigError>;

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Adds context to an error
    fn context(self, ctx: impl Into<String>) -> Result<T>;

    /// Adds context using a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| MultisigError::External {
            message: format!("{}: {}", ctx.into(), e),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| MultisigError::External {
            message: format!("{}: {}", f(), e),
        })
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| MultisigError::Other(ctx.into()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| MultisigError::Other(f()))
    }
}

// ============ From implementations for common error types ============

impl From<std::io::Error> for MultisigError {
    fn from(err: std::io::Error) -> Self {
        MultisigError::IoError(err.to_string())
    }
}

impl From<std::num::ParseIntError> for MultisigError {
    fn from(err: std::num::ParseIntError) -> Self {
        MultisigError::FormatError(err.to_string())
    }
}

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ErrorCode {
    /// Unknown error
    Unknown = 0,
    /// Invalid address
    InvalidAddress = 1001,
    /// Missing form field
    MissingField = 1002,
    /// Invalid amount
    InvalidAmount = 2001,
    /// Amount overflow
    AmountOverflow = 2002,
    /// Insufficient allowance
    InsufficientAllowance = 2003,
    /// No wallet found
    NoWalletFound = 3001,
    /// Wallet not connected
    WalletNotConnected = 3002,
    /// Account not available
    AccountNotAvailable = 3003,
    /// Transaction not found
    TransactionNotFound = 4001,
    /// Already executed
    AlreadyExecuted = 4002,
    /// Insufficient confirmations
    InsufficientConfirmations = 4003,
    /// Already confirmed
    AlreadyConfirmed = 4004,
    /// Not an owner
    NotOwner = 4005,
    /// Transaction reverted
    TransactionReverted = 4006,
    /// RPC connection error
    RpcConnectionError = 5001,
    /// RPC request error
    RpcRequestError = 5002,
    /// Network timeout
    NetworkTimeout = 5003,
    /// Rate limited
    RateLimited = 5004,
    /// Contract error
    ContractError = 6001,
    /// Indexer error
    IndexerError = 7001,
    /// Configuration error
    ConfigError = 8001,
}

impl MultisigError {
    /// Returns the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            MultisigError::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            MultisigError::MissingField(_) => ErrorCode::MissingField,
            MultisigError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            MultisigError::AmountOverflow(_) => ErrorCode::AmountOverflow,
            MultisigError::InsufficientAllowance { .. } => ErrorCode::InsufficientAllowance,
            MultisigError::NoWalletFound(_) => ErrorCode::NoWalletFound,
            MultisigError::WalletNotConnected => ErrorCode::WalletNotConnected,
            MultisigError::AccountNotAvailable(_) => ErrorCode::AccountNotAvailable,
            MultisigError::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            MultisigError::AlreadyExecuted(_) => ErrorCode::AlreadyExecuted,
            MultisigError::InsufficientConfirmations { .. } => {
                ErrorCode::InsufficientConfirmations
            }
            MultisigError::AlreadyConfirmed { .. } => ErrorCode::AlreadyConfirmed,
            MultisigError::NotOwner(_) => ErrorCode::NotOwner,
            MultisigError::TransactionReverted(_) => ErrorCode::TransactionReverted,
            MultisigError::RpcConnectionError { .. } => ErrorCode::RpcConnectionError,
            MultisigError::RpcRequestError { .. } => ErrorCode::RpcRequestError,
            MultisigError::NetworkTimeout { .. } => ErrorCode::NetworkTimeout,
            MultisigError::RateLimited { .. } => ErrorCode::RateLimited,
            MultisigError::ContractReverted(_) | MultisigError::ContractError(_) => {
                ErrorCode::ContractError
            }
            MultisigError::IndexerError(_) | MultisigError::IndexerNotConfigured => {
                ErrorCode::IndexerError
            }
            MultisigError::ConfigError(_) => ErrorCode::ConfigError,
            _ => ErrorCode::Unknown,
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MultisigError::NetworkTimeout { .. }
                | MultisigError::RateLimited { .. }
                | MultisigError::RpcConnectionError { .. }
        )
    }

    /// Returns suggested retry delay in seconds, if applicable
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            MultisigError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            MultisigError::NetworkTimeout { seconds } => Some(*seconds / 2),
            _ if self.is_retryable() => Some(5),
            _ => None,
        }
    }

    /// True for failures caused by user input rather than the chain or network
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidAddress
                | ErrorCode::MissingField
                | ErrorCode::InvalidAmount
                | ErrorCode::WalletNotConnected
                | ErrorCode::AccountNotAvailable
        )
    }
}
