//! # multisig-client
//!
//! Client for a deployed `SimpleERC20Multisig` contract: a wallet that holds
//! one ERC-20 token and releases it once enough owners confirm a transfer.
//!
//! ## Features
//!
//! - **Chain access**: typed contract reads with retry and endpoint failover,
//!   writes signed locally or by the node
//! - **Wallet adapter**: account sources, active account, change events
//! - **Transaction feed**: contract records joined with indexer event logs,
//!   with polling
//! - **Actions**: submit, confirm, execute, approve and deposit with the
//!   same checks the contract enforces
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multisig_client::prelude::*;
//!
//! # async fn example() -> multisig_client::Result<()> {
//! let config = MultisigConfig::default();
//! let client = MultisigClient::new(config.multisig()?, config.provider_config())?;
//! let tracker = TransactionTracker::new(client, config.token_decimals);
//!
//! let view = tracker.fetch().await?;
//! for tx in &view.transactions {
//!     println!("#{} {} -> {} ({})", tx.id, tx.formatted_amount, tx.to, tx.readiness(view.threshold));
//! }
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod account;
pub mod actions;
pub mod amount;
pub mod balance;
pub mod chain;
pub mod config;
pub mod format;
pub mod indexer;
pub mod prelude;
pub mod token;
pub mod transactions;
pub mod wallet;

pub use account::Account;
pub use amount::{format_units, TokenAmount, DEFAULT_TOKEN_DECIMALS};
pub use chain::{Connection, MultisigClient, MultisigReader, MultisigWriter, OnChainTransaction, TxOutcome};
pub use config::{AccountSourceKind, MultisigConfig};
pub use indexer::{EventSource, IndexerClient, IndexerSnapshot};
pub use token::{TokenApi, TokenClient, TokenInfo};
pub use transactions::{reconcile, FeedState, TransactionRecord, TransactionTracker, TransactionView, TxStatus};
pub use wallet::{AccountSource, LocalAccounts, NodeAccounts, Wallet, WalletEvent, WalletState};

pub use multisig_error::{ErrorCode, ErrorContext, MultisigError, Result};

use multisig_provider::ProviderError;

/// Maps a transport failure on `url` while calling `method`.
pub(crate) fn provider_error(url: &str, method: &str, err: ProviderError) -> MultisigError {
    match err {
        ProviderError::RpcError { code: 4001, message } => MultisigError::WalletRejected(message),
        ProviderError::RpcError { code, message } => MultisigError::RpcRequestError {
            method: method.to_string(),
            reason: format!("code {code}: {message}"),
        },
        ProviderError::Timeout(seconds) => MultisigError::NetworkTimeout { seconds },
        ProviderError::Status { status: 429, .. } => MultisigError::RateLimited { retry_after_secs: 1 },
        e if e.is_transient() => MultisigError::RpcConnectionError {
            url: url.to_string(),
            reason: e.to_string(),
        },
        e => MultisigError::RpcRequestError {
            method: method.to_string(),
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let rejected = provider_error("u", "eth_requestAccounts", ProviderError::RpcError {
            code: 4001,
            message: "User rejected the request.".into(),
        });
        assert!(matches!(rejected, MultisigError::WalletRejected(_)));

        let timeout = provider_error("u", "eth_accounts", ProviderError::Timeout(30));
        assert!(timeout.is_retryable());

        let busy = provider_error("u", "eth_accounts", ProviderError::Status { status: 503, body: String::new() });
        assert!(matches!(busy, MultisigError::RpcConnectionError { .. }));

        let limited = provider_error("u", "eth_accounts", ProviderError::Status { status: 429, body: String::new() });
        assert_eq!(limited.retry_after(), Some(1));

        let bad = provider_error("u", "eth_chainId", ProviderError::Status { status: 400, body: String::new() });
        assert!(matches!(bad, MultisigError::RpcRequestError { .. }));
        assert!(!bad.is_retryable());
    }
}
