//! On-chain access to the multisig contract.
//!
//! Reads go through the configured endpoint set with exponential backoff and
//! fail over to fallback URLs when the active endpoint turns unhealthy. Writes
//! are sent once and awaited until the receipt is mined.

use crate::abi::SimpleERC20Multisig;
use crate::account::Account;
use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::json_rpc::ErrorPayload;
use alloy::transports::{http::reqwest::Url, TransportError};
use async_trait::async_trait;
use multisig_error::{MultisigError, Result};
use multisig_provider::{with_backoff, BackoffError, EndpointSet, ProviderConfig};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A transaction as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainTransaction {
    /// Recipient of the transfer
    pub to: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
    /// Whether the transfer has been executed
    pub executed: bool,
    /// Number of owner confirmations
    pub confirmations: u64,
}

/// Result of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutcome {
    /// Transaction hash
    pub tx_hash: TxHash,
    /// Block the transaction was mined in
    pub block_number: Option<u64>,
    /// Multisig transaction id, set by `submitTransaction`
    pub tx_id: Option<u64>,
}

/// Read access to the multisig contract.
#[async_trait]
pub trait MultisigReader: Send + Sync {
    /// Contract address
    fn address(&self) -> Address;

    /// Confirmations required to execute
    async fn threshold(&self) -> Result<u64>;

    /// Address of the held ERC20 token
    async fn token(&self) -> Result<Address>;

    /// Token balance held by the multisig
    async fn token_balance(&self) -> Result<U256>;

    /// Owner at `index`. Reverts past the end of the owner list.
    async fn owner(&self, index: u64) -> Result<Address>;

    /// Whether `account` is an owner
    async fn is_owner(&self, account: Address) -> Result<bool>;

    /// Whether `owner` has confirmed transaction `id`
    async fn has_confirmed(&self, id: u64, owner: Address) -> Result<bool>;

    /// Transaction `id`, or [`MultisigError::TransactionNotFound`] past the end
    async fn transaction(&self, id: u64) -> Result<OnChainTransaction>;

    /// All owners, read by index until the contract reverts.
    async fn owners(&self, max: u64) -> Result<Vec<Address>> {
        let mut owners = Vec::new();
        for index in 0..max {
            match self.owner(index).await {
                Ok(owner) => owners.push(owner),
                Err(MultisigError::ContractReverted(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(owners)
    }
}

/// State-changing calls on the multisig contract.
#[async_trait]
pub trait MultisigWriter: Send + Sync {
    /// Proposes a transfer and returns the new transaction id in the outcome
    async fn submit_transaction(&self, from: &Account, to: Address, amount: U256) -> Result<TxOutcome>;

    /// Adds `from`'s confirmation to transaction `id`
    async fn confirm_transaction(&self, from: &Account, id: u64) -> Result<TxOutcome>;

    /// Executes transaction `id`
    async fn execute_transaction(&self, from: &Account, id: u64) -> Result<TxOutcome>;

    /// Pulls `amount` tokens from `from` into the multisig (needs allowance)
    async fn deposit_tokens(&self, from: &Account, amount: U256) -> Result<TxOutcome>;
}

/// Endpoint handling shared by the contract clients.
#[derive(Clone, Debug)]
pub struct Connection {
    endpoints: Arc<EndpointSet>,
}

impl Connection {
    /// Creates a connection over the configured endpoints
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let endpoints = EndpointSet::new(config)
            .map_err(|e| MultisigError::ConfigError(e.to_string()))?;
        Ok(Self {
            endpoints: Arc::new(endpoints),
        })
    }

    /// The endpoint set, for health reporting
    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    fn parse_url(url: &str) -> Result<Url> {
        url.parse().map_err(|e| MultisigError::RpcConnectionError {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })
    }

    fn read_provider(url: &str) -> Result<DynProvider> {
        Ok(ProviderBuilder::new()
            .connect_http(Self::parse_url(url)?)
            .erased())
    }

    fn send_provider(url: &str, from: &Account) -> Result<DynProvider> {
        let url = Self::parse_url(url)?;
        Ok(match from {
            Account::Local(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer.clone()))
                .connect_http(url)
                .erased(),
            Account::Node(_) => ProviderBuilder::new().connect_http(url).erased(),
        })
    }

    /// Runs a read-only call with backoff, recording endpoint health.
    pub async fn read<T, F, Fut>(&self, method: &'static str, f: F) -> Result<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = std::result::Result<T, alloy::contract::Error>>,
    {
        let backoff = self.endpoints.config().backoff();
        with_backoff(backoff, MultisigError::is_retryable, || async {
            let url = self.endpoints.current_url().await;
            let provider = Self::read_provider(&url)?;
            let started = Instant::now();
            match f(provider).await {
                Ok(value) => {
                    self.endpoints
                        .record_success(started.elapsed().as_millis() as u64)
                        .await;
                    Ok(value)
                }
                Err(e) => {
                    let err = call_error(method, &url, e);
                    if err.is_retryable() {
                        self.endpoints.record_failure().await;
                    }
                    debug!(method, %url, error = %err, "read failed");
                    Err(err)
                }
            }
        })
        .await
        .map_err(BackoffError::into_inner)
    }

    /// Reads the chain id from the active endpoint
    pub async fn chain_id(&self) -> Result<u64> {
        self.read("eth_chainId", |provider| async move {
            provider
                .get_chain_id()
                .await
                .map_err(alloy::contract::Error::TransportError)
        })
        .await
    }

    /// Sends a transaction built by `f` and waits for its receipt.
    ///
    /// Never retried: a resend after a timeout could land twice.
    pub async fn send<F, Fut>(&self, method: &'static str, from: &Account, f: F) -> Result<TxOutcome>
    where
        F: FnOnce(DynProvider) -> Fut,
        Fut: Future<Output = std::result::Result<PendingTransactionBuilder<Ethereum>, alloy::contract::Error>>,
    {
        let url = self.endpoints.current_url().await;
        let provider = Self::send_provider(&url, from)?;

        let pending = f(provider).await.map_err(|e| send_error(method, &url, e))?;
        let tx_hash = *pending.tx_hash();
        info!(method, from = %from.address(), %tx_hash, "transaction sent");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| MultisigError::BroadcastError(format!("{method}: failed to get receipt: {e}")))?;

        if !receipt.status() {
            warn!(method, %tx_hash, "transaction reverted");
            return Err(MultisigError::TransactionReverted(format!("{tx_hash:?}")));
        }

        info!(method, %tx_hash, block = ?receipt.block_number, "transaction mined");
        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            tx_id: None,
        })
    }
}

/// JSON-RPC error codes nodes and gateways use for throttling.
const RATE_LIMIT_CODES: [i64; 2] = [-32005, 429];

/// True when the node reports that the EVM reverted the call.
fn is_revert(payload: &ErrorPayload) -> bool {
    payload.code == 3
        || payload.as_revert_data().is_some()
        || payload.message.to_ascii_lowercase().contains("execution reverted")
}

fn is_rate_limit(payload: &ErrorPayload) -> bool {
    RATE_LIMIT_CODES.contains(&payload.code)
        || payload.message.to_ascii_lowercase().contains("rate limit")
}

/// Classifies a transport-level failure.
///
/// Only a real revert becomes `ContractReverted`; callers treat it as the end
/// of an on-chain list. Failures below JSON-RPC are retryable connection errors.
fn transport_error(method: &str, url: &str, err: TransportError) -> MultisigError {
    match err.as_error_resp() {
        Some(payload) if is_revert(payload) => {
            MultisigError::ContractReverted(format!("{method}: {}", payload.message))
        }
        Some(payload) if is_rate_limit(payload) => {
            warn!(method, %url, code = payload.code, "node is rate limiting");
            MultisigError::RateLimited { retry_after_secs: 1 }
        }
        Some(payload) if payload.code == 4001 => MultisigError::WalletRejected(payload.message.to_string()),
        Some(payload) => MultisigError::RpcRequestError {
            method: method.to_string(),
            reason: format!("code {}: {}", payload.code, payload.message),
        },
        None => MultisigError::RpcConnectionError {
            url: url.to_string(),
            reason: err.to_string(),
        },
    }
}

fn call_error(method: &str, url: &str, err: alloy::contract::Error) -> MultisigError {
    match err {
        alloy::contract::Error::TransportError(e) => transport_error(method, url, e),
        other => MultisigError::ContractError(format!("{method}: {other}")),
    }
}

fn send_error(method: &str, url: &str, err: alloy::contract::Error) -> MultisigError {
    match err {
        alloy::contract::Error::TransportError(e) => transport_error(method, url, e),
        other => MultisigError::BroadcastError(format!("{method}: {other}")),
    }
}

pub(crate) fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| MultisigError::AmountOverflow(format!("{field} {value} does not fit in u64")))
}

/// Client for a deployed multisig contract.
#[derive(Clone, Debug)]
pub struct MultisigClient {
    address: Address,
    conn: Connection,
}

impl MultisigClient {
    /// Creates a client for the contract at `address`
    pub fn new(address: Address, config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            address,
            conn: Connection::new(config)?,
        })
    }

    /// Creates a client sharing an existing connection
    pub fn with_connection(address: Address, conn: Connection) -> Self {
        Self { address, conn }
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fails unless the endpoint serves `expected`.
    pub async fn verify_chain(&self, expected: u64) -> Result<()> {
        let got = self.conn.chain_id().await?;
        if got != expected {
            return Err(MultisigError::ChainIdMismatch { expected, got });
        }
        Ok(())
    }
}

#[async_trait]
impl MultisigReader for MultisigClient {
    fn address(&self) -> Address {
        self.address
    }

    async fn threshold(&self) -> Result<u64> {
        let address = self.address;
        let threshold = self
            .conn
            .read("threshold", |p| async move {
                SimpleERC20Multisig::new(address, p).threshold().call().await
            })
            .await?;
        to_u64(threshold, "threshold")
    }

    async fn token(&self) -> Result<Address> {
        let address = self.address;
        self.conn
            .read("token", |p| async move {
                SimpleERC20Multisig::new(address, p).token().call().await
            })
            .await
    }

    async fn token_balance(&self) -> Result<U256> {
        let address = self.address;
        self.conn
            .read("tokenBalance", |p| async move {
                SimpleERC20Multisig::new(address, p).tokenBalance().call().await
            })
            .await
    }

    async fn owner(&self, index: u64) -> Result<Address> {
        let address = self.address;
        self.conn
            .read("owners", |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .owners(U256::from(index))
                    .call()
                    .await
            })
            .await
    }

    async fn is_owner(&self, account: Address) -> Result<bool> {
        let address = self.address;
        self.conn
            .read("isOwner", |p| async move {
                SimpleERC20Multisig::new(address, p).isOwner(account).call().await
            })
            .await
    }

    async fn has_confirmed(&self, id: u64, owner: Address) -> Result<bool> {
        let address = self.address;
        self.conn
            .read("hasConfirmed", |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .hasConfirmed(U256::from(id), owner)
                    .call()
                    .await
            })
            .await
    }

    async fn transaction(&self, id: u64) -> Result<OnChainTransaction> {
        let address = self.address;
        let raw = self
            .conn
            .read("transactions", |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .transactions(U256::from(id))
                    .call()
                    .await
            })
            .await
            .map_err(|e| match e {
                MultisigError::ContractReverted(_) => MultisigError::TransactionNotFound(id),
                other => other,
            })?;

        Ok(OnChainTransaction {
            to: raw.to,
            amount: raw.amount,
            executed: raw.executed,
            confirmations: to_u64(raw.confirmations, "confirmations")?,
        })
    }
}

#[async_trait]
impl MultisigWriter for MultisigClient {
    async fn submit_transaction(&self, from: &Account, to: Address, amount: U256) -> Result<TxOutcome> {
        let address = self.address;
        let sender = from.address();

        // The id comes from a dry run against current state; a concurrent
        // submit from another owner can shift it by one.
        let tx_id = self
            .conn
            .read("submitTransaction", |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .submitTransaction(to, amount)
                    .from(sender)
                    .call()
                    .await
            })
            .await?;
        let tx_id = to_u64(tx_id, "txId")?;

        let mut outcome = self
            .conn
            .send("submitTransaction", from, |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .submitTransaction(to, amount)
                    .from(sender)
                    .send()
                    .await
            })
            .await?;
        outcome.tx_id = Some(tx_id);
        Ok(outcome)
    }

    async fn confirm_transaction(&self, from: &Account, id: u64) -> Result<TxOutcome> {
        let address = self.address;
        let sender = from.address();
        self.conn
            .send("confirmTransaction", from, |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .confirmTransaction(U256::from(id))
                    .from(sender)
                    .send()
                    .await
            })
            .await
    }

    async fn execute_transaction(&self, from: &Account, id: u64) -> Result<TxOutcome> {
        let address = self.address;
        let sender = from.address();
        self.conn
            .send("executeTransaction", from, |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .executeTransaction(U256::from(id))
                    .from(sender)
                    .send()
                    .await
            })
            .await
    }

    async fn deposit_tokens(&self, from: &Account, amount: U256) -> Result<TxOutcome> {
        let address = self.address;
        let sender = from.address();
        self.conn
            .send("depositTokens", from, |p| async move {
                SimpleERC20Multisig::new(address, p)
                    .depositTokens(amount)
                    .from(sender)
                    .send()
                    .await
            })
            .await
    }
}
