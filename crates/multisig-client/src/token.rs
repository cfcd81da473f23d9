//! The ERC-20 token held by the multisig.

use crate::abi::ERC20;
use crate::account::Account;
use crate::chain::{Connection, TxOutcome};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use multisig_error::Result;
use serde::Serialize;

/// Operations on the multisig's token.
#[async_trait]
pub trait TokenApi: Send + Sync {
    /// Returns the contract address for this token
    fn address(&self) -> Address;

    /// Returns the token name
    async fn name(&self) -> Result<String>;

    /// Returns the token symbol
    async fn symbol(&self) -> Result<String>;

    /// Returns the number of decimals
    async fn decimals(&self) -> Result<u8>;

    /// Returns the balance of the given address
    async fn balance_of(&self, owner: Address) -> Result<U256>;

    /// Returns the allowance for a spender
    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;

    /// Lets `spender` pull up to `amount` from `from`
    async fn approve(&self, from: &Account, spender: Address, amount: U256) -> Result<TxOutcome>;
}

/// Token metadata shown next to balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Contract address
    pub address: Address,
    /// Name, e.g. "Celo Dollar"
    pub name: String,
    /// Symbol, e.g. "cUSD"
    pub symbol: String,
    /// Display decimals
    pub decimals: u8,
}

impl TokenInfo {
    /// Reads name, symbol and decimals.
    pub async fn fetch<T: TokenApi + ?Sized>(token: &T) -> Result<Self> {
        Ok(Self {
            address: token.address(),
            name: token.name().await?,
            symbol: token.symbol().await?,
            decimals: token.decimals().await?,
        })
    }
}

/// ERC-20 client over a shared [`Connection`].
#[derive(Clone, Debug)]
pub struct TokenClient {
    address: Address,
    conn: Connection,
}

impl TokenClient {
    /// Creates a token client for the contract at `address`
    pub fn new(address: Address, conn: Connection) -> Self {
        Self { address, conn }
    }
}

#[async_trait]
impl TokenApi for TokenClient {
    fn address(&self) -> Address {
        self.address
    }

    async fn name(&self) -> Result<String> {
        let address = self.address;
        self.conn
            .read("name", |p| async move { ERC20::new(address, p).name().call().await })
            .await
    }

    async fn symbol(&self) -> Result<String> {
        let address = self.address;
        self.conn
            .read("symbol", |p| async move { ERC20::new(address, p).symbol().call().await })
            .await
    }

    async fn decimals(&self) -> Result<u8> {
        let address = self.address;
        self.conn
            .read("decimals", |p| async move { ERC20::new(address, p).decimals().call().await })
            .await
    }

    async fn balance_of(&self, owner: Address) -> Result<U256> {
        let address = self.address;
        self.conn
            .read("balanceOf", |p| async move {
                ERC20::new(address, p).balanceOf(owner).call().await
            })
            .await
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        let address = self.address;
        self.conn
            .read("allowance", |p| async move {
                ERC20::new(address, p).allowance(owner, spender).call().await
            })
            .await
    }

    async fn approve(&self, from: &Account, spender: Address, amount: U256) -> Result<TxOutcome> {
        let address = self.address;
        let sender = from.address();
        self.conn
            .send("approve", from, |p| async move {
                ERC20::new(address, p)
                    .approve(spender, amount)
                    .from(sender)
                    .send()
                    .await
            })
            .await
    }
}
