//! In-memory stand-ins for the contract, the token and the indexer.

#![allow(dead_code)]

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use multisig_client::indexer::IndexerSnapshot;
use multisig_client::{Account, EventSource, MultisigReader, MultisigWriter, OnChainTransaction, TokenApi, TxOutcome};
use multisig_error::{MultisigError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

pub fn outcome(n: u64) -> TxOutcome {
    TxOutcome {
        tx_hash: TxHash::with_last_byte(n as u8),
        block_number: Some(n),
        tx_id: None,
    }
}

#[derive(Default)]
pub struct MockState {
    pub threshold: u64,
    pub owners: Vec<Address>,
    pub txs: Vec<OnChainTransaction>,
    pub confirmed: HashSet<(u64, Address)>,
    pub token: Address,
    pub balance: U256,
    /// Threshold read fails with a connection error
    pub threshold_down: bool,
    /// `transaction(id)` fails with a connection error from this id on
    pub network_error_from: Option<u64>,
    /// Names of the write calls made, in order
    pub writes: Vec<String>,
}

/// Contract double that applies writes the way the contract would.
pub struct MockMultisig {
    pub address: Address,
    pub state: Mutex<MockState>,
    pub reads: AtomicU64,
    blocks: AtomicU64,
}

impl MockMultisig {
    pub fn new(threshold: u64, owners: Vec<Address>) -> Self {
        Self {
            address: addr(0xee),
            state: Mutex::new(MockState {
                threshold,
                owners,
                token: addr(0x70),
                ..MockState::default()
            }),
            reads: AtomicU64::new(0),
            blocks: AtomicU64::new(1),
        }
    }

    pub fn with_tx(self, to: Address, amount: u64, confirmations: u64, executed: bool) -> Self {
        self.state.lock().unwrap().txs.push(OnChainTransaction {
            to,
            amount: U256::from(amount),
            executed,
            confirmations,
        });
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    fn next_outcome(&self) -> TxOutcome {
        outcome(self.blocks.fetch_add(1, Ordering::SeqCst))
    }

    fn down() -> MultisigError {
        MultisigError::RpcConnectionError {
            url: "mock://node".into(),
            reason: "connection refused".into(),
        }
    }
}

#[async_trait]
impl MultisigReader for MockMultisig {
    fn address(&self) -> Address {
        self.address
    }

    async fn threshold(&self) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.threshold_down {
            return Err(Self::down());
        }
        Ok(state.threshold)
    }

    async fn token(&self) -> Result<Address> {
        Ok(self.state.lock().unwrap().token)
    }

    async fn token_balance(&self) -> Result<U256> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn owner(&self, index: u64) -> Result<Address> {
        self.state
            .lock()
            .unwrap()
            .owners
            .get(index as usize)
            .copied()
            .ok_or_else(|| MultisigError::ContractReverted("owners: out of bounds".into()))
    }

    async fn is_owner(&self, account: Address) -> Result<bool> {
        Ok(self.state.lock().unwrap().owners.contains(&account))
    }

    async fn has_confirmed(&self, id: u64, owner: Address) -> Result<bool> {
        Ok(self.state.lock().unwrap().confirmed.contains(&(id, owner)))
    }

    async fn transaction(&self, id: u64) -> Result<OnChainTransaction> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.network_error_from.is_some_and(|from| id >= from) {
            return Err(Self::down());
        }
        state
            .txs
            .get(id as usize)
            .cloned()
            .ok_or(MultisigError::TransactionNotFound(id))
    }
}

#[async_trait]
impl MultisigWriter for MockMultisig {
    async fn submit_transaction(&self, _from: &Account, to: Address, amount: U256) -> Result<TxOutcome> {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.writes.push("submitTransaction".into());
            state.txs.push(OnChainTransaction {
                to,
                amount,
                executed: false,
                confirmations: 0,
            });
            state.txs.len() as u64 - 1
        };
        let mut outcome = self.next_outcome();
        outcome.tx_id = Some(id);
        Ok(outcome)
    }

    async fn confirm_transaction(&self, from: &Account, id: u64) -> Result<TxOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.writes.push("confirmTransaction".into());
            state.confirmed.insert((id, from.address()));
            let tx = state
                .txs
                .get_mut(id as usize)
                .ok_or(MultisigError::TransactionNotFound(id))?;
            tx.confirmations += 1;
        }
        Ok(self.next_outcome())
    }

    async fn execute_transaction(&self, _from: &Account, id: u64) -> Result<TxOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.writes.push("executeTransaction".into());
            let amount = {
                let tx = state
                    .txs
                    .get_mut(id as usize)
                    .ok_or(MultisigError::TransactionNotFound(id))?;
                tx.executed = true;
                tx.amount
            };
            state.balance = state.balance.saturating_sub(amount);
        }
        Ok(self.next_outcome())
    }

    async fn deposit_tokens(&self, _from: &Account, amount: U256) -> Result<TxOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.writes.push("depositTokens".into());
            state.balance += amount;
        }
        Ok(self.next_outcome())
    }
}

/// ERC-20 double tracking allowances per (owner, spender).
#[derive(Default)]
pub struct MockToken {
    pub allowances: Mutex<HashMap<(Address, Address), U256>>,
    pub approvals: Mutex<Vec<(Address, U256)>>,
}

#[async_trait]
impl TokenApi for MockToken {
    fn address(&self) -> Address {
        addr(0x70)
    }

    async fn name(&self) -> Result<String> {
        Ok("Celo Dollar".into())
    }

    async fn symbol(&self) -> Result<String> {
        Ok("cUSD".into())
    }

    async fn decimals(&self) -> Result<u8> {
        Ok(18)
    }

    async fn balance_of(&self, _owner: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(&self, from: &Account, spender: Address, amount: U256) -> Result<TxOutcome> {
        self.allowances
            .lock()
            .unwrap()
            .insert((from.address(), spender), amount);
        self.approvals.lock().unwrap().push((spender, amount));
        Ok(outcome(99))
    }
}

/// Indexer double returning a fixed snapshot, or failing.
pub struct MockEvents {
    pub snapshot: Option<IndexerSnapshot>,
}

#[async_trait]
impl EventSource for MockEvents {
    async fn snapshot(&self) -> Result<IndexerSnapshot> {
        self.snapshot
            .clone()
            .ok_or_else(|| MultisigError::IndexerError("http://localhost:4001/graphql: connection refused".into()))
    }
}
