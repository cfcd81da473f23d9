//! The transaction feed: contract records joined with indexer logs.
//!
//! The contract is authoritative for `to`, `amount`, `executed` and
//! `confirmations`. Indexer logs only add who did what and where.

use crate::amount::format_units;
use crate::chain::{MultisigReader, OnChainTransaction};
use crate::format;
use crate::indexer::{EventSource, IndexerSnapshot};
use alloy::primitives::{Address, TxHash, U256};
use multisig_error::{MultisigError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default cap on transaction ids read per fetch.
pub const DEFAULT_MAX_TRANSACTIONS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Executed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "pending"),
            TxStatus::Executed => write!(f, "executed"),
        }
    }
}

/// One multisig transaction as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub to: Address,
    pub amount: U256,
    pub executed: bool,
    pub confirmations: u64,
    pub status: TxStatus,
    pub formatted_amount: String,
    pub submitted_by: Option<Address>,
    pub submit_tx_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    /// Confirming owners in chain order, without duplicates
    pub confirmed_by: Vec<Address>,
    pub executed_by: Option<Address>,
    pub execute_tx_hash: Option<TxHash>,
}

impl TransactionRecord {
    pub fn from_chain(id: u64, tx: &OnChainTransaction, decimals: u8) -> Self {
        Self {
            id,
            to: tx.to,
            amount: tx.amount,
            executed: tx.executed,
            confirmations: tx.confirmations,
            status: if tx.executed {
                TxStatus::Executed
            } else {
                TxStatus::Pending
            },
            formatted_amount: format_units(tx.amount, decimals),
            submitted_by: None,
            submit_tx_hash: None,
            block_number: None,
            confirmed_by: Vec::new(),
            executed_by: None,
            execute_tx_hash: None,
        }
    }

    /// Pending with enough confirmations.
    pub fn can_execute(&self, threshold: u64) -> bool {
        !self.executed && self.confirmations >= threshold
    }

    pub fn remaining_confirmations(&self, threshold: u64) -> u64 {
        format::remaining_confirmations(self.confirmations, threshold)
    }

    pub fn progress(&self, threshold: u64) -> f64 {
        format::confirmation_progress(self.confirmations, threshold)
    }

    pub fn readiness(&self, threshold: u64) -> String {
        format::readiness_label(self.confirmations, threshold, self.executed)
    }
}

/// A token deposit into the multisig, from the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositRecord {
    pub sender: Address,
    pub amount: U256,
    pub formatted_amount: String,
    pub tx_hash: TxHash,
    pub block_number: u64,
    #[serde(skip)]
    log_index: u64,
}

/// Everything the transaction list shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionView {
    pub threshold: u64,
    /// Newest first
    pub transactions: Vec<TransactionRecord>,
    /// Newest first
    pub deposits: Vec<DepositRecord>,
    /// Set when the indexer was configured but could not be read
    pub indexer_error: Option<String>,
    /// Indexer logs naming ids the contract does not know
    pub unmatched_events: usize,
}

impl TransactionView {
    pub fn get(&self, id: u64) -> Option<&TransactionRecord> {
        self.transactions.iter().find(|tx| tx.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.transactions.iter().filter(|tx| !tx.executed)
    }

    /// Pending transactions that have reached the threshold
    pub fn ready(&self) -> impl Iterator<Item = &TransactionRecord> {
        let threshold = self.threshold;
        self.transactions
            .iter()
            .filter(move |tx| tx.can_execute(threshold))
    }
}

/// Joins contract records with indexer logs.
///
/// `chain` holds `(id, transaction)` pairs as read from the contract. Logs
/// from other contracts are ignored.
pub fn reconcile(
    multisig: Address,
    threshold: u64,
    chain: &[(u64, OnChainTransaction)],
    snapshot: Option<&IndexerSnapshot>,
    decimals: u8,
) -> TransactionView {
    let mut records: Vec<TransactionRecord> = chain
        .iter()
        .map(|(id, tx)| TransactionRecord::from_chain(*id, tx, decimals))
        .collect();

    let mut deposits = Vec::new();
    let mut unmatched = 0;

    if let Some(snapshot) = snapshot {
        let index: HashMap<u64, usize> = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id, pos))
            .collect();
        let mut lookup = |tx_id: u64| {
            let found = index.get(&tx_id).copied();
            if found.is_none() {
                unmatched += 1;
            }
            found
        };

        for submit in snapshot.submits.iter().filter(|e| e.meta.contract == multisig) {
            if let Some(pos) = lookup(submit.tx_id) {
                let record = &mut records[pos];
                if record.to != submit.to || record.amount != submit.amount {
                    warn!(tx_id = submit.tx_id, "indexer submit log disagrees with contract state");
                }
                record.submitted_by = Some(submit.owner);
                record.submit_tx_hash = Some(submit.meta.tx_hash);
                record.block_number = Some(submit.meta.block_number);
            }
        }

        let mut confirms: Vec<_> = snapshot
            .confirms
            .iter()
            .filter(|e| e.meta.contract == multisig)
            .collect();
        confirms.sort_by_key(|e| e.meta.position());
        for confirm in confirms {
            if let Some(pos) = lookup(confirm.tx_id) {
                let record = &mut records[pos];
                if !record.confirmed_by.contains(&confirm.owner) {
                    record.confirmed_by.push(confirm.owner);
                }
            }
        }

        for execute in snapshot.executes.iter().filter(|e| e.meta.contract == multisig) {
            if let Some(pos) = lookup(execute.tx_id) {
                let record = &mut records[pos];
                record.executed_by = Some(execute.owner);
                record.execute_tx_hash = Some(execute.meta.tx_hash);
            }
        }

        deposits = snapshot
            .deposits
            .iter()
            .filter(|e| e.meta.contract == multisig)
            .map(|e| DepositRecord {
                sender: e.sender,
                amount: e.amount,
                formatted_amount: format_units(e.amount, decimals),
                tx_hash: e.meta.tx_hash,
                block_number: e.meta.block_number,
                log_index: e.meta.log_index,
            })
            .collect();
    }

    if unmatched > 0 {
        debug!(unmatched, "indexer logs reference transactions not read from chain");
    }

    records.sort_by(|a, b| b.id.cmp(&a.id));
    deposits.sort_by(|a, b| (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index)));

    TransactionView {
        threshold,
        transactions: records,
        deposits,
        indexer_error: None,
        unmatched_events: unmatched,
    }
}

/// Fetches and reconciles the transaction list.
pub struct TransactionTracker<R> {
    reader: R,
    events: Option<Arc<dyn EventSource>>,
    max_transactions: u64,
    decimals: u8,
}

impl<R: MultisigReader> TransactionTracker<R> {
    pub fn new(reader: R, decimals: u8) -> Self {
        Self {
            reader,
            events: None,
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
            decimals,
        }
    }

    /// Enriches records from `events`
    pub fn with_events(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_max_transactions(mut self, max: u64) -> Self {
        self.max_transactions = max;
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Reads ids from 0 until the contract reverts or the cap is hit.
    pub async fn read_chain(&self) -> Result<Vec<(u64, OnChainTransaction)>> {
        let mut found = Vec::new();
        for id in 0..self.max_transactions {
            match self.reader.transaction(id).await {
                Ok(tx) => found.push((id, tx)),
                Err(MultisigError::TransactionNotFound(_)) => break,
                Err(e) => return Err(e),
            }
        }
        if found.len() as u64 == self.max_transactions {
            warn!(max = self.max_transactions, "transaction scan hit its limit, older entries may be missing");
        }
        Ok(found)
    }

    /// One full fetch: threshold, contract records, then indexer logs.
    pub async fn fetch(&self) -> Result<TransactionView> {
        let threshold = self.reader.threshold().await?;
        let chain = self.read_chain().await?;

        let (snapshot, indexer_error) = match &self.events {
            Some(events) => match events.snapshot().await {
                Ok(snapshot) => (Some(snapshot), None),
                Err(e) => {
                    warn!(error = %e, "indexer unavailable, showing contract data only");
                    (None, Some(e.to_string()))
                }
            },
            None => (None, None),
        };

        let mut view = reconcile(
            self.reader.address(),
            threshold,
            &chain,
            snapshot.as_ref(),
            self.decimals,
        );
        view.indexer_error = indexer_error;
        debug!(threshold, transactions = view.transactions.len(), deposits = view.deposits.len(), "fetched transactions");
        Ok(view)
    }

    /// Same as [`fetch`](Self::fetch); named for callers reacting to a write.
    pub async fn refetch(&self) -> Result<TransactionView> {
        self.fetch().await
    }

    /// A single transaction with the current threshold, without the indexer.
    pub async fn fetch_one(&self, id: u64) -> Result<(TransactionRecord, u64)> {
        let threshold = self.reader.threshold().await?;
        let tx = self.reader.transaction(id).await?;
        Ok((TransactionRecord::from_chain(id, &tx, self.decimals), threshold))
    }
}

/// Published by [`watch_transactions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    pub loading: bool,
    /// Last successful fetch, kept across failures
    pub view: Option<TransactionView>,
    pub error: Option<String>,
}

/// Polls `tracker` every `interval` and publishes feed states.
///
/// The task stops once every receiver is dropped.
pub fn watch_transactions<R>(
    tracker: Arc<TransactionTracker<R>>,
    interval: Duration,
) -> (watch::Receiver<FeedState>, JoinHandle<()>)
where
    R: MultisigReader + 'static,
{
    let (tx, rx) = watch::channel(FeedState {
        loading: true,
        ..FeedState::default()
    });

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            tx.send_modify(|state| state.loading = true);

            match tracker.fetch().await {
                Ok(view) => {
                    let previous = tx.borrow().view.clone();
                    log_changes(previous.as_ref(), &view);
                    tx.send_replace(FeedState {
                        loading: false,
                        view: Some(view),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "transaction fetch failed");
                    tx.send_modify(|state| {
                        state.loading = false;
                        state.error = Some(e.to_string());
                    });
                }
            }
        }
    });

    (rx, handle)
}

fn log_changes(previous: Option<&TransactionView>, current: &TransactionView) {
    let Some(previous) = previous else {
        return;
    };
    for tx in &current.transactions {
        match previous.get(tx.id) {
            None => info!(tx_id = tx.id, to = %tx.to, amount = %tx.formatted_amount, "new transaction"),
            Some(old) if !old.executed && tx.executed => info!(tx_id = tx.id, "transaction executed"),
            Some(old) if old.confirmations != tx.confirmations => info!(
                tx_id = tx.id,
                confirmations = tx.confirmations,
                threshold = current.threshold,
                "confirmation count changed"
            ),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{DepositEvent, EventMeta, OwnerEvent, SubmitEvent};

    fn multisig() -> Address {
        Address::repeat_byte(0xee)
    }

    fn tx(to: u8, amount: u64, executed: bool, confirmations: u64) -> OnChainTransaction {
        OnChainTransaction {
            to: Address::repeat_byte(to),
            amount: U256::from(amount),
            executed,
            confirmations,
        }
    }

    fn meta(contract: Address, block: u64, log: u64) -> EventMeta {
        EventMeta {
            contract,
            tx_hash: TxHash::repeat_byte(block as u8),
            block_number: block,
            log_index: log,
            network: None,
        }
    }

    fn owner(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_status_and_readiness() {
        let record = TransactionRecord::from_chain(0, &tx(1, 1_500_000_000_000_000_000, false, 1), 18);
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.formatted_amount, "1.5");
        assert!(!record.can_execute(2));
        assert_eq!(record.remaining_confirmations(2), 1);
        assert_eq!(record.progress(2), 50.0);

        let executed = TransactionRecord::from_chain(1, &tx(1, 5, true, 2), 0);
        assert_eq!(executed.status, TxStatus::Executed);
        assert!(!executed.can_execute(2));
    }

    #[test]
    fn test_reconcile_without_indexer_orders_newest_first() {
        let chain = vec![(0, tx(1, 10, true, 2)), (1, tx(2, 20, false, 0)), (2, tx(3, 30, false, 2))];
        let view = reconcile(multisig(), 2, &chain, None, 0);

        let ids: Vec<u64> = view.transactions.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
        assert!(view.deposits.is_empty());
        assert_eq!(view.pending().count(), 2);
        assert_eq!(view.ready().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_reconcile_enriches_from_logs() {
        let chain = vec![(0, tx(1, 10, true, 2)), (1, tx(2, 20, false, 1))];
        let snapshot = IndexerSnapshot {
            submits: vec![SubmitEvent {
                meta: meta(multisig(), 10, 0),
                owner: owner(0xa1),
                tx_id: 0,
                to: Address::repeat_byte(1),
                amount: U256::from(10u8),
            }],
            confirms: vec![
                OwnerEvent { meta: meta(multisig(), 12, 0), owner: owner(0xa2), tx_id: 0 },
                OwnerEvent { meta: meta(multisig(), 11, 3), owner: owner(0xa1), tx_id: 0 },
                OwnerEvent { meta: meta(multisig(), 13, 0), owner: owner(0xa1), tx_id: 0 },
                OwnerEvent { meta: meta(multisig(), 14, 0), owner: owner(0xa3), tx_id: 7 },
                OwnerEvent { meta: meta(owner(0x99), 14, 1), owner: owner(0xa3), tx_id: 1 },
            ],
            executes: vec![OwnerEvent { meta: meta(multisig(), 15, 0), owner: owner(0xa2), tx_id: 0 }],
            deposits: vec![
                DepositEvent { meta: meta(multisig(), 5, 0), sender: owner(0xb1), amount: U256::from(100u8) },
                DepositEvent { meta: meta(multisig(), 9, 1), sender: owner(0xb2), amount: U256::from(50u8) },
                DepositEvent { meta: meta(owner(0x99), 9, 2), sender: owner(0xb3), amount: U256::from(1u8) },
            ],
            skipped: 0,
        };

        let view = reconcile(multisig(), 2, &chain, Some(&snapshot), 0);
        let first = view.get(0).unwrap();
        assert_eq!(first.submitted_by, Some(owner(0xa1)));
        assert_eq!(first.block_number, Some(10));
        assert_eq!(first.confirmed_by, vec![owner(0xa1), owner(0xa2)]);
        assert_eq!(first.executed_by, Some(owner(0xa2)));
        assert_eq!(first.execute_tx_hash, Some(TxHash::repeat_byte(15)));

        let second = view.get(1).unwrap();
        assert!(second.confirmed_by.is_empty());
        assert_eq!(second.confirmations, 1);

        assert_eq!(view.unmatched_events, 1);
        let senders: Vec<Address> = view.deposits.iter().map(|d| d.sender).collect();
        assert_eq!(senders, vec![owner(0xb2), owner(0xb1)]);
    }

    #[test]
    fn test_contract_wins_over_logs() {
        let chain = vec![(0, tx(1, 10, false, 1))];
        let snapshot = IndexerSnapshot {
            executes: vec![OwnerEvent { meta: meta(multisig(), 3, 0), owner: owner(0xa1), tx_id: 0 }],
            ..IndexerSnapshot::default()
        };
        let view = reconcile(multisig(), 2, &chain, Some(&snapshot), 0);
        let record = view.get(0).unwrap();
        assert!(!record.executed);
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.executed_by, Some(owner(0xa1)));
    }
}
