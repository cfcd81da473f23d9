//! Event logs republished by the indexer's GraphQL endpoint.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use multisig_error::{MultisigError, Result};
use multisig_provider::RpcClient;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// Fetches the four event collections in one request.
pub const EVENTS_QUERY: &str = r#"query MultisigEvents {
  allSubmitTransactions {
    nodes { nodeId rindexerId contractAddress txHash blockNumber blockHash network txIndex logIndex owner txId to amount }
  }
  allConfirmTransactions {
    nodes { nodeId rindexerId contractAddress txHash blockNumber blockHash network txIndex logIndex owner txId }
  }
  allExecuteTransactions {
    nodes { nodeId rindexerId contractAddress txHash blockNumber blockHash network txIndex logIndex owner txId }
  }
  allDeposits {
    nodes { nodeId rindexerId contractAddress txHash blockNumber blockHash network txIndex logIndex sender amount }
  }
}"#;

/// Where an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMeta {
    pub contract: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
    pub network: Option<String>,
}

impl EventMeta {
    /// Sort key: chain order
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A `SubmitTransaction` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitEvent {
    pub meta: EventMeta,
    pub owner: Address,
    pub tx_id: u64,
    pub to: Address,
    pub amount: U256,
}

/// A `ConfirmTransaction` or `ExecuteTransaction` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerEvent {
    pub meta: EventMeta,
    pub owner: Address,
    pub tx_id: u64,
}

/// A `Deposit` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositEvent {
    pub meta: EventMeta,
    pub sender: Address,
    pub amount: U256,
}

/// Parsed events. Nodes that failed to parse are counted in `skipped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexerSnapshot {
    pub submits: Vec<SubmitEvent>,
    pub confirms: Vec<OwnerEvent>,
    pub executes: Vec<OwnerEvent>,
    pub deposits: Vec<DepositEvent>,
    pub skipped: usize,
}

/// Anything that can produce an [`IndexerSnapshot`].
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn snapshot(&self) -> Result<IndexerSnapshot>;
}

/// GraphQL indexer client.
#[derive(Debug)]
pub struct IndexerClient {
    url: String,
    client: RpcClient,
}

impl IndexerClient {
    pub fn new(url: impl Into<String>, client: RpcClient) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSource for IndexerClient {
    async fn snapshot(&self) -> Result<IndexerSnapshot> {
        let raw: RawEvents = self
            .client
            .graphql(&self.url, EVENTS_QUERY)
            .await
            .map_err(|e| MultisigError::IndexerError(format!("{}: {e}", self.url)))?;
        let snapshot = raw.parse();
        debug!(
            submits = snapshot.submits.len(),
            confirms = snapshot.confirms.len(),
            executes = snapshot.executes.len(),
            deposits = snapshot.deposits.len(),
            skipped = snapshot.skipped,
            "indexer snapshot"
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvents {
    #[serde(default)]
    all_submit_transactions: Connection,
    #[serde(default)]
    all_confirm_transactions: Connection,
    #[serde(default)]
    all_execute_transactions: Connection,
    #[serde(default)]
    all_deposits: Connection,
}

#[derive(Debug, Default, Deserialize)]
struct Connection {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

// Every field arrives as a string except rindexerId.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    node_id: Option<String>,
    contract_address: Option<String>,
    tx_hash: Option<String>,
    block_number: Option<String>,
    log_index: Option<String>,
    network: Option<String>,
    owner: Option<String>,
    sender: Option<String>,
    tx_id: Option<String>,
    to: Option<String>,
    amount: Option<String>,
}

impl RawEvents {
    fn parse(self) -> IndexerSnapshot {
        let mut snapshot = IndexerSnapshot::default();
        let mut skipped = 0;

        snapshot.submits = collect(self.all_submit_transactions, "SubmitTransaction", &mut skipped, |n| {
            Ok(SubmitEvent {
                meta: n.meta()?,
                owner: address(n.owner.as_deref(), "owner")?,
                tx_id: number(n.tx_id.as_deref(), "txId")?,
                to: address(n.to.as_deref(), "to")?,
                amount: amount(n.amount.as_deref())?,
            })
        });
        snapshot.confirms = collect(self.all_confirm_transactions, "ConfirmTransaction", &mut skipped, RawNode::owner_event);
        snapshot.executes = collect(self.all_execute_transactions, "ExecuteTransaction", &mut skipped, RawNode::owner_event);
        snapshot.deposits = collect(self.all_deposits, "Deposit", &mut skipped, |n| {
            Ok(DepositEvent {
                meta: n.meta()?,
                sender: address(n.sender.as_deref(), "sender")?,
                amount: amount(n.amount.as_deref())?,
            })
        });

        snapshot.skipped = skipped;
        snapshot
    }
}

fn collect<T>(
    connection: Connection,
    event: &str,
    skipped: &mut usize,
    parse: impl Fn(&RawNode) -> std::result::Result<T, String>,
) -> Vec<T> {
    connection
        .nodes
        .iter()
        .filter_map(|node| match parse(node) {
            Ok(parsed) => Some(parsed),
            Err(reason) => {
                warn!(event, node_id = ?node.node_id, %reason, "skipping malformed indexer node");
                *skipped += 1;
                None
            }
        })
        .collect()
}

impl RawNode {
    fn meta(&self) -> std::result::Result<EventMeta, String> {
        Ok(EventMeta {
            contract: address(self.contract_address.as_deref(), "contractAddress")?,
            tx_hash: required(self.tx_hash.as_deref(), "txHash")
                .and_then(|v| TxHash::from_str(v).map_err(|e| format!("txHash: {e}")))?,
            block_number: number(self.block_number.as_deref(), "blockNumber")?,
            log_index: match self.log_index.as_deref() {
                Some(v) => number(Some(v), "logIndex")?,
                None => 0,
            },
            network: self.network.clone(),
        })
    }

    fn owner_event(&self) -> std::result::Result<OwnerEvent, String> {
        Ok(OwnerEvent {
            meta: self.meta()?,
            owner: address(self.owner.as_deref(), "owner")?,
            tx_id: number(self.tx_id.as_deref(), "txId")?,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> std::result::Result<&'a str, String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {field}"))
}

fn address(value: Option<&str>, field: &str) -> std::result::Result<Address, String> {
    let value = required(value, field)?;
    Address::from_str(value).map_err(|e| format!("{field}: {e}"))
}

/// Accepts decimal or `0x` hex.
fn number(value: Option<&str>, field: &str) -> std::result::Result<u64, String> {
    let value = required(value, field)?;
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("{field} '{value}': {e}"))
}

fn amount(value: Option<&str>) -> std::result::Result<U256, String> {
    let value = required(value, "amount")?;
    U256::from_str(value).map_err(|e| format!("amount '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MULTISIG: &str = "0x5168f18e89fdd2e88114870d2837c0e31170564a";
    const HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn node(extra: serde_json::Value) -> serde_json::Value {
        let mut base = json!({
            "nodeId": "WyJzdWJtaXQiLDFd",
            "rindexerId": 1,
            "contractAddress": MULTISIG,
            "txHash": HASH,
            "blockNumber": "100",
            "blockHash": HASH,
            "network": "alfajores",
            "txIndex": "0",
            "logIndex": "2"
        });
        for (k, v) in extra.as_object().unwrap() {
            base[k] = v.clone();
        }
        base
    }

    #[test]
    fn test_parse_all_collections() {
        let raw: RawEvents = serde_json::from_value(json!({
            "allSubmitTransactions": { "nodes": [node(json!({
                "owner": "0x0000000000000000000000000000000000000001",
                "txId": "0",
                "to": "0x0000000000000000000000000000000000000002",
                "amount": "1500000000000000000"
            }))] },
            "allConfirmTransactions": { "nodes": [node(json!({
                "owner": "0x0000000000000000000000000000000000000001",
                "txId": "0"
            }))] },
            "allExecuteTransactions": { "nodes": [] },
            "allDeposits": { "nodes": [node(json!({
                "sender": "0x0000000000000000000000000000000000000003",
                "amount": "0x10",
                "blockNumber": "0x65"
            }))] }
        }))
        .unwrap();

        let snapshot = raw.parse();
        assert_eq!(snapshot.skipped, 0);
        assert_eq!(snapshot.submits.len(), 1);
        assert_eq!(snapshot.submits[0].tx_id, 0);
        assert_eq!(snapshot.submits[0].amount, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(snapshot.submits[0].meta.position(), (100, 2));
        assert_eq!(snapshot.confirms[0].owner, Address::with_last_byte(1));
        assert!(snapshot.executes.is_empty());
        assert_eq!(snapshot.deposits[0].amount, U256::from(16u8));
        assert_eq!(snapshot.deposits[0].meta.block_number, 101);
    }

    #[test]
    fn test_malformed_nodes_are_skipped() {
        let raw: RawEvents = serde_json::from_value(json!({
            "allSubmitTransactions": { "nodes": [] },
            "allConfirmTransactions": { "nodes": [
                node(json!({ "owner": "not-an-address", "txId": "1" })),
                node(json!({ "owner": "0x0000000000000000000000000000000000000001" })),
                node(json!({ "owner": "0x0000000000000000000000000000000000000001", "txId": "4" }))
            ] },
            "allExecuteTransactions": { "nodes": [] },
            "allDeposits": { "nodes": [] }
        }))
        .unwrap();

        let snapshot = raw.parse();
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.confirms.len(), 1);
        assert_eq!(snapshot.confirms[0].tx_id, 4);
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let raw: RawEvents = serde_json::from_value(json!({})).unwrap();
        assert_eq!(raw.parse(), IndexerSnapshot::default());
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(number(Some("42"), "n").unwrap(), 42);
        assert_eq!(number(Some("0x2a"), "n").unwrap(), 42);
        assert!(number(Some("-1"), "n").is_err());
        assert!(number(None, "n").unwrap_err().contains("missing n"));
    }
}
