//! Common imports for multisig client users.

pub use crate::account::Account;
pub use crate::actions::{self, DepositOutcome, SubmitForm};
pub use crate::amount::{format_units, TokenAmount};
pub use crate::balance::{fetch_balance, BalanceSummary};
pub use crate::chain::{MultisigClient, MultisigReader, MultisigWriter, TxOutcome};
pub use crate::config::MultisigConfig;
pub use crate::format::{long_short_address, parse_address, short_address};
pub use crate::indexer::{EventSource, IndexerClient};
pub use crate::token::{TokenApi, TokenClient};
pub use crate::transactions::{TransactionRecord, TransactionTracker, TransactionView, TxStatus};
pub use crate::wallet::{AccountSource, Wallet, WalletState};
pub use alloy::primitives::{Address, U256};
pub use multisig_error::{MultisigError, Result};
