use crate::amount::format_units;
use crate::chain::MultisigReader;
use alloy::primitives::{Address, U256};
use multisig_error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Token balance held by the multisig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub token: Address,
    pub balance: U256,
    pub formatted: String,
    pub has_funds: bool,
}

impl BalanceSummary {
    pub fn new(token: Address, balance: U256, decimals: u8) -> Self {
        Self {
            token,
            balance,
            formatted: format_units(balance, decimals),
            has_funds: !balance.is_zero(),
        }
    }
}

/// Reads the token address and the multisig's balance of it.
pub async fn fetch_balance<R: MultisigReader + ?Sized>(reader: &R, decimals: u8) -> Result<BalanceSummary> {
    let token = reader.token().await?;
    let balance = reader.token_balance().await?;
    Ok(BalanceSummary::new(token, balance, decimals))
}

/// Polls the balance and sends a summary whenever it changes.
///
/// The first successful read is always sent. Failed reads are sent as
/// errors and retried on the next tick.
pub fn watch_balance<R>(
    reader: Arc<R>,
    decimals: u8,
    interval: Duration,
) -> (mpsc::Receiver<Result<BalanceSummary>>, JoinHandle<()>)
where
    R: MultisigReader + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last: Option<U256> = None;
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            let update = match fetch_balance(reader.as_ref(), decimals).await {
                Ok(summary) if last == Some(summary.balance) => continue,
                Ok(summary) => {
                    if last.is_some() {
                        info!(balance = %summary.formatted, "multisig balance changed");
                    }
                    last = Some(summary.balance);
                    Ok(summary)
                }
                Err(e) => {
                    debug!(error = %e, "balance poll failed");
                    Err(e)
                }
            };
            if tx.send(update).await.is_err() {
                break;
            }
        }
    });
    (rx, handle)
}
