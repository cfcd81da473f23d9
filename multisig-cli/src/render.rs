//! Terminal output. Every command prints either text or one JSON document.

use alloy::primitives::Address;
use multisig_client::balance::BalanceSummary;
use multisig_client::format::{confirmation_ratio, long_short_address, short_address};
use multisig_client::transactions::DepositRecord;
use multisig_client::{MultisigConfig, MultisigError, TokenInfo, TransactionRecord, TransactionView, TxOutcome, WalletState};
use serde::Serialize;
use serde_json::json;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn outcome(title: &str, outcome: &TxOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcome);
    }
    println!("{title}");
    println!("  tx hash: {}", outcome.tx_hash);
    if let Some(block) = outcome.block_number {
        println!("  block:   {block}");
    }
    Ok(())
}

pub fn accounts(state: &WalletState, owners: &[bool], json: bool) -> anyhow::Result<()> {
    if json {
        let accounts: Vec<_> = state
            .available_addresses
            .iter()
            .zip(owners)
            .map(|(address, owner)| {
                json!({
                    "address": address,
                    "active": state.address == Some(*address),
                    "is_owner": owner,
                })
            })
            .collect();
        return print_json(&accounts);
    }
    for (address, owner) in state.available_addresses.iter().zip(owners) {
        let marker = if state.address == Some(*address) { "*" } else { " " };
        let role = if *owner { "owner" } else { "" };
        println!("{marker} {address} {role}");
    }
    Ok(())
}

pub fn balance(summary: &BalanceSummary, token: Option<&TokenInfo>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "balance": summary, "token": token }));
    }
    let symbol = token.map(|t| t.symbol.as_str()).unwrap_or("tokens");
    println!("{} {symbol}", summary.formatted);
    if !summary.has_funds {
        println!("  the multisig holds no tokens yet");
    }
    Ok(())
}

pub fn transactions(view: &TransactionView, pending_only: bool, json: bool) -> anyhow::Result<()> {
    let rows: Vec<&TransactionRecord> = view
        .transactions
        .iter()
        .filter(|tx| !pending_only || !tx.executed)
        .collect();

    if json {
        return print_json(&json!({
            "threshold": view.threshold,
            "transactions": rows,
            "indexer_error": view.indexer_error,
        }));
    }

    if let Some(error) = &view.indexer_error {
        warning(&format!("indexer unavailable, showing contract data only: {error}"), false);
    }
    if rows.is_empty() {
        println!("No transactions");
        return Ok(());
    }
    for tx in rows {
        println!(
            "#{:<4} {:>20} -> {}  {:>5}  {}",
            tx.id,
            tx.formatted_amount,
            short_address(&tx.to),
            confirmation_ratio(tx.confirmations, view.threshold),
            tx.readiness(view.threshold),
        );
    }
    Ok(())
}

pub fn transaction_detail(
    tx: &TransactionRecord,
    threshold: u64,
    confirmations: &[(Address, bool)],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let owners: Vec<_> = confirmations
            .iter()
            .map(|(owner, confirmed)| json!({ "owner": owner, "confirmed": confirmed }))
            .collect();
        return print_json(&json!({
            "transaction": tx,
            "threshold": threshold,
            "progress": tx.progress(threshold),
            "owners": owners,
        }));
    }

    println!("Transaction #{}", tx.id);
    println!("  to:            {}", tx.to);
    println!("  amount:        {}", tx.formatted_amount);
    println!(
        "  confirmations: {} ({:.0}%)",
        confirmation_ratio(tx.confirmations, threshold),
        tx.progress(threshold)
    );
    println!("  status:        {}", tx.readiness(threshold));
    if let Some(by) = tx.submitted_by {
        println!("  submitted by:  {}", long_short_address(&by));
    }
    if let Some(hash) = tx.submit_tx_hash {
        println!("  submit tx:     {hash}");
    }
    if let Some(by) = tx.executed_by {
        println!("  executed by:   {}", long_short_address(&by));
    }
    for (owner, confirmed) in confirmations {
        let mark = if *confirmed { "[x]" } else { "[ ]" };
        println!("  {mark} {owner}");
    }
    Ok(())
}

pub fn owners(owners: &[Address], threshold: u64, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "threshold": threshold, "owners": owners }));
    }
    println!("{threshold} of {} confirmations required", owners.len());
    for owner in owners {
        println!("  {owner}");
    }
    Ok(())
}

pub fn deposits(deposits: &[DepositRecord], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(deposits);
    }
    if deposits.is_empty() {
        println!("No deposits");
    }
    for deposit in deposits {
        println!(
            "{:>20} from {}  block {}",
            deposit.formatted_amount,
            short_address(&deposit.sender),
            deposit.block_number
        );
    }
    Ok(())
}

/// The config file format is already JSON, so both modes print the same.
pub fn config(config: &MultisigConfig) -> anyhow::Result<()> {
    print_json(config)
}

/// Non-fatal notices go to stderr.
pub fn warning(message: &str, json: bool) {
    if json {
        eprintln!("{}", json!({ "warning": message }));
    } else {
        eprintln!("warning: {message}");
    }
}

pub fn error(err: &anyhow::Error, json: bool) {
    let code = err
        .downcast_ref::<MultisigError>()
        .map(|e| e.code() as u32);
    if json {
        eprintln!("{}", json!({ "error": format!("{err:#}"), "code": code }));
    } else {
        eprintln!("error: {err:#}");
    }
}
