//! Validated user actions: submit, confirm, execute, approve and deposit.
//!
//! Every check here mirrors a contract rule so that obvious mistakes fail
//! before a transaction is signed. The contract still has the final word.

use crate::account::Account;
use crate::amount::TokenAmount;
use crate::chain::{MultisigReader, MultisigWriter, TxOutcome};
use crate::format::parse_address;
use crate::token::TokenApi;
use alloy::primitives::{Address, U256};
use multisig_error::{MultisigError, Result};
use serde::Serialize;
use tracing::info;

/// Raw input of the submit form.
#[derive(Debug, Clone, Default)]
pub struct SubmitForm {
    pub recipient: String,
    pub amount: String,
}

/// A submit form that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRequest {
    pub to: Address,
    pub amount: TokenAmount,
}

impl SubmitForm {
    pub fn new(recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    /// Both fields present, recipient a valid address, amount positive.
    pub fn validate(&self, decimals: u8) -> Result<SubmitRequest> {
        let recipient = self.recipient.trim();
        let amount = self.amount.trim();
        if recipient.is_empty() {
            return Err(MultisigError::MissingField("recipient".into()));
        }
        if amount.is_empty() {
            return Err(MultisigError::MissingField("amount".into()));
        }
        Ok(SubmitRequest {
            to: parse_address(recipient)?,
            amount: TokenAmount::parse_positive(amount, decimals)?,
        })
    }
}

fn connected(account: Option<&Account>) -> Result<&Account> {
    account.ok_or(MultisigError::WalletNotConnected)
}

/// Validates the form, then proposes the transfer.
pub async fn submit<W>(
    writer: &W,
    account: Option<&Account>,
    form: &SubmitForm,
    decimals: u8,
) -> Result<TxOutcome>
where
    W: MultisigWriter + ?Sized,
{
    let request = form.validate(decimals)?;
    let account = connected(account)?;
    info!(to = %request.to, amount = %request.amount, from = %account.address(), "submitting transaction");
    writer
        .submit_transaction(account, request.to, request.amount.raw())
        .await
}

/// Confirms transaction `id` as the active account.
pub async fn confirm<C>(client: &C, account: Option<&Account>, id: u64) -> Result<TxOutcome>
where
    C: MultisigReader + MultisigWriter + ?Sized,
{
    let account = connected(account)?;
    let owner = account.address();

    let tx = client.transaction(id).await?;
    if tx.executed {
        return Err(MultisigError::AlreadyExecuted(id));
    }
    if !client.is_owner(owner).await? {
        return Err(MultisigError::NotOwner(owner.to_checksum(None)));
    }
    if client.has_confirmed(id, owner).await? {
        return Err(MultisigError::AlreadyConfirmed {
            id,
            owner: owner.to_checksum(None),
        });
    }

    info!(tx_id = id, %owner, "confirming transaction");
    client.confirm_transaction(account, id).await
}

/// Executes transaction `id` once it has reached the threshold.
pub async fn execute<C>(client: &C, account: Option<&Account>, id: u64) -> Result<TxOutcome>
where
    C: MultisigReader + MultisigWriter + ?Sized,
{
    let account = connected(account)?;

    let tx = client.transaction(id).await?;
    if tx.executed {
        return Err(MultisigError::AlreadyExecuted(id));
    }
    let threshold = client.threshold().await?;
    if tx.confirmations < threshold {
        return Err(MultisigError::InsufficientConfirmations {
            id,
            have: tx.confirmations,
            need: threshold,
        });
    }

    info!(tx_id = id, to = %tx.to, "executing transaction");
    client.execute_transaction(account, id).await
}

/// Approves `spender` (the multisig) to pull `amount` tokens.
pub async fn approve<T>(
    token: &T,
    account: Option<&Account>,
    spender: Address,
    amount: &str,
    decimals: u8,
) -> Result<TxOutcome>
where
    T: TokenApi + ?Sized,
{
    let amount = TokenAmount::parse_positive(amount, decimals)?;
    let account = connected(account)?;
    info!(%spender, %amount, "approving token allowance");
    token.approve(account, spender, amount.raw()).await
}

/// What a deposit attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DepositOutcome {
    Deposited(TxOutcome),
    /// Nothing was sent; the allowance must be raised first
    NeedsApproval { allowance: U256, required: U256 },
}

/// Deposits `amount` into the multisig if the allowance covers it.
pub async fn deposit<C, T>(
    client: &C,
    token: &T,
    account: Option<&Account>,
    amount: &str,
    decimals: u8,
) -> Result<DepositOutcome>
where
    C: MultisigReader + MultisigWriter + ?Sized,
    T: TokenApi + ?Sized,
{
    let amount = TokenAmount::parse_positive(amount, decimals)?;
    let account = connected(account)?;

    let allowance = token.allowance(account.address(), client.address()).await?;
    if allowance < amount.raw() {
        info!(
            allowance = %allowance,
            required = %amount.raw(),
            "allowance too low, approval needed before deposit"
        );
        return Ok(DepositOutcome::NeedsApproval {
            allowance,
            required: amount.raw(),
        });
    }

    info!(%amount, from = %account.address(), "depositing tokens");
    client
        .deposit_tokens(account, amount.raw())
        .await
        .map(DepositOutcome::Deposited)
}
