use crate::render;
use crate::Command;
use anyhow::Context;
use multisig_client::actions::{self, DepositOutcome, SubmitForm};
use multisig_client::balance::{fetch_balance, watch_balance};
use multisig_client::config::{private_keys_from_env, AccountSourceKind, DEFAULT_CONFIG_FILE};
use multisig_client::format::parse_address;
use multisig_client::transactions::watch_transactions;
use multisig_client::{
    Account, AccountSource, IndexerClient, LocalAccounts, MultisigClient, MultisigConfig,
    MultisigReader, NodeAccounts, TokenClient, TokenInfo, TransactionTracker, Wallet,
};
use multisig_error::MultisigError;
use std::path::Path;
use std::sync::Arc;

/// Upper bound when listing owners by index.
const MAX_OWNERS: u64 = 64;

pub struct App {
    config: MultisigConfig,
    client: MultisigClient,
    private_keys: Vec<String>,
    from: Option<String>,
    json: bool,
}

impl App {
    /// Local signing keys come from `MULTISIG_PRIVATE_KEYS`.
    pub fn new(config: MultisigConfig, from: Option<String>, json: bool) -> anyhow::Result<Self> {
        Self::with_private_keys(config, private_keys_from_env(), from, json)
    }

    pub fn with_private_keys(
        config: MultisigConfig,
        private_keys: Vec<String>,
        from: Option<String>,
        json: bool,
    ) -> anyhow::Result<Self> {
        let client = MultisigClient::new(config.multisig()?, config.provider_config())?;
        Ok(Self {
            config,
            client,
            private_keys,
            from,
            json,
        })
    }

    pub async fn run(&self, command: Command, config_path: Option<&Path>) -> anyhow::Result<()> {
        match command {
            Command::Accounts => self.accounts().await,
            Command::Balance { watch } => self.balance(watch).await,
            Command::Transactions {
                watch,
                no_indexer,
                pending,
            } => self.transactions(watch, no_indexer, pending).await,
            Command::Show { id } => self.show(id).await,
            Command::Owners => self.owners().await,
            Command::Deposits => self.deposits().await,
            Command::Submit { to, amount } => self.submit(to, amount).await,
            Command::Confirm { id } => {
                let account = self.account().await?;
                let outcome = actions::confirm(&self.client, Some(&account), id).await?;
                render::outcome(&format!("Confirmed transaction #{id}"), &outcome, self.json)
            }
            Command::Execute { id } => {
                let account = self.account().await?;
                let outcome = actions::execute(&self.client, Some(&account), id).await?;
                render::outcome(&format!("Executed transaction #{id}"), &outcome, self.json)
            }
            Command::Approve { amount } => self.approve(amount).await,
            Command::Deposit { amount } => self.deposit(amount).await,
            Command::Config { save } => self.show_config(save, config_path),
        }
    }

    fn account_source(&self) -> anyhow::Result<Arc<dyn AccountSource>> {
        Ok(match self.config.account_source {
            AccountSourceKind::Local => Arc::new(LocalAccounts::from_keys(
                &self.private_keys,
                self.config.chain_id,
            )?),
            AccountSourceKind::Node => Arc::new(NodeAccounts::new(
                self.config.rpc_url.clone(),
                self.config.rpc_client()?,
            )),
        })
    }

    async fn wallet(&self) -> anyhow::Result<Wallet> {
        let mut wallet = Wallet::new(self.account_source()?);
        wallet.connect().await?;
        if let Some(from) = &self.from {
            wallet.select_account(parse_address(from)?)?;
        }
        Ok(wallet)
    }

    async fn account(&self) -> anyhow::Result<Account> {
        let account = self.wallet().await?.active_account()?;
        if let Account::Local(_) = account {
            // local keys sign for the configured chain id
            self.client.verify_chain(self.config.chain_id).await?;
        }
        Ok(account)
    }

    async fn token(&self) -> anyhow::Result<TokenClient> {
        let address = self.client.token().await.context("reading the multisig's token")?;
        Ok(TokenClient::new(address, self.client.connection().clone()))
    }

    fn tracker(&self, with_indexer: bool) -> anyhow::Result<TransactionTracker<MultisigClient>> {
        let mut tracker = TransactionTracker::new(self.client.clone(), self.config.token_decimals)
            .with_max_transactions(self.config.max_transactions);
        if with_indexer {
            if let Some(url) = &self.config.indexer_url {
                tracker = tracker.with_events(Arc::new(IndexerClient::new(url.clone(), self.config.rpc_client()?)));
            }
        }
        Ok(tracker)
    }

    async fn accounts(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        let state = wallet.state();
        let mut owners = Vec::with_capacity(state.available_addresses.len());
        for address in &state.available_addresses {
            owners.push(self.client.is_owner(*address).await?);
        }
        render::accounts(state, &owners, self.json)
    }

    async fn balance(&self, watch: bool) -> anyhow::Result<()> {
        let token = self.token().await?;
        let info = TokenInfo::fetch(&token).await?;

        if !watch {
            let summary = fetch_balance(&self.client, self.config.token_decimals).await?;
            return render::balance(&summary, Some(&info), self.json);
        }

        let (mut updates, handle) = watch_balance(
            Arc::new(self.client.clone()),
            self.config.token_decimals,
            self.config.poll_interval(),
        );
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(Ok(summary)) => render::balance(&summary, Some(&info), self.json)?,
                    Some(Err(e)) => render::warning(&e.to_string(), self.json),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        handle.abort();
        Ok(())
    }

    async fn transactions(&self, watch: bool, no_indexer: bool, pending: bool) -> anyhow::Result<()> {
        let tracker = self.tracker(!no_indexer)?;
        if !watch {
            let view = tracker.fetch().await?;
            return render::transactions(&view, pending, self.json);
        }

        let (mut feed, handle) = watch_transactions(Arc::new(tracker), self.config.poll_interval());
        loop {
            tokio::select! {
                changed = feed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = feed.borrow_and_update().clone();
                    if state.loading {
                        continue;
                    }
                    if let Some(error) = &state.error {
                        render::warning(error, self.json);
                    } else if let Some(view) = &state.view {
                        render::transactions(view, pending, self.json)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        handle.abort();
        Ok(())
    }

    async fn show(&self, id: u64) -> anyhow::Result<()> {
        let (record, threshold) = self.tracker(false)?.fetch_one(id).await?;

        let owners = self.client.owners(MAX_OWNERS).await?;
        let mut confirmations = Vec::with_capacity(owners.len());
        for owner in owners {
            confirmations.push((owner, self.client.has_confirmed(id, owner).await?));
        }
        render::transaction_detail(&record, threshold, &confirmations, self.json)
    }

    async fn owners(&self) -> anyhow::Result<()> {
        let threshold = self.client.threshold().await?;
        let owners = self.client.owners(MAX_OWNERS).await?;
        render::owners(&owners, threshold, self.json)
    }

    async fn deposits(&self) -> anyhow::Result<()> {
        if self.config.indexer_url.is_none() {
            return Err(MultisigError::IndexerNotConfigured.into());
        }
        let view = self.tracker(true)?.fetch().await?;
        if let Some(error) = view.indexer_error {
            return Err(MultisigError::IndexerError(error).into());
        }
        render::deposits(&view.deposits, self.json)
    }

    async fn submit(&self, to: String, amount: String) -> anyhow::Result<()> {
        let form = SubmitForm::new(to, amount);
        // bad input fails before the wallet is touched
        form.validate(self.config.token_decimals)?;
        let account = self.account().await?;
        let outcome = actions::submit(&self.client, Some(&account), &form, self.config.token_decimals).await?;
        let title = match outcome.tx_id {
            Some(id) => format!("Submitted transaction #{id}"),
            None => "Submitted transaction".to_string(),
        };
        render::outcome(&title, &outcome, self.json)
    }

    async fn approve(&self, amount: String) -> anyhow::Result<()> {
        let token = self.token().await?;
        let account = self.account().await?;
        let outcome = actions::approve(
            &token,
            Some(&account),
            self.client.address(),
            &amount,
            self.config.token_decimals,
        )
        .await?;
        render::outcome(&format!("Approved {amount} for the multisig"), &outcome, self.json)
    }

    async fn deposit(&self, amount: String) -> anyhow::Result<()> {
        let token = self.token().await?;
        let account = self.account().await?;
        let decimals = self.config.token_decimals;
        match actions::deposit(&self.client, &token, Some(&account), &amount, decimals).await? {
            DepositOutcome::Deposited(outcome) => {
                render::outcome(&format!("Deposited {amount}"), &outcome, self.json)
            }
            DepositOutcome::NeedsApproval { allowance, required } => {
                Err(MultisigError::InsufficientAllowance {
                    have: allowance.to_string(),
                    need: required.to_string(),
                })
                    .context(format!("run `multisig approve {amount}` first"))
            }
        }
    }

    fn show_config(&self, save: bool, path: Option<&Path>) -> anyhow::Result<()> {
        if save {
            let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
            self.config.save(path)?;
            render::warning(&format!("configuration written to {}", path.display()), self.json);
        }
        render::config(&self.config)
    }
}
