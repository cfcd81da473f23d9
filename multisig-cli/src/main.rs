//! `multisig` - command-line front-end for a SimpleERC20Multisig deployment.
//!
//! Configuration is layered: defaults, `multisig_config.json` (or `--config`),
//! `.env` / `MULTISIG_*` environment variables, then the flags below.

mod app;
mod logging;
mod render;

use app::App;
use clap::{Parser, Subcommand};
use multisig_client::config::{parse_indexer_url, AccountSourceKind};
use multisig_client::MultisigConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "multisig", version)]
#[command(about = "Inspect and operate an ERC20 multisignature wallet", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./multisig_config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// RPC endpoint
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Multisig contract address
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Indexer GraphQL endpoint, or "none" to skip the indexer
    #[arg(long, global = true)]
    indexer_url: Option<String>,

    /// Where signing accounts come from
    #[arg(long, global = true, value_parser = ["local", "node"])]
    account_source: Option<String>,

    /// Act as this account instead of the first one
    #[arg(long, global = true)]
    from: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log level or filter directives
    #[arg(long, global = true, env = "MULTISIG_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the wallet's accounts and whether each is an owner
    Accounts,
    /// Show the multisig's token balance
    Balance {
        /// Keep polling and print changes
        #[arg(long)]
        watch: bool,
    },
    /// List multisig transactions, newest first
    Transactions {
        /// Keep polling and print updates
        #[arg(long)]
        watch: bool,
        /// Skip the indexer and show contract data only
        #[arg(long)]
        no_indexer: bool,
        /// Only pending transactions
        #[arg(long)]
        pending: bool,
    },
    /// Show one transaction with per-owner confirmations
    Show { id: u64 },
    /// List owners and the confirmation threshold
    Owners,
    /// List deposits recorded by the indexer
    Deposits,
    /// Propose a token transfer
    Submit {
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Amount in whole tokens, e.g. 12.5
        #[arg(long)]
        amount: String,
    },
    /// Confirm a pending transaction
    Confirm { id: u64 },
    /// Execute a transaction that reached the threshold
    Execute { id: u64 },
    /// Allow the multisig to pull tokens from the active account
    Approve { amount: String },
    /// Deposit tokens into the multisig (needs a prior approval)
    Deposit { amount: String },
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    /// Defaults, then the config file, then the environment, then flags.
    fn resolve_config(&self) -> anyhow::Result<MultisigConfig> {
        let mut config = MultisigConfig::load(self.config.as_deref())?;
        config.apply_env()?;

        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(contract) = &self.contract {
            config.multisig_address = contract.clone();
        }
        if let Some(url) = &self.indexer_url {
            config.indexer_url = parse_indexer_url(url);
        }
        if let Some(source) = &self.account_source {
            config.account_source = source.parse::<AccountSourceKind>()?;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level, cli.json_logs);

    let config = cli.resolve_config()?;
    tracing::debug!(rpc = %config.rpc_url, contract = %config.multisig_address, "configuration resolved");

    let app = App::new(config, cli.from.clone(), cli.json)?;
    if let Err(e) = app.run(cli.command, cli.config.as_deref()).await {
        render::error(&e, cli.json);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::parse_from([
            "multisig",
            "--json",
            "submit",
            "--to",
            "0x5168f18e89fdd2e88114870d2837c0e31170564a",
            "--amount",
            "1.5",
        ]);
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Submit { ref amount, .. } if amount == "1.5"));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multisig_config.json");
        std::fs::write(&path, r#"{ "rpc_url": "http://file:8545", "chain_id": 31337 }"#).unwrap();

        let cli = Cli::parse_from([
            "multisig",
            "--config",
            path.to_str().unwrap(),
            "--rpc-url",
            "http://flag:8545",
            "--account-source",
            "node",
            "owners",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.rpc_url, "http://flag:8545");
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.account_source, AccountSourceKind::Node);
    }

    #[test]
    fn test_indexer_flag_none_disables_indexer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multisig_config.json");
        std::fs::write(&path, r#"{ "indexer_url": "http://localhost:4001/graphql" }"#).unwrap();

        let cli = Cli::parse_from([
            "multisig",
            "--config",
            path.to_str().unwrap(),
            "--indexer-url",
            "none",
            "deposits",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.indexer_url, None);
    }
}
