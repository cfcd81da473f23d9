//! Client configuration.
//!
//! Values are layered: built-in defaults, then the JSON file, then
//! `MULTISIG_*` environment variables. The CLI applies its flags last.

use crate::amount::{DEFAULT_TOKEN_DECIMALS, MAX_TOKEN_DECIMALS};
use crate::format::parse_address;
use alloy::primitives::Address;
use multisig_error::{MultisigError, Result};
use multisig_provider::{presets, HttpClientConfig, ProviderConfig, RateLimitConfig, RpcClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File read when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "multisig_config.json";

/// Environment variable holding comma-separated private keys.
pub const PRIVATE_KEYS_ENV: &str = "MULTISIG_PRIVATE_KEYS";

/// Where signing accounts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountSourceKind {
    /// Private keys from `MULTISIG_PRIVATE_KEYS`
    #[default]
    Local,
    /// Unlocked accounts on the RPC node
    Node,
}

impl std::str::FromStr for AccountSourceKind {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "node" => Ok(Self::Node),
            other => Err(MultisigError::ConfigError(format!(
                "unknown account source '{other}', expected 'local' or 'node'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultisigConfig {
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    pub chain_id: u64,
    pub multisig_address: String,
    pub indexer_url: Option<String>,
    pub token_decimals: u8,
    /// Upper bound on transaction ids read per fetch
    pub max_transactions: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Requests per second allowed to the indexer and node-account endpoints
    pub rate_limit_per_second: u32,
    pub rate_limit_burst: u32,
    pub account_source: AccountSourceKind,
}

impl Default for MultisigConfig {
    fn default() -> Self {
        let provider = presets::celo_alfajores();
        Self {
            rpc_url: provider.url,
            fallback_rpc_urls: provider.fallback_urls,
            chain_id: presets::CELO_ALFAJORES_CHAIN_ID,
            multisig_address: "0x5168f18e89fdd2e88114870d2837c0e31170564a".to_string(),
            indexer_url: Some("http://localhost:4001/graphql".to_string()),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            max_transactions: 100,
            poll_interval_secs: 10,
            request_timeout_secs: provider.timeout_secs,
            max_retries: provider.max_retries,
            rate_limit_per_second: RateLimitConfig::default().requests_per_second,
            rate_limit_burst: RateLimitConfig::default().burst_size,
            account_source: AccountSourceKind::Local,
        }
    }
}

impl MultisigConfig {
    /// Reads `path`, or the default file when `path` is `None`.
    ///
    /// An explicit path must exist. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(MultisigError::ConfigError(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents).map_err(|e| {
            MultisigError::ConfigError(format!("{}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Writes the configuration as pretty JSON. Private keys are never part of it.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MultisigError::JsonError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Applies `MULTISIG_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `MULTISIG_*` overrides looked up through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MULTISIG_RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = get("MULTISIG_FALLBACK_RPC_URLS") {
            self.fallback_rpc_urls = split_list(&v);
        }
        if let Some(v) = get("MULTISIG_CHAIN_ID") {
            self.chain_id = parse_number("MULTISIG_CHAIN_ID", &v)?;
        }
        if let Some(v) = get("MULTISIG_CONTRACT") {
            self.multisig_address = v;
        }
        if let Some(v) = get("MULTISIG_INDEXER_URL") {
            self.indexer_url = parse_indexer_url(&v);
        }
        if let Some(v) = get("MULTISIG_TOKEN_DECIMALS") {
            self.token_decimals = parse_number("MULTISIG_TOKEN_DECIMALS", &v)?;
        }
        if let Some(v) = get("MULTISIG_MAX_TRANSACTIONS") {
            self.max_transactions = parse_number("MULTISIG_MAX_TRANSACTIONS", &v)?;
        }
        if let Some(v) = get("MULTISIG_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_number("MULTISIG_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("MULTISIG_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("MULTISIG_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("MULTISIG_MAX_RETRIES") {
            self.max_retries = parse_number("MULTISIG_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("MULTISIG_RATE_LIMIT_PER_SECOND") {
            self.rate_limit_per_second = parse_number("MULTISIG_RATE_LIMIT_PER_SECOND", &v)?;
        }
        if let Some(v) = get("MULTISIG_RATE_LIMIT_BURST") {
            self.rate_limit_burst = parse_number("MULTISIG_RATE_LIMIT_BURST", &v)?;
        }
        if let Some(v) = get("MULTISIG_ACCOUNT_SOURCE") {
            self.account_source = v.parse()?;
        }
        Ok(())
    }

    /// Checks URLs, the contract address and numeric limits.
    pub fn validate(&self) -> Result<()> {
        self.provider_config()
            .validate()
            .map_err(|e| MultisigError::ConfigError(e.to_string()))?;
        self.multisig()?;
        if let Some(url) = &self.indexer_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(MultisigError::ConfigError(format!(
                    "indexer_url must be http(s): {url}"
                )));
            }
        }
        if self.max_transactions == 0 {
            return Err(MultisigError::ConfigError("max_transactions must be > 0".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(MultisigError::ConfigError("poll_interval_secs must be > 0".into()));
        }
        if self.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(MultisigError::ConfigError(format!(
                "token_decimals must be at most {MAX_TOKEN_DECIMALS}, got {}",
                self.token_decimals
            )));
        }
        if self.rate_limit_per_second == 0 || self.rate_limit_burst == 0 {
            return Err(MultisigError::ConfigError(
                "rate_limit_per_second and rate_limit_burst must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The parsed multisig contract address
    pub fn multisig(&self) -> Result<Address> {
        parse_address(&self.multisig_address)
    }

    /// Endpoint configuration for the chain client
    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(self.rpc_url.clone())
            .with_timeout(self.request_timeout_secs)
            .with_max_retries(self.max_retries);
        for url in &self.fallback_rpc_urls {
            config = config.with_fallback(url.clone());
        }
        config
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.rate_limit_per_second,
            burst_size: self.rate_limit_burst,
        }
    }

    /// Rate-limited HTTP client for the indexer and node-account calls.
    pub fn rpc_client(&self) -> Result<RpcClient> {
        let http = HttpClientConfig {
            request_timeout_secs: self.request_timeout_secs,
            ..HttpClientConfig::default()
        };
        RpcClient::with_config(http, Some(self.rate_limit()))
            .map_err(|e| MultisigError::ConfigError(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// `none` or `off` disables the indexer.
pub fn parse_indexer_url(value: &str) -> Option<String> {
    match value.trim() {
        "" => None,
        v if v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("off") => None,
        url => Some(url.to_string()),
    }
}

/// Private keys from `MULTISIG_PRIVATE_KEYS`, comma separated.
pub fn private_keys_from_env() -> Vec<String> {
    std::env::var(PRIVATE_KEYS_ENV)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MultisigError::ConfigError(format!("{key}: '{value}' is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_target_alfajores() {
        let config = MultisigConfig::default();
        assert_eq!(config.chain_id, 44787);
        assert_eq!(config.rpc_url, "https://alfajores-forno.celo-testnet.org");
        assert_eq!(config.max_transactions, 100);
        assert_eq!(config.token_decimals, 18);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MULTISIG_RPC_URL", "http://127.0.0.1:8545"),
            ("MULTISIG_FALLBACK_RPC_URLS", "http://a:1, http://b:2,"),
            ("MULTISIG_CHAIN_ID", "31337"),
            ("MULTISIG_INDEXER_URL", "none"),
            ("MULTISIG_ACCOUNT_SOURCE", "Node"),
            ("MULTISIG_TOKEN_DECIMALS", ""),
        ]);
        let mut config = MultisigConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.fallback_rpc_urls, vec!["http://a:1", "http://b:2"]);
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.indexer_url, None);
        assert_eq!(config.account_source, AccountSourceKind::Node);
        assert_eq!(config.token_decimals, 18);
    }

    #[test]
    fn test_env_transport_settings() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MULTISIG_REQUEST_TIMEOUT_SECS", "5"),
            ("MULTISIG_MAX_RETRIES", "7"),
            ("MULTISIG_RATE_LIMIT_PER_SECOND", "2"),
            ("MULTISIG_RATE_LIMIT_BURST", "4"),
            ("MULTISIG_INDEXER_URL", "OFF"),
        ]);
        let mut config = MultisigConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.indexer_url, None);
        assert_eq!(config.provider_config().max_retries, 7);
        assert_eq!(config.provider_config().timeout_secs, 5);

        let limit = config.rate_limit();
        assert_eq!(limit.requests_per_second, 2);
        assert_eq!(limit.burst_size, 4);
        config.validate().unwrap();
        config.rpc_client().unwrap();
    }

    #[test]
    fn test_indexer_url_keywords() {
        assert_eq!(parse_indexer_url("none"), None);
        assert_eq!(parse_indexer_url(" off "), None);
        assert_eq!(
            parse_indexer_url("http://localhost:4001/graphql"),
            Some("http://localhost:4001/graphql".to_string())
        );
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut config = MultisigConfig::default();
        let err = config
            .apply_env_from(|k| (k == "MULTISIG_CHAIN_ID").then(|| "celo".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MULTISIG_CHAIN_ID"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MultisigConfig::default();
        config.multisig_address = "0x1234".into();
        assert!(matches!(config.validate(), Err(MultisigError::InvalidAddress { .. })));

        let mut config = MultisigConfig::default();
        config.rpc_url = "ftp://node".into();
        assert!(matches!(config.validate(), Err(MultisigError::ConfigError(_))));

        let mut config = MultisigConfig::default();
        config.max_transactions = 0;
        assert!(config.validate().is_err());

        let mut config = MultisigConfig::default();
        config.token_decimals = 77;
        config.validate().unwrap();
        config.token_decimals = 78;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token_decimals"));

        let mut config = MultisigConfig::default();
        config.rate_limit_per_second = 0;
        assert!(matches!(config.validate(), Err(MultisigError::ConfigError(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multisig_config.json");

        let mut config = MultisigConfig::default();
        config.indexer_url = None;
        config.poll_interval_secs = 3;
        config.save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(!json.to_lowercase().contains("private"));

        let loaded = MultisigConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "chain_id": 31337, "account_source": "node" }"#).unwrap();

        let loaded = MultisigConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.chain_id, 31337);
        assert_eq!(loaded.account_source, AccountSourceKind::Node);
        assert_eq!(loaded.max_transactions, 100);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            MultisigConfig::load(Some(&missing)),
            Err(MultisigError::ConfigError(_))
        ));
    }
}
