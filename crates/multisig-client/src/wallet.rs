//! Wallet adapter: where signing accounts come from and which one is active.

use crate::account::Account;
use crate::provider_error;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use multisig_error::{MultisigError, Result};
use multisig_provider::{ProviderError, RpcClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// JSON-RPC code for "method not found"
const METHOD_NOT_FOUND: i64 = -32601;

/// A source of accounts, either local keys or a node.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// False when there is nothing to connect to
    fn is_available(&self) -> bool {
        true
    }

    /// Asks the source to grant account access. Sources without a permission
    /// model accept immediately.
    async fn request_permissions(&self) -> Result<()> {
        Ok(())
    }

    /// Requests access and returns the granted accounts
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Accounts currently exposed, without prompting
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Chain the source signs for
    async fn chain_id(&self) -> Result<u64>;

    /// Signing handle for `address`, if this source controls it
    fn account(&self, address: Address) -> Option<Account>;
}

/// Accounts backed by private keys held in memory.
pub struct LocalAccounts {
    accounts: Vec<Account>,
    chain_id: u64,
}

impl LocalAccounts {
    /// Builds signers from hex private keys.
    pub fn from_keys<S: AsRef<str>>(keys: &[S], chain_id: u64) -> Result<Self> {
        let accounts = keys
            .iter()
            .map(|key| Account::from_private_key(key.as_ref(), chain_id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { accounts, chain_id })
    }

    /// Wraps already-built signers
    pub fn from_signers(signers: Vec<PrivateKeySigner>, chain_id: u64) -> Self {
        Self {
            accounts: signers.into_iter().map(Account::Local).collect(),
            chain_id,
        }
    }

    fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(Account::address).collect()
    }
}

#[async_trait]
impl AccountSource for LocalAccounts {
    fn is_available(&self) -> bool {
        !self.accounts.is_empty()
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.addresses())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.addresses())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn account(&self, address: Address) -> Option<Account> {
        self.accounts.iter().find(|a| a.address() == address).cloned()
    }
}

/// Accounts unlocked on a JSON-RPC node (a dev node or a signer proxy).
pub struct NodeAccounts {
    url: String,
    client: RpcClient,
}

impl NodeAccounts {
    pub fn new(url: impl Into<String>, client: RpcClient) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    async fn call<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<R, ProviderError> {
        self.client.rpc_call(&self.url, method, params).await
    }
}

#[async_trait]
impl AccountSource for NodeAccounts {
    async fn request_permissions(&self) -> Result<()> {
        let params = serde_json::json!([{ "eth_accounts": {} }]);
        self.call::<serde_json::Value>("wallet_requestPermissions", params)
            .await
            .map(|_| ())
            .map_err(|e| provider_error(&self.url, "wallet_requestPermissions", e))
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        match self.call("eth_requestAccounts", serde_json::json!([])).await {
            Ok(accounts) => Ok(accounts),
            Err(ProviderError::RpcError { code, .. }) if code == METHOD_NOT_FOUND => {
                debug!("eth_requestAccounts unsupported, using eth_accounts");
                self.accounts().await
            }
            Err(e) => Err(provider_error(&self.url, "eth_requestAccounts", e)),
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.call("eth_accounts", serde_json::json!([]))
            .await
            .map_err(|e| provider_error(&self.url, "eth_accounts", e))
    }

    async fn chain_id(&self) -> Result<u64> {
        let hex: String = self
            .call("eth_chainId", serde_json::json!([]))
            .await
            .map_err(|e| provider_error(&self.url, "eth_chainId", e))?;
        let digits = hex.trim_start_matches("0x");
        u64::from_str_radix(digits, 16)
            .map_err(|_| MultisigError::FormatError(format!("eth_chainId returned '{hex}'")))
    }

    fn account(&self, address: Address) -> Option<Account> {
        Some(Account::Node(address))
    }
}

/// Connection state of the wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletState {
    pub is_connected: bool,
    /// The active account
    pub address: Option<Address>,
    pub available_addresses: Vec<Address>,
    pub is_connecting: bool,
    pub error: Option<String>,
    pub show_account_selector: bool,
}

/// Changes reported by an account source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Tracks the connected accounts of one [`AccountSource`].
pub struct Wallet {
    source: Arc<dyn AccountSource>,
    state: WalletState,
}

impl Wallet {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self {
            source,
            state: WalletState::default(),
        }
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    pub fn source(&self) -> &Arc<dyn AccountSource> {
        &self.source
    }

    /// Refreshes the account list without prompting.
    pub async fn check_connection(&mut self) {
        if !self.source.is_available() {
            return;
        }

        match self.source.accounts().await {
            Ok(accounts) if !accounts.is_empty() => {
                let address = self
                    .state
                    .address
                    .filter(|current| accounts.contains(current))
                    .or_else(|| accounts.first().copied());
                self.state.is_connected = true;
                self.state.address = address;
                self.state.available_addresses = accounts;
                self.state.error = None;
            }
            Ok(_) => self.state = WalletState::default(),
            Err(e) => {
                warn!(error = %e, "failed to read accounts");
                self.state = WalletState {
                    error: Some(e.to_string()),
                    ..WalletState::default()
                };
            }
        }
    }

    /// Requests account access and connects to the first granted account.
    pub async fn connect(&mut self) -> Result<()> {
        self.state.is_connecting = true;
        self.state.error = None;

        let result = self.request_access().await;
        self.state.is_connecting = false;
        match result {
            Ok(()) => {
                info!(address = ?self.state.address, accounts = self.state.available_addresses.len(), "wallet connected");
                Ok(())
            }
            Err(e) => {
                self.state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn request_access(&mut self) -> Result<()> {
        if !self.source.is_available() {
            return Err(MultisigError::NoWalletFound(
                "No wallet found. Set MULTISIG_PRIVATE_KEYS or use the node account source".into(),
            ));
        }

        if let Err(e) = self.source.request_permissions().await {
            debug!(error = %e, "permission request failed, requesting accounts directly");
        }

        let accounts = self.source.request_accounts().await?;
        if accounts.is_empty() {
            return Err(MultisigError::NoWalletFound("the wallet exposed no accounts".into()));
        }
        self.check_connection().await;
        match self.state.error.take() {
            Some(message) => Err(MultisigError::Other(message)),
            None => Ok(()),
        }
    }

    pub fn disconnect(&mut self) {
        self.state = WalletState::default();
    }

    /// Makes `address` the active account and closes the selector.
    pub fn select_account(&mut self, address: Address) -> Result<()> {
        if !self.state.available_addresses.contains(&address) {
            return Err(MultisigError::AccountNotAvailable(address.to_checksum(None)));
        }
        self.state.address = Some(address);
        self.state.show_account_selector = false;
        Ok(())
    }

    pub fn toggle_account_selector(&mut self) {
        self.state.show_account_selector = !self.state.show_account_selector;
    }

    /// Applies an event from the source.
    pub async fn handle_event(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => {
                let Some(first) = accounts.first().copied() else {
                    info!("all accounts removed, disconnecting");
                    self.disconnect();
                    return;
                };
                self.state.is_connected = true;
                self.state.address = Some(first);
                self.state.available_addresses = accounts;
                self.state.error = None;
            }
            WalletEvent::ChainChanged(chain_id) => {
                info!(chain_id, "chain changed, reconnecting");
                self.state = WalletState::default();
                self.check_connection().await;
            }
        }
    }

    pub fn active_address(&self) -> Option<Address> {
        if self.state.is_connected {
            self.state.address
        } else {
            None
        }
    }

    /// Signing handle for the active address.
    pub fn active_account(&self) -> Result<Account> {
        let address = self.active_address().ok_or(MultisigError::WalletNotConnected)?;
        self.source
            .account(address)
            .ok_or_else(|| MultisigError::AccountNotAvailable(address.to_checksum(None)))
    }
}

/// Polls `source` and reports account and chain changes.
///
/// The first poll only records a baseline. Read errors are logged and
/// skipped. The task ends when the receiver is dropped.
pub fn watch_accounts(
    source: Arc<dyn AccountSource>,
    interval: Duration,
) -> (mpsc::Receiver<WalletEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last_accounts: Option<Vec<Address>> = None;
        let mut last_chain: Option<u64> = None;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            match source.chain_id().await {
                Ok(chain_id) => {
                    if last_chain.is_some_and(|prev| prev != chain_id)
                        && tx.send(WalletEvent::ChainChanged(chain_id)).await.is_err()
                    {
                        break;
                    }
                    last_chain = Some(chain_id);
                }
                Err(e) => debug!(error = %e, "chain id poll failed"),
            }

            match source.accounts().await {
                Ok(accounts) => {
                    let changed = last_accounts.as_ref().is_some_and(|prev| *prev != accounts);
                    if changed
                        && tx
                            .send(WalletEvent::AccountsChanged(accounts.clone()))
                            .await
                            .is_err()
                    {
                        break;
                    }
                    last_accounts = Some(accounts);
                }
                Err(e) => debug!(error = %e, "account poll failed"),
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    /// Source whose account list can be swapped at runtime.
    #[derive(Default)]
    struct ScriptedSource {
        accounts: Mutex<Vec<Address>>,
        chain_id: Mutex<u64>,
        deny_permissions: bool,
        fail_accounts: bool,
    }

    impl ScriptedSource {
        fn with(accounts: Vec<Address>) -> Self {
            Self {
                accounts: Mutex::new(accounts),
                chain_id: Mutex::new(44787),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AccountSource for ScriptedSource {
        async fn request_permissions(&self) -> Result<()> {
            if self.deny_permissions {
                return Err(MultisigError::WalletRejected("method not supported".into()));
            }
            Ok(())
        }

        async fn request_accounts(&self) -> Result<Vec<Address>> {
            self.accounts().await
        }

        async fn accounts(&self) -> Result<Vec<Address>> {
            if self.fail_accounts {
                return Err(MultisigError::RpcConnectionError {
                    url: "mock".into(),
                    reason: "down".into(),
                });
            }
            Ok(self.accounts.lock().unwrap().clone())
        }

        async fn chain_id(&self) -> Result<u64> {
            Ok(*self.chain_id.lock().unwrap())
        }

        fn account(&self, address: Address) -> Option<Account> {
            Some(Account::Node(address))
        }
    }

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[tokio::test]
    async fn test_connect_picks_first_account() {
        let mut wallet = Wallet::new(Arc::new(ScriptedSource::with(vec![addr(1), addr(2)])));
        wallet.connect().await.unwrap();

        let state = wallet.state();
        assert!(state.is_connected);
        assert!(!state.is_connecting);
        assert_eq!(state.address, Some(addr(1)));
        assert_eq!(state.available_addresses, vec![addr(1), addr(2)]);
        assert_eq!(wallet.active_account().unwrap().address(), addr(1));
    }

    #[tokio::test]
    async fn test_connect_tolerates_permission_failure() {
        let source = ScriptedSource {
            deny_permissions: true,
            ..ScriptedSource::with(vec![addr(3)])
        };
        let mut wallet = Wallet::new(Arc::new(source));
        wallet.connect().await.unwrap();
        assert_eq!(wallet.active_address(), Some(addr(3)));
    }

    #[tokio::test]
    async fn test_connect_without_keys_reports_no_wallet() {
        let mut wallet = Wallet::new(Arc::new(LocalAccounts::from_signers(vec![], 44787)));
        let err = wallet.connect().await.unwrap_err();
        assert!(matches!(err, MultisigError::NoWalletFound(_)));
        assert!(wallet.state().error.as_deref().unwrap().contains("No wallet found"));
        assert!(!wallet.state().is_connecting);
        assert!(matches!(wallet.active_account(), Err(MultisigError::WalletNotConnected)));
    }

    #[tokio::test]
    async fn test_check_connection_keeps_active_address() {
        let source = Arc::new(ScriptedSource::with(vec![addr(1), addr(2)]));
        let mut wallet = Wallet::new(source.clone());
        wallet.connect().await.unwrap();
        wallet.select_account(addr(2)).unwrap();

        *source.accounts.lock().unwrap() = vec![addr(3), addr(2)];
        wallet.check_connection().await;
        assert_eq!(wallet.active_address(), Some(addr(2)));

        *source.accounts.lock().unwrap() = vec![addr(4)];
        wallet.check_connection().await;
        assert_eq!(wallet.active_address(), Some(addr(4)));

        source.accounts.lock().unwrap().clear();
        wallet.check_connection().await;
        assert_eq!(wallet.state(), &WalletState::default());
    }

    #[tokio::test]
    async fn test_check_connection_records_error() {
        let source = ScriptedSource {
            fail_accounts: true,
            ..ScriptedSource::with(vec![addr(1)])
        };
        let mut wallet = Wallet::new(Arc::new(source));
        wallet.check_connection().await;
        assert!(!wallet.state().is_connected);
        assert!(wallet.state().error.as_deref().unwrap().contains("down"));
    }

    #[tokio::test]
    async fn test_accounts_changed_clears_error() {
        let source = ScriptedSource {
            fail_accounts: true,
            ..ScriptedSource::with(vec![addr(1)])
        };
        let mut wallet = Wallet::new(Arc::new(source));
        wallet.check_connection().await;
        assert!(wallet.state().error.is_some());

        wallet
            .handle_event(WalletEvent::AccountsChanged(vec![addr(4)]))
            .await;
        assert!(wallet.state().is_connected);
        assert_eq!(wallet.state().error, None);
        assert_eq!(wallet.active_address(), Some(addr(4)));
    }

    #[tokio::test]
    async fn test_select_and_toggle() {
        let mut wallet = Wallet::new(Arc::new(ScriptedSource::with(vec![addr(1), addr(2)])));
        wallet.connect().await.unwrap();

        wallet.toggle_account_selector();
        assert!(wallet.state().show_account_selector);
        wallet.select_account(addr(2)).unwrap();
        assert!(!wallet.state().show_account_selector);
        assert_eq!(wallet.active_address(), Some(addr(2)));

        assert!(matches!(
            wallet.select_account(addr(9)),
            Err(MultisigError::AccountNotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_events() {
        let source = Arc::new(ScriptedSource::with(vec![addr(1)]));
        let mut wallet = Wallet::new(source.clone());
        wallet.connect().await.unwrap();

        wallet
            .handle_event(WalletEvent::AccountsChanged(vec![addr(5), addr(1)]))
            .await;
        assert_eq!(wallet.active_address(), Some(addr(5)));

        wallet.handle_event(WalletEvent::AccountsChanged(vec![])).await;
        assert!(!wallet.state().is_connected);

        wallet.handle_event(WalletEvent::ChainChanged(42220)).await;
        assert_eq!(wallet.active_address(), Some(addr(1)));
    }

    #[tokio::test]
    async fn test_disconnect_resets() {
        let mut wallet = Wallet::new(Arc::new(ScriptedSource::with(vec![addr(1)])));
        wallet.connect().await.unwrap();
        wallet.disconnect();
        assert_eq!(wallet.state(), &WalletState::default());
    }

    #[tokio::test]
    async fn test_local_accounts() {
        let local = LocalAccounts::from_keys(&[KEY_A, KEY_B], 31337).unwrap();
        let accounts = local.accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(matches!(local.account(accounts[1]), Some(Account::Local(_))));
        assert!(local.account(addr(7)).is_none());
        assert_eq!(local.chain_id().await.unwrap(), 31337);
    }

    #[tokio::test]
    async fn test_watcher_reports_changes() {
        let source = Arc::new(ScriptedSource::with(vec![addr(1)]));
        let (mut events, handle) = watch_accounts(source.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(30)).await;
        *source.accounts.lock().unwrap() = vec![addr(2)];
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, WalletEvent::AccountsChanged(vec![addr(2)]));

        *source.chain_id.lock().unwrap() = 42220;
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, WalletEvent::ChainChanged(42220));

        drop(events);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
