//! # Multisig Provider
//!
//! Transport plumbing shared by the multisig client: endpoint configuration
//! with fallbacks, endpoint health tracking and failover, a pooled HTTP client
//! speaking JSON-RPC (wallet/node account requests) and GraphQL (the event
//! indexer), and an exponential backoff helper for retrying reads.
//!
//! ## Example
//!
//! ```no_run
//! use multisig_provider::{ProviderConfig, RpcClient};
//!
//! # async fn example() -> multisig_provider::Result<()> {
//! let config = ProviderConfig::new("https://alfajores-forno.celo-testnet.org")
//!     .with_timeout(30)
//!     .with_max_retries(3);
//! config.validate()?;
//!
//! let client = RpcClient::new()?;
//! let accounts: Vec<String> = client.rpc_call(&config.url, "eth_accounts", ()).await?;
//! println!("{accounts:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;

pub use backoff::{with_backoff, BackoffConfig, BackoffError, ExponentialBackoff};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Provider-related errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timeout
    #[error("Request timeout after {0}s")]
    Timeout(u64),

    /// Server answered with a non-success status
    #[error("HTTP status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON-RPC error response
    #[error("RPC error: code={code}, message={message}")]
    RpcError {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// GraphQL response carried errors
    #[error("GraphQL error: {0}")]
    GraphQl(String),
}

impl ProviderError {
    /// True for failures worth retrying against the same or another endpoint
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::ConnectionFailed(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Configuration for an RPC endpoint with optional fallbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Primary RPC URL
    pub url: String,
    /// Fallback URLs, tried in order after the primary degrades
    pub fallback_urls: Vec<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retry attempts for idempotent reads
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl ProviderConfig {
    /// Creates a new provider configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fallback_urls: Vec::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }

    /// Adds a fallback URL
    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_urls.push(url.into());
        self
    }

    /// Sets the request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the maximum retry attempts
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial retry delay
    pub fn with_retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Validates every configured URL
    pub fn validate(&self) -> Result<()> {
        for url in self.all_urls() {
            let parsed = Url::parse(url).map_err(|e| ProviderError::InvalidUrl(format!("{url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(ProviderError::InvalidUrl(format!(
                    "{url}: unsupported scheme '{}'",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Returns all URLs (primary + fallbacks)
    pub fn all_urls(&self) -> Vec<&str> {
        let mut urls = vec![self.url.as_str()];
        urls.extend(self.fallback_urls.iter().map(|s| s.as_str()));
        urls
    }

    /// Backoff schedule derived from the retry settings
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::new()
            .with_initial_delay(Duration::from_millis(self.retry_delay_ms))
            .with_max_attempts(self.max_retries.max(1))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        presets::celo_alfajores()
    }
}

/// Health status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    /// Endpoint is healthy
    Healthy,
    /// Endpoint is slow or failing intermittently
    Degraded,
    /// Endpoint is failing most requests
    Unhealthy,
    /// No request made yet
    Unknown,
}

/// Request statistics for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    /// The endpoint URL
    pub url: String,
    /// Current health status
    pub health: EndpointHealth,
    /// Last successful request time
    pub last_success: Option<Instant>,
    /// Last failed request time
    pub last_failure: Option<Instant>,
    /// Total requests made
    pub total_requests: u64,
    /// Total failures
    pub total_failures: u64,
    /// Average response time in milliseconds
    pub avg_response_ms: u64,
}

impl EndpointInfo {
    fn new(url: String) -> Self {
        Self {
            url,
            health: EndpointHealth::Unknown,
            last_success: None,
            last_failure: None,
            total_requests: 0,
            total_failures: 0,
            avg_response_ms: 0,
        }
    }

    fn record_success(&mut self, response_time_ms: u64) {
        let successes = self.total_requests - self.total_failures;
        self.last_success = Some(Instant::now());
        self.total_requests += 1;
        self.avg_response_ms =
            (self.avg_response_ms * successes + response_time_ms) / (successes + 1);
        self.health = match (self.failure_rate(), self.avg_response_ms) {
            (rate, _) if rate > 0.5 => EndpointHealth::Unhealthy,
            (rate, ms) if rate > 0.2 || ms >= 1000 => EndpointHealth::Degraded,
            _ => EndpointHealth::Healthy,
        };
    }

    fn record_failure(&mut self) {
        self.last_failure = Some(Instant::now());
        self.total_requests += 1;
        self.total_failures += 1;

        let failure_rate = self.failure_rate();
        if failure_rate > 0.5 {
            self.health = EndpointHealth::Unhealthy;
        } else if failure_rate > 0.2 {
            self.health = EndpointHealth::Degraded;
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64
        }
    }

    /// Returns the success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        1.0 - self.failure_rate()
    }
}

/// The configured endpoints of one chain, with the currently active one
#[derive(Debug)]
pub struct EndpointSet {
    config: ProviderConfig,
    endpoints: RwLock<Vec<EndpointInfo>>,
    active: RwLock<usize>,
}

impl EndpointSet {
    /// Creates the set from a validated configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let endpoints = config
            .all_urls()
            .into_iter()
            .map(|url| EndpointInfo::new(url.to_string()))
            .collect();

        Ok(Self {
            config,
            endpoints: RwLock::new(endpoints),
            active: RwLock::new(0),
        })
    }

    /// The configuration this set was built from
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Returns the active endpoint URL
    pub async fn current_url(&self) -> String {
        let idx = *self.active.read().await;
        let endpoints = self.endpoints.read().await;
        endpoints
            .get(idx)
            .map(|e| e.url.clone())
            .unwrap_or_else(|| self.config.url.clone())
    }

    /// Records a successful request against the active endpoint
    pub async fn record_success(&self, response_time_ms: u64) {
        let idx = *self.active.read().await;
        let mut endpoints = self.endpoints.write().await;
        if let Some(endpoint) = endpoints.get_mut(idx) {
            endpoint.record_success(response_time_ms);
        }
    }

    /// Records a failed request and fails over when the active endpoint is unhealthy
    pub async fn record_failure(&self) {
        let mut idx = self.active.write().await;
        let mut endpoints = self.endpoints.write().await;

        let Some(endpoint) = endpoints.get_mut(*idx) else {
            return;
        };
        endpoint.record_failure();
        if endpoint.health != EndpointHealth::Unhealthy {
            return;
        }

        let count = endpoints.len();
        for step in 1..count {
            let next = (*idx + step) % count;
            if endpoints[next].health != EndpointHealth::Unhealthy {
                tracing::warn!(
                    from = %endpoints[*idx].url,
                    to = %endpoints[next].url,
                    "RPC endpoint unhealthy, failing over"
                );
                *idx = next;
                return;
            }
        }
    }

    /// Returns endpoint statistics
    pub async fn stats(&self) -> Vec<EndpointInfo> {
        self.endpoints.read().await.clone()
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Connection timeout
    pub connect_timeout_secs: u64,
    /// Request timeout
    pub request_timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: format!("multisig-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// JSON-RPC request payload
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<T: Serialize> {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Method name
    pub method: String,
    /// Parameters
    pub params: T,
    /// Request ID
    pub id: u64,
}

impl<T: Serialize> JsonRpcRequest<T> {
    /// Creates a new JSON-RPC request
    pub fn new(method: impl Into<String>, params: T, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC response payload
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    /// Result (if successful)
    pub result: Option<T>,
    /// Error (if failed)
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
}

/// GraphQL request body
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a> {
    /// Query document
    pub query: &'a str,
    /// Variables, omitted when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

/// GraphQL response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    /// Response data
    pub data: Option<T>,
    /// Errors reported by the server
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One GraphQL error
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    /// Error message
    pub message: String,
}

/// Pooled HTTP client with optional rate limiting
pub struct RpcClient {
    client: Client,
    timeout_secs: u64,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    request_id: AtomicU64,
}

impl RpcClient {
    /// Creates a new client with default configuration and no rate limit
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default(), None)
    }

    /// Creates a new client with custom configuration
    pub fn with_config(
        http_config: HttpClientConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(http_config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(http_config.connect_timeout_secs))
            .timeout(Duration::from_secs(http_config.request_timeout_secs))
            .user_agent(&http_config.user_agent)
            .build()
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(config) => {
                let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
                    ProviderError::InvalidConfig("requests_per_second must be > 0".into())
                })?;
                let burst = NonZeroU32::new(config.burst_size)
                    .ok_or_else(|| ProviderError::InvalidConfig("burst_size must be > 0".into()))?;
                Some(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)))
            }
            None => None,
        };

        Ok(Self {
            client,
            timeout_secs: http_config.request_timeout_secs,
            rate_limiter,
            request_id: AtomicU64::new(1),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ProviderError::ConnectionFailed(e.to_string())
            } else {
                ProviderError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(256);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Makes a JSON-RPC request
    pub async fn rpc_call<P, R>(&self, url: &str, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(method, params, id);
        tracing::trace!(method, id, "JSON-RPC request");

        let rpc_response: JsonRpcResponse<R> = self.post(url, &request).await?.json().await?;

        if let Some(error) = rpc_response.error {
            return Err(ProviderError::RpcError {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response.result.ok_or_else(|| ProviderError::RpcError {
            code: -1,
            message: format!("No result in response to {method}"),
        })
    }

    /// Runs a GraphQL query and returns its `data`
    pub async fn graphql<T: DeserializeOwned>(&self, url: &str, query: &str) -> Result<T> {
        self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = GraphQlRequest {
            query,
            variables: None,
        };

        let response: GraphQlResponse<T> = self.post(url, &request).await?.json().await?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(ProviderError::GraphQl(messages.join("; ")));
        }

        response
            .data
            .ok_or_else(|| ProviderError::GraphQl("response carried no data".to_string()))
    }

    /// Returns the number of requests made
    pub fn request_count(&self) -> u64 {
        self.request_id.load(Ordering::SeqCst) - 1
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("request_count", &self.request_count())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}

/// Endpoint presets for the networks the multisig is deployed on
pub mod presets {
    use super::ProviderConfig;

    /// Celo Alfajores chain id
    pub const CELO_ALFAJORES_CHAIN_ID: u64 = 44787;
    /// Celo mainnet chain id
    pub const CELO_MAINNET_CHAIN_ID: u64 = 42220;
    /// Anvil default chain id
    pub const ANVIL_CHAIN_ID: u64 = 31337;

    /// Celo Alfajores testnet
    pub fn celo_alfajores() -> ProviderConfig {
        ProviderConfig::new("https://alfajores-forno.celo-testnet.org")
    }

    /// Celo mainnet
    pub fn celo_mainnet() -> ProviderConfig {
        ProviderConfig::new("https://forno.celo.org")
            .with_fallback("https://rpc.ankr.com/celo")
    }

    /// Local Anvil / Hardhat node
    pub fn local_node() -> ProviderConfig {
        ProviderConfig::new("http://127.0.0.1:8545")
            .with_timeout(10)
            .with_max_retries(1)
    }
}
