//! The multi-endpoint transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use txindex_core::types::{BlockHeader, RawTxRecord};

use crate::error::TransportError;
use crate::health::{EndpointHealth, HealthMap, HealthMonitor};
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{parse_hex_u64, RpcBlock};

/// Configuration for [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub retry: RetryConfig,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
    /// Health monitor cadence.
    pub health_interval: Duration,
    /// Blocks behind the fleet maximum before an endpoint is stale.
    pub stale_threshold: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(10),
            stale_threshold: 3,
        }
    }
}

/// Multi-endpoint JSON-RPC client. Cheaply cloneable — the health map and
/// request counter are shared across clones.
#[derive(Clone)]
pub struct Transport {
    endpoints: Vec<String>,
    http: reqwest::Client,
    health: HealthMap,
    retry: RetryPolicy,
    request_timeout: Duration,
    health_interval: Duration,
    stale_threshold: u64,
    next_id: Arc<AtomicU64>,
}

impl Transport {
    /// Build a transport over an ordered endpoint list; position is routing
    /// priority.
    pub fn new(endpoints: Vec<String>, config: TransportConfig) -> Self {
        assert!(!endpoints.is_empty(), "transport requires at least one endpoint");
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            endpoints,
            http,
            health: Arc::new(RwLock::new(HashMap::new())),
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
            health_interval: config.health_interval,
            stale_threshold: config.stale_threshold,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start the background health monitor. The returned handle exits once
    /// the shutdown signal flips to `true`.
    pub fn spawn_health_monitor(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        HealthMonitor::new(
            self.endpoints.clone(),
            self.http.clone(),
            Arc::clone(&self.health),
            self.health_interval,
            self.stale_threshold,
        )
        .spawn(shutdown)
    }

    /// Current health snapshot in configured priority order, for operator
    /// logging. `None` means the endpoint has not been probed yet.
    pub fn health_summary(&self) -> Vec<(String, Option<EndpointHealth>)> {
        let map = self.health.read().expect("health map poisoned");
        self.endpoints
            .iter()
            .map(|url| (url.clone(), map.get(url).cloned()))
            .collect()
    }

    /// Pick the endpoint for the next attempt: first healthy (or not yet
    /// probed) in priority order, falling back to the first configured
    /// endpoint when everything is marked unhealthy.
    fn route(&self) -> String {
        let map = self.health.read().expect("health map poisoned");
        first_eligible(&self.endpoints, &map).to_string()
    }

    async fn send_once(
        &self,
        url: &str,
        req: &JsonRpcRequest,
    ) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        if !resp.status().is_success() {
            return Err(TransportError::Http(format!(
                "HTTP {} from {url}",
                resp.status().as_u16()
            )));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        body.into_result().map_err(|e| TransportError::Rpc {
            code: e.code,
            message: e.message,
        })
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }

    /// One logical call: retry with exponential backoff, re-routing on
    /// every attempt so endpoint recovery propagates mid-call.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let url = self.route();
            match self.send_once(&url, &req).await {
                Ok(value) => {
                    return serde_json::from_value(value).map_err(TransportError::Deserialization)
                }
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            endpoint = %url,
                            method,
                            error = %e,
                            "retrying RPC call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, endpoint = %url, method, error = %e, "retries exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Current chain head block number (`eth_blockNumber`).
    pub async fn current_head(&self) -> Result<u64, TransportError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| TransportError::InvalidResponse(format!("bad block number: {hex:?}")))
    }

    /// Chain id of whatever the routed endpoint serves (`eth_chainId`).
    pub async fn chain_id(&self) -> Result<u64, TransportError> {
        let hex: String = self.call("eth_chainId", vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| TransportError::InvalidResponse(format!("bad chain id: {hex:?}")))
    }

    /// Header of block `number`, or `None` when the node does not have it
    /// yet.
    pub async fn fetch_block_header(
        &self,
        number: u64,
    ) -> Result<Option<BlockHeader>, TransportError> {
        let block: Option<RpcBlock> = self
            .call(
                "eth_getBlockByNumber",
                vec![json!(format!("0x{number:x}")), json!(false)],
            )
            .await?;
        block.map(|b| b.header()).transpose()
    }

    /// Full block with transaction objects, pre-converted to the raw record
    /// shape the validator consumes.
    pub async fn fetch_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<RawTxRecord>)>, TransportError> {
        let block: Option<RpcBlock> = self
            .call(
                "eth_getBlockByNumber",
                vec![json!(format!("0x{number:x}")), json!(true)],
            )
            .await?;
        match block {
            None => Ok(None),
            Some(b) => {
                let header = b.header()?;
                let raw = b.transactions.iter().map(|tx| tx.to_raw_record()).collect();
                Ok(Some((header, raw)))
            }
        }
    }
}

/// First endpoint in priority order that is healthy or not yet probed;
/// first configured endpoint as the safety valve.
fn first_eligible<'a>(
    endpoints: &'a [String],
    map: &HashMap<String, EndpointHealth>,
) -> &'a str {
    endpoints
        .iter()
        .find(|url| map.get(*url).map(|h| h.healthy).unwrap_or(true))
        .unwrap_or(&endpoints[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(healthy: bool, height: u64) -> EndpointHealth {
        EndpointHealth {
            healthy,
            height: Some(height),
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn routes_around_stale_endpoint() {
        let endpoints = urls(&["https://a", "https://b", "https://c"]);
        let mut map = HashMap::new();
        map.insert("https://a".to_string(), health(false, 995));
        map.insert("https://b".to_string(), health(true, 1000));
        map.insert("https://c".to_string(), health(true, 1000));
        assert_eq!(first_eligible(&endpoints, &map), "https://b");
    }

    #[test]
    fn priority_order_wins_among_healthy() {
        let endpoints = urls(&["https://a", "https://b"]);
        let mut map = HashMap::new();
        map.insert("https://a".to_string(), health(true, 1000));
        map.insert("https://b".to_string(), health(true, 1000));
        assert_eq!(first_eligible(&endpoints, &map), "https://a");
    }

    #[test]
    fn unprobed_endpoint_is_eligible() {
        let endpoints = urls(&["https://a", "https://b"]);
        let mut map = HashMap::new();
        map.insert("https://a".to_string(), health(false, 0));
        assert_eq!(first_eligible(&endpoints, &map), "https://b");
    }

    #[test]
    fn falls_back_to_first_when_nothing_is_healthy() {
        let endpoints = urls(&["https://a", "https://b"]);
        let mut map = HashMap::new();
        map.insert("https://a".to_string(), health(false, 0));
        map.insert("https://b".to_string(), health(false, 0));
        assert_eq!(first_eligible(&endpoints, &map), "https://a");
    }
}
