//! Background endpoint health monitoring.
//!
//! The monitor is the sole writer of the shared health map; every foreground
//! request reads a consistent snapshot. An endpoint is unhealthy when it
//! fails to answer a probe, or answers with a height more than
//! `stale_threshold` blocks behind the fleet maximum observed in the same
//! cycle. A full cycle of evidence drives every transition, and each
//! transition is logged exactly once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::types::parse_hex_u64;

/// Last observed state of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub healthy: bool,
    /// Height reported in the last probe cycle, if the endpoint answered.
    pub height: Option<u64>,
}

/// Shared endpoint-health snapshot. Written only by the monitor.
pub(crate) type HealthMap = Arc<RwLock<HashMap<String, EndpointHealth>>>;

/// Periodic prober feeding the shared health map.
pub struct HealthMonitor {
    endpoints: Vec<String>,
    http: reqwest::Client,
    map: HealthMap,
    interval: Duration,
    stale_threshold: u64,
}

impl HealthMonitor {
    pub(crate) fn new(
        endpoints: Vec<String>,
        http: reqwest::Client,
        map: HealthMap,
        interval: Duration,
        stale_threshold: u64,
    ) -> Self {
        Self {
            endpoints,
            http,
            map,
            interval,
            stale_threshold,
        }
    }

    /// Run the probe loop until the shutdown signal flips.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick().await,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        })
    }

    async fn tick(&self) {
        let mut observed = Vec::with_capacity(self.endpoints.len());
        for url in &self.endpoints {
            observed.push((url.clone(), self.probe(url).await));
        }
        let statuses = classify(&observed, self.stale_threshold);

        let mut map = self.map.write().expect("health map poisoned");
        for (url, next) in statuses {
            let was_healthy = map.get(&url).map(|h| h.healthy);
            match (was_healthy, next.healthy) {
                (Some(true) | None, false) => tracing::warn!(
                    endpoint = %url,
                    height = ?next.height,
                    "endpoint marked unhealthy"
                ),
                (Some(false), true) => tracing::info!(endpoint = %url, "endpoint recovered"),
                _ => {}
            }
            map.insert(url, next);
        }
    }

    /// One raw `eth_blockNumber` probe — no retries; the cadence is the
    /// retry.
    async fn probe(&self, url: &str) -> Option<u64> {
        let req = JsonRpcRequest::new(0, "eth_blockNumber", vec![]);
        let resp = self.http.post(url).json(&req).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: JsonRpcResponse = resp.json().await.ok()?;
        let value = body.into_result().ok()?;
        parse_hex_u64(value.as_str()?)
    }
}

/// Classify one probe cycle: unreachable or more than `stale_threshold`
/// blocks behind the fleet maximum means unhealthy.
pub fn classify(
    observed: &[(String, Option<u64>)],
    stale_threshold: u64,
) -> Vec<(String, EndpointHealth)> {
    let max_height = observed.iter().filter_map(|(_, h)| *h).max();
    observed
        .iter()
        .map(|(url, height)| {
            let healthy = match (*height, max_height) {
                (Some(h), Some(max)) => max.saturating_sub(h) <= stale_threshold,
                _ => false,
            };
            (
                url.clone(),
                EndpointHealth {
                    healthy,
                    height: *height,
                },
            )
        })
        .collect()
}
