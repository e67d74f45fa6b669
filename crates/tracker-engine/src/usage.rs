//! Quota pre-flight.
//!
//! Config-gated: before a batch starts, ask the usage service whether enough
//! headroom exists, waiting a bounded number of minutes for quota to free up
//! before aborting the batch. The service is external; an unset endpoint
//! means no data, which passes with a warning rather than blocking work.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tracker_core::config::UsageLimits;
use tracker_core::{Error, Result};

/// Poll interval while waiting for quota.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Per-minute ceilings by organization tier, used when the service response
/// omits availability numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCeiling {
    pub input_tokens_per_minute: u64,
    pub requests_per_minute: u64,
}

/// Tiers 1 through 4.
pub const TIER_CEILINGS: [TierCeiling; 4] = [
    TierCeiling { input_tokens_per_minute: 40_000, requests_per_minute: 50 },
    TierCeiling { input_tokens_per_minute: 80_000, requests_per_minute: 1_000 },
    TierCeiling { input_tokens_per_minute: 160_000, requests_per_minute: 2_000 },
    TierCeiling { input_tokens_per_minute: 400_000, requests_per_minute: 4_000 },
];

/// Ceilings for a tier (1-based); out-of-range tiers clamp to the table edge.
pub fn tier_ceiling(tier: u8) -> TierCeiling {
    let index = usize::from(tier.clamp(1, 4)) - 1;
    TIER_CEILINGS[index]
}

/// Point-in-time quota numbers from the service. All fields optional; the
/// reader is tolerant of partial responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageSnapshot {
    pub available_input_tokens: Option<u64>,
    pub available_requests: Option<u64>,
    pub session_cost_usd: Option<f64>,
    pub organization_tier: Option<u8>,
}

/// HTTP client for the quota service.
#[derive(Debug, Clone)]
pub struct UsageClient {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl UsageClient {
    pub fn new(limits: &UsageLimits) -> Self {
        Self {
            endpoint: limits.endpoint.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the current snapshot; `None` when no endpoint is configured.
    pub async fn snapshot(&self) -> Result<Option<UsageSnapshot>> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(None);
        };
        let response = self
            .http
            .get(endpoint)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| Error::Input(format!("usage service request failed: {e}")))?;
        let snapshot = response
            .json::<UsageSnapshot>()
            .await
            .map_err(|e| Error::Input(format!("usage service response unreadable: {e}")))?;
        Ok(Some(snapshot))
    }
}

/// Does the snapshot clear the configured gates?
pub fn meets_gates(snapshot: &UsageSnapshot, limits: &UsageLimits) -> bool {
    let tier = limits
        .organization_tier
        .or(snapshot.organization_tier)
        .unwrap_or(1);
    let ceiling = tier_ceiling(tier);

    let tokens = snapshot
        .available_input_tokens
        .unwrap_or(ceiling.input_tokens_per_minute);
    let requests = snapshot
        .available_requests
        .unwrap_or(ceiling.requests_per_minute);
    let cost_ok = snapshot
        .session_cost_usd
        .is_none_or(|cost| cost < limits.max_cost_per_session);

    tokens >= limits.min_available_input_tokens
        && requests >= limits.min_available_requests
        && cost_ok
}

/// Gate a batch on quota, waiting up to `maxWaitMinutes`.
pub async fn preflight(limits: &UsageLimits) -> Result<()> {
    if !limits.enabled {
        return Ok(());
    }

    let client = UsageClient::new(limits);
    let deadline = Instant::now() + Duration::from_secs(limits.max_wait_minutes * 60);

    loop {
        match client.snapshot().await {
            Ok(None) => {
                warn!("usage limits enabled but no endpoint configured, skipping pre-flight");
                return Ok(());
            }
            Ok(Some(snapshot)) => {
                if meets_gates(&snapshot, limits) {
                    info!("usage pre-flight passed");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(Error::State(format!(
                        "quota still below limits after waiting {} minutes",
                        limits.max_wait_minutes
                    )));
                }
                info!(?snapshot, "quota below limits, waiting");
            }
            Err(e) => {
                // A flaky quota service should not block work forever.
                warn!(error = %e, "usage service unreachable, continuing without gate");
                return Ok(());
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
