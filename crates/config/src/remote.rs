//! Remote operator config: system prompt, VIP directory, business list.
//!
//! Fetched over HTTP with a cache-buster, cached in-process with a TTL.
//! The call path never blocks on a fetch: it reads the latest snapshot and
//! refreshes run in the background. Fetch failures serve the last cached
//! value or a minimal fallback; they never reach callers.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use voice_gateway_core::phone::normalize_last10;

/// One entry from the operator's VIP directory. Read-only at call scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VipRecord {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub voice_override: Option<String>,
    #[serde(default)]
    pub persona_notes: Option<String>,
    #[serde(default)]
    pub vibe: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub system_prompt: String,
    #[serde(default)]
    pub vips: Vec<VipRecord>,
    #[serde(default)]
    pub businesses: Vec<String>,
}

impl OperatorConfig {
    /// Minimal fallback used when nothing has ever been fetched.
    pub fn fallback(assistant_name: &str) -> Self {
        Self {
            system_prompt: format!("You are {assistant_name}."),
            vips: Vec::new(),
            businesses: Vec::new(),
        }
    }

    /// Resolve a caller against the VIP directory by last-10 match.
    pub fn match_vip(&self, caller: &str) -> Option<&VipRecord> {
        let caller10 = normalize_last10(caller);
        if caller10.is_empty() {
            return None;
        }
        self.vips
            .iter()
            .find(|v| normalize_last10(&v.phone) == caller10)
    }
}

struct Cached {
    config: Arc<OperatorConfig>,
    fetched_at: Instant,
}

/// TTL-cached operator config singleton.
pub struct ConfigProvider {
    http: reqwest::Client,
    url: Option<String>,
    ttl: Duration,
    fallback_assistant: String,
    cache: RwLock<Option<Cached>>,
}

impl ConfigProvider {
    pub fn new(url: Option<String>, ttl: Duration, fallback_assistant: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            ttl,
            fallback_assistant: fallback_assistant.into(),
            cache: RwLock::new(None),
        }
    }

    /// Latest snapshot without touching the network. Serves the fallback if
    /// nothing has been fetched yet.
    pub fn snapshot(&self) -> Arc<OperatorConfig> {
        self.cache
            .read()
            .as_ref()
            .map(|c| c.config.clone())
            .unwrap_or_else(|| Arc::new(OperatorConfig::fallback(&self.fallback_assistant)))
    }

    /// Fetch if the cache is stale (or `force_fresh`), then return the
    /// current snapshot. Fetch errors are logged, never propagated.
    pub async fn get(&self, force_fresh: bool) -> Arc<OperatorConfig> {
        let fresh_enough = !force_fresh
            && self
                .cache
                .read()
                .as_ref()
                .map(|c| c.fetched_at.elapsed() < self.ttl)
                .unwrap_or(false);
        if fresh_enough {
            return self.snapshot();
        }

        match self.fetch().await {
            Ok(config) => {
                let config = Arc::new(config);
                *self.cache.write() = Some(Cached {
                    config: config.clone(),
                    fetched_at: Instant::now(),
                });
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "operator config fetch failed, serving cached/fallback");
                self.snapshot()
            }
        }
    }

    /// Background refresh used at call setup so the call task never awaits
    /// the network.
    pub async fn refresh(&self) {
        let _ = self.get(false).await;
    }

    async fn fetch(&self) -> Result<OperatorConfig, crate::ConfigError> {
        let base = self.url.as_deref().ok_or(crate::ConfigError::Unconfigured)?;

        let buster = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let sep = if base.contains('?') { '&' } else { '?' };
        let url = format!("{base}{sep}cb={buster}");

        let body = self
            .http
            .get(&url)
            .header("Cache-Control", "no-store")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let config: OperatorConfig = serde_json::from_str(&body)?;
        tracing::debug!(
            vips = config.vips.len(),
            businesses = config.businesses.len(),
            "operator config refreshed"
        );
        Ok(config)
    }
}
