use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ok: bool,
    pub time: DateTime<Utc>,
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    /// Credential configured.
    pub news_api: bool,
    /// Credential configured.
    pub llm: bool,
    /// `None` until the first price fetch settles.
    pub price_feed: Option<bool>,
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    status: Arc<RwLock<ComponentHealth>>,
}

impl HealthChecker {
    pub fn new(config: &Config) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            status: Arc::new(RwLock::new(ComponentHealth {
                news_api: config.has_news_credential(),
                llm: config.has_llm_credential(),
                price_feed: None,
            })),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.status.read().await.clone();

        HealthStatus {
            ok: true,
            time: Utc::now(),
            status: if components.price_feed.unwrap_or(true) {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    /// Records whether the latest price fetch produced real features.
    pub async fn record_price_feed(&self, healthy: bool) {
        self.status.write().await.price_feed = Some(healthy);
    }
}
