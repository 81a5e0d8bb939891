use reqwest::Client;
use serde::Deserialize;

use crate::core::ProviderError;

const PROVIDER: &str = "coingecko";

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<Vec<serde_json::Value>>,
}

/// Free-tier price history. Used when the exchange feed is blocked or down.
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub const NAME: &'static str = PROVIDER;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Hourly USD prices for the last `days` days, oldest first.
    pub async fn get_hourly_closes(&self, asset_id: &str, days: u32) -> Result<Vec<f64>, ProviderError> {
        let url = format!(
            "{}/coins/{}/market_chart",
            self.base_url.trim_end_matches('/'),
            asset_id
        );

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[
                ("vs_currency", "usd".to_string()),
                ("days", days.to_string()),
                ("interval", "hourly".to_string()),
            ])
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!("Coingecko error: {} for {}", status, asset_id);
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let chart: MarketChart = response
            .json()
            .await
            .map_err(ProviderError::decode(PROVIDER))?;

        let closes: Vec<f64> = chart
            .prices
            .iter()
            .filter_map(|point| point.get(1).and_then(|v| v.as_f64()))
            .filter(|p| p.is_finite())
            .collect();

        if closes.is_empty() {
            return Err(ProviderError::EmptySeries { provider: PROVIDER });
        }

        Ok(closes)
    }
}
