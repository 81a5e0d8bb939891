use reqwest::Client;

use crate::core::ProviderError;

const PROVIDER: &str = "binance";

/// Public spot market data. No authentication needed for klines.
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    pub const NAME: &'static str = PROVIDER;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Closing prices of the most recent `limit` candles, oldest first.
    pub async fn get_closes(
        &self,
        pair: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<f64>, ProviderError> {
        let url = format!("{}/api/v3/klines", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair.to_string()),
                ("interval", interval.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!("Binance klines error: {} for {}", status, pair);
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let klines: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .map_err(ProviderError::decode(PROVIDER))?;

        let closes: Vec<f64> = klines
            .iter()
            .filter_map(|k| k.get(4).and_then(parse_number))
            .collect();

        if closes.is_empty() {
            return Err(ProviderError::EmptySeries { provider: PROVIDER });
        }

        Ok(closes)
    }
}

/// Binance encodes prices as decimal strings.
fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    n.is_finite().then_some(n)
}
