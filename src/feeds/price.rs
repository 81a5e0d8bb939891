use std::sync::Arc;
use std::time::Duration;

use super::cache::TtlCache;
use crate::api::{BinanceClient, CoinGeckoClient, PriceFeatures, Timeframe};
use crate::core::config::MarketConfig;
use crate::core::{Metrics, ProviderError};
use crate::strategy::compute_features;

pub const CANDLE_LIMIT: u32 = 200;

const BINANCE_PAIRS: &[(&str, &str)] = &[
    ("BTC", "BTCUSDT"),
    ("ETH", "ETHUSDT"),
    ("BNB", "BNBUSDT"),
    ("SOL", "SOLUSDT"),
    ("XRP", "XRPUSDT"),
    ("ADA", "ADAUSDT"),
    ("DOGE", "DOGEUSDT"),
    ("AVAX", "AVAXUSDT"),
    ("TRX", "TRXUSDT"),
    ("DOT", "DOTUSDT"),
    ("LINK", "LINKUSDT"),
    ("MATIC", "MATICUSDT"),
    ("LTC", "LTCUSDT"),
    ("BCH", "BCHUSDT"),
    ("TON", "TONUSDT"),
    ("ARB", "ARBUSDT"),
    ("OP", "OPUSDT"),
    ("ATOM", "ATOMUSDT"),
    ("APT", "APTUSDT"),
];

const COINGECKO_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("TRX", "tron"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("MATIC", "polygon-pos"),
    ("LTC", "litecoin"),
    ("BCH", "bitcoin-cash"),
    ("TON", "toncoin"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("ATOM", "cosmos"),
    ("APT", "aptos"),
];

fn lookup(table: &[(&str, &'static str)], ticker: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(symbol, _)| symbol.eq_ignore_ascii_case(ticker))
        .map(|(_, value)| *value)
}

/// Exchange trading pair for a ticker, `{TICKER}USDT` when not listed.
pub fn map_ticker_to_pair(ticker: &str) -> String {
    let ticker = ticker.trim().to_ascii_uppercase();
    lookup(BINANCE_PAIRS, &ticker)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}USDT", ticker))
}

/// Fallback provider asset id, the lowercased ticker when not listed.
pub fn map_ticker_to_asset_id(ticker: &str) -> String {
    let ticker = ticker.trim();
    lookup(COINGECKO_IDS, ticker)
        .map(str::to_string)
        .unwrap_or_else(|| ticker.to_ascii_lowercase())
}

/// History length requested from the fallback provider, in days of hourly points.
pub fn fallback_days(tf: Timeframe) -> u32 {
    match tf {
        Timeframe::M15 | Timeframe::H1 => 1,
        Timeframe::H4 => 2,
        Timeframe::D1 => 7,
    }
}

/// Price features from the exchange, falling back to the free price-history provider.
pub struct PriceFetcher {
    primary: BinanceClient,
    fallback: CoinGeckoClient,
    cache: TtlCache<(String, Timeframe), PriceFeatures>,
    metrics: Arc<Metrics>,
}

impl PriceFetcher {
    pub fn new(config: &MarketConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            primary: BinanceClient::new(config.binance_url.clone()),
            fallback: CoinGeckoClient::new(config.coingecko_url.clone()),
            cache: TtlCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_capacity,
            ),
            metrics,
        }
    }

    /// Features for `ticker` on `tf`. Errors only when both providers fail.
    pub async fn fetch(&self, ticker: &str, tf: Timeframe) -> Result<PriceFeatures, ProviderError> {
        let key = (ticker.to_ascii_uppercase(), tf);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Price cache hit for {} {}", ticker, tf);
            return Ok(cached);
        }

        let features = match self.fetch_primary(ticker, tf).await {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!("Primary price feed failed for {}: {}, trying fallback", ticker, e);
                self.metrics.record_provider_error(e.provider());
                self.metrics.record_fallback("price_primary");
                self.fetch_fallback(ticker, tf).await.map_err(|e| {
                    self.metrics.record_provider_error(e.provider());
                    e
                })?
            }
        };

        self.cache.insert(key, features.clone());
        Ok(features)
    }

    /// Like [`fetch`](Self::fetch) but never fails: zeroed features marked unavailable.
    pub async fn fetch_or_unavailable(&self, ticker: &str, tf: Timeframe) -> PriceFeatures {
        match self.fetch(ticker, tf).await {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!("Price feed unavailable for {}: {}", ticker, e);
                self.metrics.record_fallback("price");
                PriceFeatures::unavailable(map_ticker_to_pair(ticker), tf)
            }
        }
    }

    async fn fetch_primary(&self, ticker: &str, tf: Timeframe) -> Result<PriceFeatures, ProviderError> {
        let pair = map_ticker_to_pair(ticker);
        let closes = self.primary.get_closes(&pair, tf.as_str(), CANDLE_LIMIT).await?;
        let f = compute_features(&closes);

        Ok(PriceFeatures {
            pair,
            interval: tf,
            last: f.last,
            pct_change: f.pct_change,
            momentum: f.momentum,
            volatility: f.volatility,
            source: BinanceClient::NAME.to_string(),
        })
    }

    async fn fetch_fallback(&self, ticker: &str, tf: Timeframe) -> Result<PriceFeatures, ProviderError> {
        let asset_id = map_ticker_to_asset_id(ticker);
        let closes = self
            .fallback
            .get_hourly_closes(&asset_id, fallback_days(tf))
            .await?;
        let f = compute_features(&closes);

        Ok(PriceFeatures {
            pair: format!("{}USD", ticker.trim().to_ascii_uppercase()),
            interval: tf,
            last: f.last,
            pct_change: f.pct_change,
            momentum: f.momentum,
            volatility: f.volatility,
            source: CoinGeckoClient::NAME.to_string(),
        })
    }
}
