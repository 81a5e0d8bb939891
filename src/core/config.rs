use anyhow::Result;
use std::env;

/// Distinct (ticker, timeframe) price entries kept when the cache is on.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub news: NewsConfig,
    pub llm: LlmConfig,
    pub market: MarketConfig,
    pub heuristics: HeuristicConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub binance_url: String,
    pub coingecko_url: String,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

/// Keyword-heuristic weights for one classification call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordWeights {
    pub bullish: f64,
    pub bearish: f64,
    pub extended_keywords: bool,
}

impl KeywordWeights {
    pub const fn new(bullish: f64, bearish: f64, extended_keywords: bool) -> Self {
        Self {
            bullish,
            bearish,
            extended_keywords,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    /// Used when no LLM credential is configured.
    pub offline: KeywordWeights,
    /// Used when the LLM replied but the reply could not be parsed.
    pub unparseable: KeywordWeights,
    /// Used when the LLM call itself failed.
    pub transport: KeywordWeights,
    pub signal_confidence_cap: u32,
    pub analyze_confidence_cap: u32,
    pub neutral_confidence: u32,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            offline: KeywordWeights::new(0.4, 0.4, false),
            unparseable: KeywordWeights::new(0.35, 0.45, true),
            transport: KeywordWeights::new(0.4, 0.5, false),
            signal_confidence_cap: 90,
            analyze_confidence_cap: 88,
            neutral_confidence: 45,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                port: env_parse("PORT", 8787),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            news: NewsConfig {
                api_key: env::var("CRYPTONEWS_API_KEY").unwrap_or_default(),
                base_url: env::var("CRYPTONEWS_BASE_URL")
                    .unwrap_or_else(|_| "https://cryptonews-api.com/api/v1".to_string()),
            },
            llm: LlmConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-5-mini".to_string()),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            market: MarketConfig {
                binance_url: env::var("BINANCE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.binance.com".to_string()),
                coingecko_url: env::var("COINGECKO_BASE_URL")
                    .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
                cache_ttl_secs: env_parse("PRICE_CACHE_TTL_SECS", 0),
                cache_capacity: env_parse("PRICE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            },
            heuristics: HeuristicConfig::default(),
        })
    }

    /// Configuration with every credential empty and every endpoint at its public default.
    pub fn offline() -> Self {
        Config {
            server: ServerConfig {
                port: 8787,
                log_level: "info".to_string(),
            },
            news: NewsConfig {
                api_key: String::new(),
                base_url: "https://cryptonews-api.com/api/v1".to_string(),
            },
            llm: LlmConfig {
                api_key: String::new(),
                model: "gpt-5-mini".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
            },
            market: MarketConfig {
                binance_url: "https://api.binance.com".to_string(),
                coingecko_url: "https://api.coingecko.com/api/v3".to_string(),
                cache_ttl_secs: 0,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
            },
            heuristics: HeuristicConfig::default(),
        }
    }

    pub fn has_news_credential(&self) -> bool {
        !self.news.api_key.trim().is_empty()
    }

    pub fn has_llm_credential(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
