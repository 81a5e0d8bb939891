use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "bullish"),
            Sentiment::Bearish => write!(f, "bearish"),
        }
    }
}

/// Provider-side sentiment filter accepted by `/news`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSentiment {
    Positive,
    Negative,
    Neutral,
}

impl ProviderSentiment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Fixed label/score pair used instead of classifying the headline.
    pub fn label(&self) -> (Option<Sentiment>, f64) {
        match self {
            Self::Positive => (Some(Sentiment::Bullish), 0.3),
            Self::Negative => (Some(Sentiment::Bearish), -0.3),
            Self::Neutral => (None, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[default]
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Lenient parse: anything unrecognised is treated as hourly.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {}", other)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub tickers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl NewsItem {
    pub fn is_labeled(&self) -> bool {
        self.sentiment.is_some()
    }
}

/// Caller-supplied headline for `/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialNewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Free-form; unparseable values fall back to the request time.
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeatures {
    pub pair: String,
    pub interval: Timeframe,
    pub last: f64,
    pub pct_change: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub source: String,
}

impl PriceFeatures {
    pub const UNAVAILABLE: &'static str = "unavailable";

    /// Zeroed features reported when no provider could serve a series.
    pub fn unavailable(pair: impl Into<String>, interval: Timeframe) -> Self {
        Self {
            pair: pair.into(),
            interval,
            last: 0.0,
            pct_change: 0.0,
            momentum: 0.0,
            volatility: 0.0,
            source: Self::UNAVAILABLE.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.source == Self::UNAVAILABLE
    }
}

/// Raw article as returned by the news provider. Field names vary between endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawArticle {
    #[serde(default)]
    pub news_url: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub tickers: Option<Vec<String>>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawNewsResponse {
    #[serde(default)]
    pub data: Option<Vec<RawArticle>>,
    #[serde(default)]
    pub news: Option<Vec<RawArticle>>,
}

impl RawNewsResponse {
    pub fn into_articles(self) -> Vec<RawArticle> {
        self.data.or(self.news).unwrap_or_default()
    }
}
