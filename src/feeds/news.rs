use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

use crate::api::{CryptoNewsClient, NewsItem, NewsQuery, ProviderSentiment, RawArticle};
use crate::core::{Metrics, ProviderError};

pub const MAX_ITEMS: u32 = 100;
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Normalized, time-filtered news on top of the provider client.
pub struct NewsFetcher {
    client: CryptoNewsClient,
    metrics: Arc<Metrics>,
}

impl NewsFetcher {
    pub fn new(client: CryptoNewsClient, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }

    pub fn has_credential(&self) -> bool {
        self.client.has_credential()
    }

    /// Articles for `tickers` published within the last `since_minutes`.
    /// Without a provider token this is always empty.
    pub async fn fetch(
        &self,
        tickers: &[String],
        since_minutes: i64,
        query: &NewsQuery,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        if !self.has_credential() || tickers.is_empty() {
            tracing::debug!("News provider not configured, returning no articles");
            return Ok(Vec::new());
        }

        let query = NewsQuery {
            items: query.items.clamp(1, MAX_ITEMS),
            page: query.page.max(1),
            sentiment: query.sentiment,
        };

        let articles = self.counted(self.client.get_ticker_news(tickers, &query).await)?;

        let now = Utc::now();
        let items: Vec<NewsItem> = articles
            .into_iter()
            .map(|a| normalize_article(a, tickers, now))
            .collect();
        let fetched = items.len();
        let recent = filter_since(items, since_minutes, now);

        tracing::info!(
            "Fetched {} articles for {:?}, {} within {}m",
            fetched,
            tickers,
            recent.len(),
            since_minutes
        );
        Ok(recent)
    }

    /// Curated general-section news that passes the quality filter. Unlabelled.
    pub async fn fetch_general(&self, items: u32, page: u32) -> Result<Vec<NewsItem>, ProviderError> {
        if !self.has_credential() {
            return Ok(Vec::new());
        }

        let articles = self.counted(
            self.client
                .get_general_news(items.clamp(1, MAX_ITEMS), page.max(1))
                .await,
        )?;

        let now = Utc::now();
        let mut normalized: Vec<NewsItem> = articles
            .into_iter()
            .map(|a| normalize_article(a, &[], now))
            .filter(passes_quality_filter)
            .collect();
        // general feed items are always classified fresh
        for item in &mut normalized {
            item.sentiment = None;
            item.score = None;
        }
        Ok(normalized)
    }

    pub async fn tickers_db(&self) -> Result<Option<serde_json::Value>, ProviderError> {
        if !self.has_credential() {
            return Ok(None);
        }
        self.counted(self.client.get_tickers_db().await).map(Some)
    }

    fn counted<T>(&self, result: Result<T, ProviderError>) -> Result<T, ProviderError> {
        result.map_err(|e| {
            self.metrics.record_provider_error(e.provider());
            e
        })
    }
}

/// Maps one provider article to a `NewsItem`. Provider sentiment, when present,
/// becomes a fixed label; "neutral" leaves the item unlabelled with score 0.
pub fn normalize_article(article: RawArticle, requested: &[String], now: DateTime<Utc>) -> NewsItem {
    let url = article
        .news_url
        .clone()
        .or_else(|| article.url.clone())
        .unwrap_or_default();

    let id = article
        .news_url
        .clone()
        .or_else(|| article.id.as_ref().and_then(id_string))
        .or_else(|| article.url.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let published_at = article
        .date
        .as_deref()
        .or(article.published_at.as_deref())
        .and_then(parse_timestamp)
        .unwrap_or(now);

    let tickers = match (article.tickers, article.ticker) {
        (Some(list), _) => list,
        (None, Some(single)) => vec![single],
        (None, None) => requested.to_vec(),
    };

    let (sentiment, score) = match article.sentiment.as_deref().and_then(ProviderSentiment::parse) {
        Some(provider) => {
            let (label, score) = provider.label();
            (label, Some(score))
        }
        None => (None, None),
    };

    NewsItem {
        id,
        title: article.title.unwrap_or_default(),
        source: article
            .source_name
            .or(article.source)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        url,
        published_at,
        tickers,
        sentiment,
        score,
    }
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, the RFC 2822 form the news provider emits, and bare
/// `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Keeps items published within the window. A window reaching past the
/// representable time range keeps everything.
pub fn filter_since(items: Vec<NewsItem>, since_minutes: i64, now: DateTime<Utc>) -> Vec<NewsItem> {
    let cutoff = Duration::try_minutes(since_minutes.max(0))
        .and_then(|window| now.checked_sub_signed(window));
    let Some(cutoff) = cutoff else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| item.published_at >= cutoff)
        .collect()
}

/// A general-feed article needs a real http(s) link and a named source.
pub fn passes_quality_filter(item: &NewsItem) -> bool {
    let url = item.url.trim().to_ascii_lowercase();
    let linked = url.starts_with("http://") || url.starts_with("https://");
    linked && !item.source.trim().is_empty() && item.source != UNKNOWN_SOURCE
}
