use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

use crate::api::{NewsQuery, PartialNewsItem, ProviderSentiment, Timeframe};
use crate::feeds::news::MAX_ITEMS;
use crate::trading::{AnalyzeRequest, NewsRequest, SignalOrchestrator, SignalRequest};

type Params = HashMap<String, String>;

const DEFAULT_TICKER: &str = "BTC";

/// Handler failure rendered as `500 {"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    fn from_error(error: anyhow::Error, code: &str) -> Self {
        let message = error.to_string();
        Self {
            message: if message.is_empty() {
                code.to_string()
            } else {
                message
            },
        }
    }
}

impl Reject for ApiError {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub tf: Option<String>,
    #[serde(default)]
    pub since_minutes: Option<f64>,
    #[serde(default)]
    pub news: Option<Vec<PartialNewsItem>>,
}

fn number<T: std::str::FromStr>(params: &Params, key: &str) -> Option<T> {
    params.get(key).and_then(|v| v.trim().parse().ok())
}

/// Numeric parameter where zero means "not given".
fn nonzero<T>(params: &Params, key: &str) -> Option<T>
where
    T: std::str::FromStr + Default + PartialEq,
{
    number(params, key).filter(|n: &T| *n != T::default())
}

fn ticker_or_default(raw: Option<&str>) -> String {
    raw.map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TICKER.to_string())
}

pub fn news_request(params: &Params) -> NewsRequest {
    let raw = params
        .get("tickers")
        .or_else(|| params.get("ticker"))
        .map(String::as_str)
        .unwrap_or(DEFAULT_TICKER);
    let mut tickers: Vec<String> = raw
        .split(',')
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        tickers.push(DEFAULT_TICKER.to_string());
    }

    NewsRequest {
        tickers,
        since_minutes: nonzero(params, "since").unwrap_or(1440),
        query: NewsQuery {
            items: nonzero::<u32>(params, "items").unwrap_or(50).min(MAX_ITEMS),
            page: number::<u32>(params, "page").unwrap_or(1).max(1),
            sentiment: params
                .get("sentiment")
                .and_then(|s| ProviderSentiment::parse(s)),
        },
    }
}

/// `(items, page)` for `/news/general`.
pub fn general_page(params: &Params) -> (u32, u32) {
    (
        nonzero::<u32>(params, "items").unwrap_or(12).min(MAX_ITEMS),
        number::<u32>(params, "page").unwrap_or(1).max(1),
    )
}

pub fn signal_request(params: &Params) -> SignalRequest {
    SignalRequest {
        ticker: ticker_or_default(params.get("ticker").map(String::as_str)),
        tf: params
            .get("tf")
            .map(|tf| Timeframe::parse_or_default(tf))
            .unwrap_or_default(),
        since_minutes: nonzero(params, "since").unwrap_or(60),
    }
}

pub fn analyze_request(body: AnalyzeBody) -> AnalyzeRequest {
    AnalyzeRequest {
        ticker: ticker_or_default(body.ticker.as_deref()),
        tf: body
            .tf
            .as_deref()
            .map(Timeframe::parse_or_default)
            .unwrap_or_default(),
        since_minutes: body
            .since_minutes
            .filter(|m| m.is_finite() && *m > 0.0)
            .map(|m| m as i64)
            .unwrap_or(60),
        news: body.news.unwrap_or_default(),
    }
}

pub async fn health(orchestrator: Arc<SignalOrchestrator>) -> Result<impl Reply, Rejection> {
    let status = orchestrator.health().get_status().await;
    Ok(warp::reply::json(&status))
}

pub async fn metrics(orchestrator: Arc<SignalOrchestrator>) -> Result<impl Reply, Rejection> {
    let body = orchestrator
        .metrics()
        .render()
        .map_err(|e| warp::reject::custom(ApiError::from_error(e, "metrics_error")))?;
    Ok(warp::reply::with_header(
        body,
        "content-type",
        "text/plain; version=0.0.4",
    ))
}

pub async fn news(params: Params, orchestrator: Arc<SignalOrchestrator>) -> Result<impl Reply, Rejection> {
    orchestrator.metrics().record_request("news");
    let request = news_request(&params);
    tracing::info!("GET /news {:?} since {}m", request.tickers, request.since_minutes);

    let response = orchestrator
        .news(&request)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from_error(e, "news_error")))?;
    Ok(warp::reply::json(&response))
}

pub async fn general_news(
    params: Params,
    orchestrator: Arc<SignalOrchestrator>,
) -> Result<impl Reply, Rejection> {
    orchestrator.metrics().record_request("news_general");
    let (items, page) = general_page(&params);

    let response = orchestrator
        .general_news(items, page)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from_error(e, "general_error")))?;
    Ok(warp::reply::json(&response))
}

pub async fn tickers_db(orchestrator: Arc<SignalOrchestrator>) -> Result<impl Reply, Rejection> {
    orchestrator.metrics().record_request("tickersdb");
    let response = orchestrator
        .tickers_db()
        .await
        .map_err(|e| warp::reject::custom(ApiError::from_error(e, "tickersdb_error")))?;
    Ok(warp::reply::json(&response))
}

pub async fn signal(params: Params, orchestrator: Arc<SignalOrchestrator>) -> Result<impl Reply, Rejection> {
    orchestrator.metrics().record_request("signal");
    let request = signal_request(&params);
    tracing::info!("GET /signal {} {} since {}m", request.ticker, request.tf, request.since_minutes);

    let response = orchestrator.signal(&request).await;
    Ok(warp::reply::json(&response))
}

pub async fn analyze(
    body: AnalyzeBody,
    orchestrator: Arc<SignalOrchestrator>,
) -> Result<impl Reply, Rejection> {
    orchestrator.metrics().record_request("analyze");
    let request = analyze_request(body);
    tracing::info!(
        "POST /analyze {} {} since {}m ({} supplied headlines)",
        request.ticker,
        request.tf,
        request.since_minutes,
        request.news.len()
    );

    let response = orchestrator.analyze(&request).await;
    Ok(warp::reply::json(&response))
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found".to_string())
    } else if let Some(api) = err.find::<ApiError>() {
        tracing::error!("Request failed: {}", api.message);
        (StatusCode::INTERNAL_SERVER_ERROR, api.message.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid_body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed".to_string())
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "cors_forbidden".to_string())
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_news_request_defaults() {
        let r = news_request(&Params::new());
        assert_eq!(r.tickers, vec!["BTC"]);
        assert_eq!(r.since_minutes, 1440);
        assert_eq!(r.query, NewsQuery::default());
    }

    #[test]
    fn test_news_request_parsing() {
        let r = news_request(&params(&[
            ("tickers", " btc, eth ,,"),
            ("since", "30"),
            ("items", "500"),
            ("page", "0"),
            ("sentiment", "NEGATIVE"),
        ]));
        assert_eq!(r.tickers, vec!["BTC", "ETH"]);
        assert_eq!(r.since_minutes, 30);
        assert_eq!(r.query.items, 100);
        assert_eq!(r.query.page, 1);
        assert_eq!(r.query.sentiment, Some(ProviderSentiment::Negative));

        let zeroed = news_request(&params(&[("items", "0"), ("since", "0")]));
        assert_eq!(zeroed.query.items, 50);
        assert_eq!(zeroed.since_minutes, 1440);

        let alias = news_request(&params(&[("ticker", "sol"), ("sentiment", "spicy")]));
        assert_eq!(alias.tickers, vec!["SOL"]);
        assert_eq!(alias.query.sentiment, None);
    }

    #[test]
    fn test_general_page_defaults() {
        assert_eq!(general_page(&Params::new()), (12, 1));
        assert_eq!(general_page(&params(&[("items", "0"), ("page", "0")])), (12, 1));
        assert_eq!(general_page(&params(&[("items", "250"), ("page", "3")])), (100, 3));
    }

    #[test]
    fn test_signal_request_parsing() {
        let r = signal_request(&params(&[("ticker", "eth"), ("tf", "4h"), ("since", "abc")]));
        assert_eq!(r.ticker, "ETH");
        assert_eq!(r.tf, Timeframe::H4);
        assert_eq!(r.since_minutes, 60);

        let d = signal_request(&params(&[("tf", "3m")]));
        assert_eq!(d.ticker, "BTC");
        assert_eq!(d.tf, Timeframe::H1);
    }

    #[test]
    fn test_analyze_request_defaults() {
        let r = analyze_request(AnalyzeBody {
            ticker: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(r.ticker, "BTC");
        assert_eq!(r.tf, Timeframe::H1);
        assert_eq!(r.since_minutes, 60);
        assert!(r.news.is_empty());
    }

    #[test]
    fn test_api_error_message() {
        let e = ApiError::from_error(anyhow::anyhow!("CryptoNews API error 500"), "news_error");
        assert_eq!(e.message, "CryptoNews API error 500");
        let e = ApiError::from_error(anyhow::anyhow!(""), "news_error");
        assert_eq!(e.message, "news_error");
    }
}
