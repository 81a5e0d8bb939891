use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::api::{
    ChatModel, CryptoNewsClient, NewsItem, NewsQuery, OpenAiClient, PartialNewsItem, PriceFeatures,
    Timeframe,
};
use crate::core::{resolve_or, Config, HealthChecker, Metrics};
use crate::feeds::news::parse_timestamp;
use crate::feeds::{NewsFetcher, PriceFetcher};
use crate::strategy::signals::{heuristic_plan, heuristic_signal};
use crate::strategy::{
    aggregate_sentiment, AggregateSentiment, AiDecisionEngine, SentimentClassifier, SignalFeatures,
    SignalStatus, TradePlan,
};

/// Steps every signal/analyze request walks through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Gather,
    Classify,
    FeatureCompute,
    Decide,
    Respond,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Gather => "gather",
            PipelineStage::Classify => "classify",
            PipelineStage::FeatureCompute => "feature-compute",
            PipelineStage::Decide => "decide",
            PipelineStage::Respond => "respond",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsRequest {
    pub tickers: Vec<String>,
    pub since_minutes: i64,
    pub query: NewsQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalRequest {
    pub ticker: String,
    pub tf: Timeframe,
    pub since_minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub ticker: String,
    pub tf: Timeframe,
    pub since_minutes: i64,
    pub news: Vec<PartialNewsItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsResponse {
    pub items: Vec<NewsItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub status: SignalStatus,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub features: SignalFeatures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub plan: TradePlan,
    pub features: SignalFeatures,
}

/// Runs the news → classify → features → decide pipeline for one request.
///
/// External failures are absorbed stage by stage: missing tokens give empty news,
/// a dead price feed gives zeroed features, and model failures fall back to the
/// keyword/momentum heuristics. Only provider errors on the plain news endpoints
/// reach the caller.
pub struct SignalOrchestrator {
    config: Arc<Config>,
    news: NewsFetcher,
    prices: PriceFetcher,
    classifier: SentimentClassifier,
    engine: AiDecisionEngine,
    health: HealthChecker,
    metrics: Arc<Metrics>,
}

impl SignalOrchestrator {
    pub fn new(config: Config, health: HealthChecker, metrics: Arc<Metrics>) -> Self {
        let model: Option<Arc<dyn ChatModel>> = if config.has_llm_credential() {
            Some(Arc::new(OpenAiClient::new(config.llm.clone())))
        } else {
            None
        };
        Self::with_model(config, model, health, metrics)
    }

    /// Builds the pipeline around an explicit chat model (or none).
    pub fn with_model(
        config: Config,
        model: Option<Arc<dyn ChatModel>>,
        health: HealthChecker,
        metrics: Arc<Metrics>,
    ) -> Self {
        let config = Arc::new(config);
        let news = NewsFetcher::new(CryptoNewsClient::new(config.news.clone()), metrics.clone());
        let prices = PriceFetcher::new(&config.market, metrics.clone());
        let classifier =
            SentimentClassifier::new(model.clone(), config.heuristics.clone(), metrics.clone());
        let engine = AiDecisionEngine::new(model);

        tracing::info!(
            "Pipeline ready (news provider: {}, model: {})",
            if news.has_credential() { "configured" } else { "disabled" },
            if engine.is_available() { config.llm.model.as_str() } else { "heuristics" }
        );

        Self {
            config,
            news,
            prices,
            classifier,
            engine,
            health,
            metrics,
        }
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// `/news`: labelled ticker news. Provider failures propagate.
    pub async fn news(&self, request: &NewsRequest) -> Result<NewsResponse> {
        let raw = self
            .news
            .fetch(&request.tickers, request.since_minutes, &request.query)
            .await?;
        let items = self.classifier.label_missing(raw).await;
        Ok(NewsResponse { items })
    }

    /// `/news/general`: quality-filtered general news, every item classified.
    pub async fn general_news(&self, items: u32, page: u32) -> Result<NewsResponse> {
        let raw = self.news.fetch_general(items, page).await?;
        let items = self.classifier.label_all(raw).await;
        Ok(NewsResponse { items })
    }

    /// `/tickersdb`: provider ticker database, `{items: []}` without a token.
    pub async fn tickers_db(&self) -> Result<serde_json::Value> {
        Ok(self
            .news
            .tickers_db()
            .await?
            .unwrap_or_else(|| serde_json::json!({ "items": [] })))
    }

    pub async fn signal(&self, request: &SignalRequest) -> SignalResponse {
        let (labeled, features) = self
            .gather_and_compute(&request.ticker, request.tf, request.since_minutes, None)
            .await;
        tracing::debug!(stage = %PipelineStage::Decide, ticker = %request.ticker);

        let h = &self.config.heuristics;
        let heuristic = || {
            heuristic_signal(
                &features.news,
                &features.price,
                h.signal_confidence_cap,
                h.neutral_confidence,
            )
        };
        let decision = if self.engine.is_available() {
            let primary = self.engine.decide_signal(&features).await;
            if primary.is_err() {
                self.metrics.record_fallback("decision");
            }
            resolve_or("decision", primary, |_| heuristic())
        } else {
            heuristic()
        };

        tracing::info!(
            stage = %PipelineStage::Respond,
            "Signal {} {}: {} ({:.0}%) from {} headlines, price source {}",
            request.ticker,
            request.tf,
            decision.status,
            decision.confidence,
            labeled.len(),
            features.price.source
        );

        SignalResponse {
            status: decision.status,
            confidence: decision.confidence,
            reasons: decision.reasons,
            features,
        }
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> AnalyzeResponse {
        let supplied = (!request.news.is_empty())
            .then(|| caller_news(&request.news, &request.ticker));
        let (labeled, features) = self
            .gather_and_compute(&request.ticker, request.tf, request.since_minutes, supplied)
            .await;
        tracing::debug!(stage = %PipelineStage::Decide, ticker = %request.ticker);

        let h = &self.config.heuristics;
        let heuristic = || {
            heuristic_plan(
                &features.news,
                &features.price,
                h.analyze_confidence_cap,
                h.neutral_confidence,
            )
        };
        let plan = if self.engine.is_available() {
            let primary = self
                .engine
                .plan_trade(&features.price, &features.news, &labeled)
                .await;
            if primary.is_err() {
                self.metrics.record_fallback("decision");
            }
            resolve_or("decision", primary, |_| heuristic())
        } else {
            heuristic()
        };

        tracing::info!(
            stage = %PipelineStage::Respond,
            "Plan {} {}: {} ({:.0}%) entry {:.4} stop {:.4} target {:.4}",
            request.ticker,
            request.tf,
            plan.status,
            plan.confidence,
            plan.entry_price,
            plan.stop_loss,
            plan.take_profit
        );

        AnalyzeResponse { plan, features }
    }

    /// Gather, classify and feature-compute stages shared by signal and analyze.
    async fn gather_and_compute(
        &self,
        ticker: &str,
        tf: Timeframe,
        since_minutes: i64,
        supplied: Option<Vec<NewsItem>>,
    ) -> (Vec<NewsItem>, SignalFeatures) {
        tracing::debug!(stage = %PipelineStage::Gather, ticker, "supplied news: {}", supplied.is_some());
        let news = match supplied {
            Some(items) => items,
            None => self.fetch_news_or_empty(ticker, since_minutes).await,
        };

        tracing::debug!(stage = %PipelineStage::Classify, items = news.len());
        let labeled = self.classifier.label_missing(news).await;
        let aggregate: AggregateSentiment = aggregate_sentiment(&labeled);

        tracing::debug!(stage = %PipelineStage::FeatureCompute, ticker);
        let price: PriceFeatures = self.prices.fetch_or_unavailable(ticker, tf).await;
        self.health.record_price_feed(!price.is_unavailable()).await;

        (
            labeled,
            SignalFeatures {
                news: aggregate,
                price,
            },
        )
    }

    async fn fetch_news_or_empty(&self, ticker: &str, since_minutes: i64) -> Vec<NewsItem> {
        let tickers = [ticker.to_string()];
        match self
            .news
            .fetch(&tickers, since_minutes, &NewsQuery::default())
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("News fetch failed for {}: {}, continuing without news", ticker, e);
                self.metrics.record_fallback("news");
                Vec::new()
            }
        }
    }
}

/// Caller-supplied headlines become news items keyed by position.
pub fn caller_news(items: &[PartialNewsItem], ticker: &str) -> Vec<NewsItem> {
    let now = Utc::now();
    items
        .iter()
        .enumerate()
        .map(|(idx, n)| NewsItem {
            id: idx.to_string(),
            title: n.title.clone(),
            source: n.source.clone(),
            url: String::new(),
            published_at: n
                .published_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(now),
            tickers: vec![ticker.to_string()],
            sentiment: n.sentiment,
            score: n.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::openai::MockChatModel;
    use crate::api::Sentiment;
    use crate::core::LlmError;

    /// Offline config pointed at a closed local port so price fetches fail fast.
    fn unreachable_config() -> Config {
        let mut config = Config::offline();
        config.market.binance_url = "http://127.0.0.1:9".to_string();
        config.market.coingecko_url = "http://127.0.0.1:9".to_string();
        config
    }

    fn orchestrator(model: Option<MockChatModel>) -> SignalOrchestrator {
        let config = unreachable_config();
        let health = HealthChecker::new(&config);
        SignalOrchestrator::with_model(
            config,
            model.map(|m| Arc::new(m) as Arc<dyn ChatModel>),
            health,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn partial(title: &str, sentiment: Option<Sentiment>, score: Option<f64>) -> PartialNewsItem {
        PartialNewsItem {
            title: title.to_string(),
            source: "Desk".to_string(),
            sentiment,
            score,
            published_at: None,
        }
    }

    #[test]
    fn test_caller_news_shape() {
        let items = caller_news(&[partial("a", None, None), partial("b", None, None)], "ETH");
        assert_eq!(items[1].id, "1");
        assert_eq!(items[1].url, "");
        assert_eq!(items[1].tickers, vec!["ETH"]);
    }

    #[test]
    fn test_caller_news_timestamps() {
        let mut dated = partial("a", None, None);
        dated.published_at = Some("Wed, 01 May 2024 10:00:00 +0000".to_string());
        let mut garbled = partial("b", None, None);
        garbled.published_at = Some("last tuesday".to_string());

        let before = Utc::now();
        let items = caller_news(&[dated, garbled], "BTC");
        assert_eq!(
            items[0].published_at,
            "2024-05-01T10:00:00Z".parse::<chrono::DateTime<Utc>>().unwrap()
        );
        assert!(items[1].published_at >= before);
    }

    #[tokio::test]
    async fn test_signal_without_any_keys_degrades() {
        let o = orchestrator(None);
        let response = o
            .signal(&SignalRequest {
                ticker: "BTC".to_string(),
                tf: Timeframe::H1,
                since_minutes: 60,
            })
            .await;

        assert_eq!(response.status, SignalStatus::Neutral);
        assert_eq!(response.confidence, 45.0);
        assert!(!response.reasons.is_empty());
        assert!(response.features.price.is_unavailable());
        assert_eq!(response.features.news, AggregateSentiment::default());
        assert_eq!(o.metrics().fallback_count("price"), 1);
        assert_eq!(o.health().get_status().await.status, "degraded");
    }

    #[tokio::test]
    async fn test_analyze_keeps_supplied_labels() {
        let mut model = MockChatModel::new();
        // one classification call for the single unlabelled item, then the plan call fails
        model
            .expect_complete()
            .withf(|_, json_mode| *json_mode)
            .times(1)
            .returning(|_, _| Ok(r#"[{"sentiment":"bearish","score":-0.9}]"#.to_string()));
        model
            .expect_complete()
            .withf(|_, json_mode| !*json_mode)
            .times(1)
            .returning(|_, _| Err(LlmError::Status(500)));

        let o = orchestrator(Some(model));
        let response = o
            .analyze(&AnalyzeRequest {
                ticker: "BTC".to_string(),
                tf: Timeframe::H1,
                since_minutes: 60,
                news: vec![
                    partial("ETF approved", Some(Sentiment::Bullish), Some(0.7)),
                    partial("Exchange halts withdrawals", None, None),
                ],
            })
            .await;

        // (0.7 - 0.9) / 2
        assert!((response.features.news.avg + 0.1).abs() < 1e-12);
        assert_eq!(response.features.news.bullish, 1);
        assert_eq!(response.features.news.bearish, 1);
        assert_eq!(response.plan.status, SignalStatus::Neutral);
        assert_eq!(response.plan.entry_price, 0.0);
        assert_eq!(o.metrics().fallback_count("decision"), 1);
    }

    #[tokio::test]
    async fn test_analyze_with_fully_labelled_news_never_classifies() {
        let mut model = MockChatModel::new();
        model
            .expect_complete()
            .withf(|_, json_mode| *json_mode)
            .times(0);
        model
            .expect_complete()
            .withf(|_, json_mode| !*json_mode)
            .times(1)
            .returning(|_, _| {
                Ok(r#"{"action":"LONG","confidence":66,"entryPrice":1,"stopLoss":0.9,"takeProfit":1.2,
                       "chartReasons":["c"],"newsReasons":["n"],"sentimentSummary":"fine"}"#
                    .to_string())
            });

        let o = orchestrator(Some(model));
        let response = o
            .analyze(&AnalyzeRequest {
                ticker: "SOL".to_string(),
                tf: Timeframe::D1,
                since_minutes: 30,
                news: vec![partial("Upgrade ships", Some(Sentiment::Bullish), Some(0.5))],
            })
            .await;

        assert_eq!(response.plan.status, SignalStatus::Buy);
        assert_eq!(response.plan.confidence, 66.0);
        assert_eq!(response.plan.sentiment_summary, "fine");
        assert_eq!(response.features.news.avg, 0.5);
    }

    #[tokio::test]
    async fn test_news_without_token_is_empty() {
        let o = orchestrator(None);
        let response = o
            .news(&NewsRequest {
                tickers: vec!["BTC".to_string()],
                since_minutes: 1440,
                query: NewsQuery::default(),
            })
            .await
            .unwrap();
        assert!(response.items.is_empty());
        assert_eq!(o.tickers_db().await.unwrap(), serde_json::json!({"items": []}));
        assert!(o.general_news(12, 1).await.unwrap().items.is_empty());
    }

    #[test]
    fn test_analyze_response_is_flat() {
        let plan = heuristic_plan(
            &AggregateSentiment::default(),
            &PriceFeatures::unavailable("BTCUSDT", Timeframe::H1),
            88,
            45,
        );
        let response = AnalyzeResponse {
            plan,
            features: SignalFeatures {
                news: AggregateSentiment::default(),
                price: PriceFeatures::unavailable("BTCUSDT", Timeframe::H1),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "NEUTRAL");
        assert_eq!(json["entryPrice"], 0.0);
        assert_eq!(json["features"]["price"]["source"], "unavailable");
        assert!(json["chartReasons"].is_array());
    }
}
