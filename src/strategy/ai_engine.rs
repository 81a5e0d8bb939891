use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};

use super::sentiment::AggregateSentiment;
use super::signals::{clamp_confidence, sentiment_summary, SignalDecision, SignalStatus, TradePlan};
use crate::api::{ChatMessage, ChatModel, NewsItem, PriceFeatures, Sentiment};
use crate::core::LlmError;

/// Headlines embedded in the trade-plan prompt.
pub const PROMPT_HEADLINES: usize = 8;
const DEFAULT_MODEL_CONFIDENCE: f64 = 50.0;

/// Inputs of a decision, also echoed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFeatures {
    pub news: AggregateSentiment,
    pub price: PriceFeatures,
}

#[derive(Debug, Clone, Serialize)]
struct HeadlineFeature<'a> {
    t: &'a str,
    s: Option<Sentiment>,
    sc: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct PlanPromptFeatures<'a> {
    price: &'a PriceFeatures,
    agg: &'a AggregateSentiment,
    #[serde(rename = "newsTop")]
    news_top: Vec<HeadlineFeature<'a>>,
}

/// Asks the chat model for a direction or a full trade plan. Every failure is returned
/// to the caller, which decides how to degrade.
pub struct AiDecisionEngine {
    model: Option<Arc<dyn ChatModel>>,
}

impl AiDecisionEngine {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { model }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    async fn ask(&self, prompt: String) -> Result<Value, LlmError> {
        let model = self.model.as_ref().ok_or(LlmError::NoCredential)?;
        let content = model.complete(vec![ChatMessage::user(prompt)], false).await?;
        parse_object(&content)
    }

    pub async fn decide_signal(&self, features: &SignalFeatures) -> Result<SignalDecision, LlmError> {
        let prompt = format!(
            "You are a trading assistant. Using the provided features, return a JSON object {{status, confidence, reasons}}.\n\
             status in [\"BUY\",\"SELL\",\"NEUTRAL\"]. confidence 0..100. reasons 3 bullet points.\n\
             Features: {}",
            serde_json::to_string(features)?
        );
        let parsed = self.ask(prompt).await?;

        Ok(SignalDecision {
            status: parsed
                .get("status")
                .and_then(Value::as_str)
                .and_then(SignalStatus::parse)
                .unwrap_or(SignalStatus::Neutral),
            confidence: clamp_confidence(
                number_field(&parsed, "confidence").unwrap_or(DEFAULT_MODEL_CONFIDENCE),
            ),
            reasons: string_list(&parsed, "reasons"),
        })
    }

    pub async fn plan_trade(
        &self,
        price: &PriceFeatures,
        news: &AggregateSentiment,
        headlines: &[NewsItem],
    ) -> Result<TradePlan, LlmError> {
        let features = PlanPromptFeatures {
            price,
            agg: news,
            news_top: headlines
                .iter()
                .take(PROMPT_HEADLINES)
                .map(|n| HeadlineFeature {
                    t: &n.title,
                    s: n.sentiment,
                    sc: n.score,
                })
                .collect(),
        };
        let prompt = format!(
            "You are a crypto trading assistant. Using features below, propose a trade plan as JSON:\n\
             {{\n  \"action\": \"LONG\"|\"SHORT\"|\"NEUTRAL\",\n  \"entryPrice\": number,\n  \"stopLoss\": number,\n  \
             \"takeProfit\": number,\n  \"confidence\": 0-100,\n  \"chartReasons\": string[2..3],\n  \
             \"newsReasons\": string[2..3],\n  \"sentimentSummary\": string\n}}\n\
             Features: {}\n\
             Guidelines: If momentum>0 and news avg>0 -> LONG; if momentum<0 and news avg<0 -> SHORT; else NEUTRAL. \
             Entry ~ last price. Risk/reward ~ 1:2 using volatility as guide.",
            serde_json::to_string(&features)?
        );
        let parsed = self.ask(prompt).await?;

        let status = parsed
            .get("action")
            .and_then(Value::as_str)
            .map(SignalStatus::from_action)
            .unwrap_or(SignalStatus::Neutral);

        Ok(TradePlan {
            status,
            confidence: clamp_confidence(
                number_field(&parsed, "confidence").unwrap_or(DEFAULT_MODEL_CONFIDENCE),
            ),
            entry_price: number_field(&parsed, "entryPrice").unwrap_or(price.last),
            stop_loss: number_field(&parsed, "stopLoss").unwrap_or(price.last),
            take_profit: number_field(&parsed, "takeProfit").unwrap_or(price.last),
            chart_reasons: string_list(&parsed, "chartReasons"),
            news_reasons: string_list(&parsed, "newsReasons"),
            sentiment_summary: parsed
                .get("sentimentSummary")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| sentiment_summary(news)),
        })
    }
}

fn first_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern"))
}

/// Parses a reply that should be a JSON object. Markdown fences or chatter around the
/// object are tolerated.
fn parse_object(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            let span = first_object().find(trimmed).ok_or(LlmError::Parse(e.to_string()))?;
            serde_json::from_str(span.as_str())?
        }
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(LlmError::Parse("expected a JSON object".to_string()))
    }
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    let n = match value.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| match i {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::openai::MockChatModel;
    use crate::api::Timeframe;

    fn features() -> SignalFeatures {
        SignalFeatures {
            news: AggregateSentiment { avg: 0.2, bullish: 3, bearish: 1 },
            price: PriceFeatures {
                pair: "ETHUSDT".to_string(),
                interval: Timeframe::H4,
                last: 3000.0,
                pct_change: 2.0,
                momentum: 1.2,
                volatility: 0.8,
                source: "binance".to_string(),
            },
        }
    }

    fn engine(reply: Result<String, LlmError>) -> AiDecisionEngine {
        let mut model = MockChatModel::new();
        let mut reply = Some(reply);
        model
            .expect_complete()
            .times(1)
            .returning(move |_, _| reply.take().unwrap_or(Err(LlmError::MissingContent)));
        AiDecisionEngine::new(Some(Arc::new(model)))
    }

    #[test]
    fn test_parse_object_tolerates_fences() {
        let v = parse_object("```json\n{\"status\":\"BUY\"}\n```").unwrap();
        assert_eq!(v["status"], "BUY");
        assert!(parse_object("[1,2]").is_err());
        assert!(parse_object("no json here").is_err());
    }

    #[tokio::test]
    async fn test_decide_signal_reads_model_fields() {
        let e = engine(Ok(
            r#"{"status":"sell","confidence":140,"reasons":["a","b",3]}"#.to_string(),
        ));
        let d = e.decide_signal(&features()).await.unwrap();
        assert_eq!(d.status, SignalStatus::Sell);
        assert_eq!(d.confidence, 100.0);
        assert_eq!(d.reasons, vec!["a", "b", "3"]);
    }

    #[tokio::test]
    async fn test_decide_signal_defaults_missing_fields() {
        let d = engine(Ok("{}".to_string()))
            .decide_signal(&features())
            .await
            .unwrap();
        assert_eq!(d.status, SignalStatus::Neutral);
        assert_eq!(d.confidence, 50.0);
        assert!(d.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_plan_trade_maps_action_and_prices() {
        let e = engine(Ok(r#"{
            "action": "LONG", "entryPrice": 3001.5, "stopLoss": "2950", "takeProfit": 3100,
            "confidence": 71, "chartReasons": ["up"], "newsReasons": ["good"]
        }"#
        .to_string()));
        let f = features();
        let plan = e.plan_trade(&f.price, &f.news, &[]).await.unwrap();
        assert_eq!(plan.status, SignalStatus::Buy);
        assert_eq!(plan.entry_price, 3001.5);
        assert_eq!(plan.stop_loss, 2950.0);
        assert_eq!(plan.take_profit, 3100.0);
        assert_eq!(plan.confidence, 71.0);
        assert_eq!(plan.sentiment_summary, "News skew: bullish 3 vs bearish 1, avg 0.20");
    }

    #[tokio::test]
    async fn test_plan_trade_defaults_prices_to_last() {
        let f = features();
        let plan = engine(Ok(r#"{"action":"WAIT"}"#.to_string()))
            .plan_trade(&f.price, &f.news, &[])
            .await
            .unwrap();
        assert_eq!(plan.status, SignalStatus::Neutral);
        assert_eq!(plan.entry_price, 3000.0);
        assert_eq!(plan.stop_loss, 3000.0);
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let err = engine(Err(LlmError::Status(500)))
            .decide_signal(&features())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Status(500)));

        let err = engine(Ok("I think you should buy".to_string()))
            .decide_signal(&features())
            .await
            .unwrap_err();
        assert!(err.is_reply_error());
    }

    #[tokio::test]
    async fn test_unavailable_without_model() {
        let e = AiDecisionEngine::new(None);
        assert!(!e.is_available());
        let err = e.decide_signal(&features()).await.unwrap_err();
        assert!(matches!(err, LlmError::NoCredential));
    }
}
