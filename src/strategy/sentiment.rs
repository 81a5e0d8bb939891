//! Headline sentiment labelling.
//!
//! The primary path sends every headline to a chat model in one batch. When no model
//! credential is configured, or the model call fails in any way, a keyword heuristic
//! labels the batch instead. Both paths return exactly one label per headline, in order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::api::{ChatMessage, ChatModel, NewsItem, Sentiment};
use crate::core::config::{HeuristicConfig, KeywordWeights};
use crate::core::{resolve_or, LlmError, Metrics};

const BULLISH_KEYWORDS: &[&str] = &["surge", "rally", "inflow", "buy", "support", "breakout"];
const BEARISH_KEYWORDS: &[&str] = &["hack", "dump", "sell", "ban", "lawsuit", "crash"];
const BULLISH_EXTENDED: &[&str] = &["partnership", "approval", "growth", "record"];
const BEARISH_EXTENDED: &[&str] = &["exploit", "delist", "outflow", "fine"];

const CLASSIFIER_PROMPT: &str = "You label crypto headlines as bullish or bearish for the mentioned tickers. \
Respond with pure JSON only: an array with same length as input; each element is \
{\"sentiment\":\"bullish\"|\"bearish\",\"score\":number between -1 and 1}.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub sentiment: Sentiment,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateSentiment {
    pub avg: f64,
    pub bullish: usize,
    pub bearish: usize,
}

impl AggregateSentiment {
    /// Bullish minus bearish headline count.
    pub fn skew(&self) -> i64 {
        self.bullish as i64 - self.bearish as i64
    }
}

/// Mean score and label counts. Unlabelled items count as bullish with score 0.
pub fn aggregate_sentiment(items: &[NewsItem]) -> AggregateSentiment {
    if items.is_empty() {
        return AggregateSentiment::default();
    }

    let mut sum = 0.0;
    let mut bullish = 0;
    let mut bearish = 0;
    for item in items {
        sum += item.score.unwrap_or(0.0);
        match item.sentiment.unwrap_or(Sentiment::Bullish) {
            Sentiment::Bullish => bullish += 1,
            Sentiment::Bearish => bearish += 1,
        }
    }

    AggregateSentiment {
        avg: sum / items.len() as f64,
        bullish,
        bearish,
    }
}

/// Keyword presence scoring. Never fails.
pub fn keyword_label(text: &str, weights: KeywordWeights) -> Label {
    let lower = text.to_lowercase();
    let hit = |base: &[&str], extended: &[&str]| {
        base.iter()
            .chain(extended.iter().filter(|_| weights.extended_keywords))
            .any(|k| lower.contains(k))
    };

    let mut score = 0.0;
    if hit(BULLISH_KEYWORDS, BULLISH_EXTENDED) {
        score += weights.bullish;
    }
    if hit(BEARISH_KEYWORDS, BEARISH_EXTENDED) {
        score -= weights.bearish;
    }

    Label {
        sentiment: if score >= 0.0 {
            Sentiment::Bullish
        } else {
            Sentiment::Bearish
        },
        score,
    }
}

pub fn keyword_labels(texts: &[String], weights: KeywordWeights) -> Vec<Label> {
    texts.iter().map(|t| keyword_label(t, weights)).collect()
}

fn first_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("static pattern"))
}

/// Parses a model reply into exactly `expected` labels.
///
/// The model is asked for a bare array but json mode often wraps it in an object, so
/// an object reply is searched for its first bracketed span.
pub fn parse_labels(content: &str, expected: usize) -> Result<Vec<Label>, LlmError> {
    let trimmed = content.trim();
    let candidate = if trimmed.starts_with('{') {
        first_array()
            .find(trimmed)
            .map(|m| m.as_str())
            .unwrap_or(trimmed)
    } else {
        trimmed
    };

    let parsed: serde_json::Value = serde_json::from_str(candidate)?;
    let entries = parsed
        .as_array()
        .ok_or_else(|| LlmError::Parse("expected a JSON array of labels".to_string()))?;

    Ok((0..expected).map(|i| normalize_entry(entries.get(i))).collect())
}

fn normalize_entry(entry: Option<&serde_json::Value>) -> Label {
    let sentiment = match entry
        .and_then(|e| e.get("sentiment"))
        .and_then(|s| s.as_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("bearish") => Sentiment::Bearish,
        _ => Sentiment::Bullish,
    };

    let raw_score = entry.and_then(|e| e.get("score")).and_then(|s| match s {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });

    let score = match raw_score.filter(|s| s.is_finite()) {
        Some(s) => s.clamp(-1.0, 1.0),
        None => match sentiment {
            Sentiment::Bullish => 0.1,
            Sentiment::Bearish => -0.1,
        },
    };

    Label { sentiment, score }
}

/// Labels headlines with the chat model when one is configured, otherwise by keyword.
pub struct SentimentClassifier {
    model: Option<Arc<dyn ChatModel>>,
    heuristics: HeuristicConfig,
    metrics: Arc<Metrics>,
}

impl SentimentClassifier {
    pub fn new(
        model: Option<Arc<dyn ChatModel>>,
        heuristics: HeuristicConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            model,
            heuristics,
            metrics,
        }
    }

    pub async fn classify(&self, texts: &[String]) -> Vec<Label> {
        if texts.is_empty() {
            return Vec::new();
        }

        let Some(model) = &self.model else {
            return keyword_labels(texts, self.heuristics.offline);
        };

        let primary = self.classify_with_model(model.as_ref(), texts).await;
        if primary.is_err() {
            self.metrics.record_fallback("classifier");
        }

        resolve_or("classifier", primary, |reason| {
            let weights = if reason.is_reply_error() {
                self.heuristics.unparseable
            } else {
                self.heuristics.transport
            };
            keyword_labels(texts, weights)
        })
    }

    async fn classify_with_model(
        &self,
        model: &dyn ChatModel,
        texts: &[String],
    ) -> Result<Vec<Label>, LlmError> {
        let payload = serde_json::to_string(texts)?;
        let messages = vec![ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(payload)];
        let content = model.complete(messages, true).await?;
        parse_labels(&content, texts.len())
    }

    /// Fills in sentiment/score for every unlabelled item. Items that already carry a
    /// label are returned untouched and never sent to the classifier.
    pub async fn label_missing(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_labeled())
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            return items;
        }

        let texts: Vec<String> = pending.iter().map(|&i| items[i].title.clone()).collect();
        let labels = self.classify(&texts).await;
        tracing::debug!("Classified {} of {} headlines", labels.len(), items.len());

        let mut items = items;
        for (slot, &index) in pending.iter().enumerate() {
            let label = labels.get(slot);
            let item = &mut items[index];
            item.sentiment = Some(label.map_or(Sentiment::Bullish, |l| l.sentiment));
            item.score = Some(label.map_or(0.0, |l| l.score));
        }
        items
    }

    /// Labels every item regardless of any existing label.
    pub async fn label_all(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        let texts: Vec<String> = items.iter().map(|i| i.title.clone()).collect();
        let labels = self.classify(&texts).await;

        items
            .into_iter()
            .zip(labels.into_iter().map(Some).chain(std::iter::repeat(None)))
            .map(|(mut item, label)| {
                item.sentiment = Some(label.map_or(Sentiment::Bullish, |l| l.sentiment));
                item.score = Some(label.map_or(0.0, |l| l.score));
                item
            })
            .collect()
    }
}
