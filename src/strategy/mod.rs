pub mod ai_engine;
pub mod indicators;
pub mod sentiment;
pub mod signals;

pub use ai_engine::{AiDecisionEngine, SignalFeatures};
pub use indicators::{compute_features, FeatureSet, Indicators};
pub use sentiment::{aggregate_sentiment, AggregateSentiment, Label, SentimentClassifier};
pub use signals::{SignalDecision, SignalStatus, TradePlan};
