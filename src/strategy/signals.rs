use serde::{Deserialize, Serialize};
use std::fmt;

use super::sentiment::AggregateSentiment;
use crate::api::PriceFeatures;

/// Aggregate score above which news counts as leaning bullish (and below its negation, bearish).
pub const SENTIMENT_THRESHOLD: f64 = 0.05;
pub const BASE_CONFIDENCE: f64 = 60.0;
pub const MIN_RISK_FRACTION: f64 = 0.005;
pub const MAX_RISK_FRACTION: f64 = 0.02;
pub const REWARD_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Buy,
    Sell,
    Neutral,
}

impl SignalStatus {
    /// Maps a model's trade action (LONG/SHORT/anything else).
    pub fn from_action(action: &str) -> Self {
        match action.trim().to_ascii_uppercase().as_str() {
            "LONG" => SignalStatus::Buy,
            "SHORT" => SignalStatus::Sell,
            _ => SignalStatus::Neutral,
        }
    }

    /// Parses BUY/SELL/NEUTRAL, case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(SignalStatus::Buy),
            "SELL" => Some(SignalStatus::Sell),
            "NEUTRAL" => Some(SignalStatus::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Buy => write!(f, "BUY"),
            SignalStatus::Sell => write!(f, "SELL"),
            SignalStatus::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Status + confidence for `/signal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub status: SignalStatus,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Full trade plan for `/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePlan {
    pub status: SignalStatus,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub chart_reasons: Vec<String>,
    pub news_reasons: Vec<String>,
    pub sentiment_summary: String,
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Stop distance as a fraction of entry, derived from window volatility.
pub fn risk_fraction(volatility: f64) -> f64 {
    let frac = volatility.abs() / 100.0;
    if frac.is_finite() {
        frac.clamp(MIN_RISK_FRACTION, MAX_RISK_FRACTION)
    } else {
        MAX_RISK_FRACTION
    }
}

/// Direction agreed by news and momentum, if both lean the same way.
pub fn heuristic_status(news: &AggregateSentiment, price: &PriceFeatures) -> SignalStatus {
    if news.avg > SENTIMENT_THRESHOLD && price.momentum > 0.0 {
        SignalStatus::Buy
    } else if news.avg < -SENTIMENT_THRESHOLD && price.momentum < 0.0 {
        SignalStatus::Sell
    } else {
        SignalStatus::Neutral
    }
}

/// 60 plus half the combined sentiment/momentum magnitude, capped. Neutral is fixed.
pub fn heuristic_confidence(
    status: SignalStatus,
    news: &AggregateSentiment,
    price: &PriceFeatures,
    cap: u32,
    neutral: u32,
) -> f64 {
    let confidence = match status {
        SignalStatus::Neutral => neutral as f64,
        _ => {
            let magnitude = (news.avg * 100.0).abs() + price.momentum.abs();
            (BASE_CONFIDENCE + (magnitude / 2.0).round()).min(cap as f64)
        }
    };
    clamp_confidence(confidence)
}

pub fn sentiment_summary(news: &AggregateSentiment) -> String {
    format!(
        "News skew: bullish {} vs bearish {}, avg {:.2}",
        news.bullish, news.bearish, news.avg
    )
}

/// Reasons for the `/signal` heuristic.
pub fn signal_reasons(news: &AggregateSentiment, price: &PriceFeatures) -> Vec<String> {
    let mut reasons = vec![format!(
        "News sentiment avg {:.2} (bull:{}, bear:{})",
        news.avg, news.bullish, news.bearish
    )];
    if price.is_unavailable() {
        reasons.push("Price feed unavailable; used news-only heuristics".to_string());
    } else {
        reasons.push(format!("Momentum vs SMA20 {:.2}%", price.momentum));
        reasons.push(format!("Change over window {:.2}%", price.pct_change));
    }
    reasons
}

pub fn heuristic_signal(
    news: &AggregateSentiment,
    price: &PriceFeatures,
    cap: u32,
    neutral: u32,
) -> SignalDecision {
    let status = heuristic_status(news, price);
    SignalDecision {
        status,
        confidence: heuristic_confidence(status, news, price, cap, neutral),
        reasons: signal_reasons(news, price),
    }
}

/// Entry at the last price with a 1:2 risk/reward bracket; flat plans bracket nothing.
pub fn heuristic_plan(
    news: &AggregateSentiment,
    price: &PriceFeatures,
    cap: u32,
    neutral: u32,
) -> TradePlan {
    let status = heuristic_status(news, price);
    let confidence = heuristic_confidence(status, news, price, cap, neutral);
    let vol_frac = risk_fraction(price.volatility);
    let entry = price.last;

    let (stop_loss, take_profit) = match status {
        SignalStatus::Buy => (
            entry * (1.0 - vol_frac),
            entry * (1.0 + REWARD_RATIO * vol_frac),
        ),
        SignalStatus::Sell => (
            entry * (1.0 + vol_frac),
            entry * (1.0 - REWARD_RATIO * vol_frac),
        ),
        SignalStatus::Neutral => (entry, entry),
    };

    TradePlan {
        status,
        confidence,
        entry_price: entry,
        stop_loss,
        take_profit,
        chart_reasons: chart_reasons(status, price, vol_frac),
        news_reasons: vec![
            format!(
                "{} bullish vs {} bearish headlines",
                news.bullish, news.bearish
            ),
            format!("Average news score {:.2}", news.avg),
        ],
        sentiment_summary: sentiment_summary(news),
    }
}

fn chart_reasons(status: SignalStatus, price: &PriceFeatures, vol_frac: f64) -> Vec<String> {
    if price.is_unavailable() {
        return match status {
            SignalStatus::Neutral => vec![
                "Price feed unavailable; awaiting price data for chart-based decision".to_string(),
            ],
            _ => vec![
                "Price feed unavailable; entry set to last known or market".to_string(),
                "Using default risk sizing due to missing volatility".to_string(),
            ],
        };
    }

    let sizing = format!(
        "Volatility ~ {:.2}% suggests {}bp stop, 2R target",
        price.volatility,
        (vol_frac * 100.0).round()
    );
    match status {
        SignalStatus::Buy => vec![
            format!("Price above SMA20 by {:.2}%", price.momentum),
            sizing,
        ],
        SignalStatus::Sell => vec![
            format!("Price below SMA20 by {:.2}%", price.momentum.abs()),
            sizing,
        ],
        SignalStatus::Neutral => vec![format!(
            "Mixed momentum ({:.2}%) and change ({:.2}%)",
            price.momentum, price.pct_change
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Timeframe;

    fn price(last: f64, momentum: f64, volatility: f64) -> PriceFeatures {
        PriceFeatures {
            pair: "BTCUSDT".to_string(),
            interval: Timeframe::H1,
            last,
            pct_change: 1.5,
            momentum,
            volatility,
            source: "binance".to_string(),
        }
    }

    fn news(avg: f64, bullish: usize, bearish: usize) -> AggregateSentiment {
        AggregateSentiment { avg, bullish, bearish }
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(SignalStatus::from_action("long"), SignalStatus::Buy);
        assert_eq!(SignalStatus::from_action("SHORT"), SignalStatus::Sell);
        assert_eq!(SignalStatus::from_action("HOLD"), SignalStatus::Neutral);
        assert_eq!(SignalStatus::parse("sell"), Some(SignalStatus::Sell));
        assert_eq!(SignalStatus::parse("wait"), None);
        assert_eq!(serde_json::to_string(&SignalStatus::Buy).unwrap(), "\"BUY\"");
    }

    #[test]
    fn test_risk_fraction_is_clamped() {
        assert_eq!(risk_fraction(0.0), MIN_RISK_FRACTION);
        assert_eq!(risk_fraction(-50.0), MAX_RISK_FRACTION);
        assert!((risk_fraction(1.0) - 0.01).abs() < 1e-12);
        assert_eq!(risk_fraction(f64::NAN), MAX_RISK_FRACTION);
    }

    #[test]
    fn test_buy_requires_both_news_and_momentum() {
        assert_eq!(heuristic_status(&news(0.2, 3, 0), &price(100.0, 1.0, 1.0)), SignalStatus::Buy);
        assert_eq!(heuristic_status(&news(0.2, 3, 0), &price(100.0, -1.0, 1.0)), SignalStatus::Neutral);
        assert_eq!(heuristic_status(&news(0.05, 3, 0), &price(100.0, 1.0, 1.0)), SignalStatus::Neutral);
        assert_eq!(heuristic_status(&news(-0.3, 0, 3), &price(100.0, -2.0, 1.0)), SignalStatus::Sell);
    }

    #[test]
    fn test_buy_confidence_range_holds_for_any_magnitude() {
        for avg in [0.06, 0.3, 0.9, 1.0] {
            for momentum in [0.01, 2.0, 15.0, 400.0] {
                let d = heuristic_signal(&news(avg, 1, 0), &price(100.0, momentum, 1.0), 90, 45);
                assert_eq!(d.status, SignalStatus::Buy);
                assert!((60.0..=90.0).contains(&d.confidence));

                let p = heuristic_plan(&news(avg, 1, 0), &price(100.0, momentum, 1.0), 88, 45);
                assert!((60.0..=88.0).contains(&p.confidence));
            }
        }
    }

    #[test]
    fn test_confidence_formula() {
        // |0.2*100| + |4| = 24 -> 60 + 12
        let d = heuristic_signal(&news(0.2, 2, 0), &price(100.0, 4.0, 1.0), 90, 45);
        assert_eq!(d.confidence, 72.0);

        let n = heuristic_signal(&news(0.0, 0, 0), &price(100.0, 4.0, 1.0), 90, 45);
        assert_eq!(n.status, SignalStatus::Neutral);
        assert_eq!(n.confidence, 45.0);
    }

    #[test]
    fn test_buy_plan_brackets() {
        let plan = heuristic_plan(&news(0.3, 3, 1), &price(200.0, 2.0, 1.0), 88, 45);
        assert_eq!(plan.status, SignalStatus::Buy);
        assert_eq!(plan.entry_price, 200.0);
        assert!((plan.stop_loss - 198.0).abs() < 1e-9);
        assert!((plan.take_profit - 204.0).abs() < 1e-9);
        assert_eq!(plan.chart_reasons[0], "Price above SMA20 by 2.00%");
        assert_eq!(plan.news_reasons[0], "3 bullish vs 1 bearish headlines");
        assert_eq!(plan.sentiment_summary, "News skew: bullish 3 vs bearish 1, avg 0.30");
    }

    #[test]
    fn test_sell_plan_mirrors_brackets() {
        let plan = heuristic_plan(&news(-0.3, 0, 2), &price(100.0, -3.0, 5.0), 88, 45);
        assert_eq!(plan.status, SignalStatus::Sell);
        assert!((plan.stop_loss - 102.0).abs() < 1e-9);
        assert!((plan.take_profit - 96.0).abs() < 1e-9);
        assert_eq!(plan.chart_reasons[0], "Price below SMA20 by 3.00%");
    }

    #[test]
    fn test_neutral_plan_is_flat() {
        let plan = heuristic_plan(&news(0.0, 1, 1), &price(50.0, 2.0, 1.0), 88, 45);
        assert_eq!(plan.status, SignalStatus::Neutral);
        assert_eq!((plan.entry_price, plan.stop_loss, plan.take_profit), (50.0, 50.0, 50.0));
        assert_eq!(plan.chart_reasons.len(), 1);
    }

    #[test]
    fn test_degraded_reasons_mention_missing_price() {
        let unavailable = PriceFeatures::unavailable("BTCUSDT", Timeframe::H1);
        let d = heuristic_signal(&news(0.4, 2, 0), &unavailable, 90, 45);
        assert_eq!(d.status, SignalStatus::Neutral);
        assert!(d.reasons.iter().any(|r| r.contains("Price feed unavailable")));

        let plan = heuristic_plan(&news(0.4, 2, 0), &unavailable, 88, 45);
        assert_eq!(plan.entry_price, 0.0);
        assert!(plan.chart_reasons[0].starts_with("Price feed unavailable"));
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(150.0), 100.0);
        assert_eq!(clamp_confidence(-5.0), 0.0);
        assert_eq!(clamp_confidence(f64::INFINITY), 0.0);
    }
}
