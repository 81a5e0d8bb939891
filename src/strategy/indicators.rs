use serde::{Deserialize, Serialize};

/// Trailing window for the moving average behind `momentum`.
pub const SMA_PERIOD: usize = 20;

/// Window-relative features of a close series. All values are percentages except `last`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub last: f64,
    pub pct_change: f64,
    pub momentum: f64,
    pub volatility: f64,
}

/// Indicators over an ordered close series, most recent last.
pub struct Indicators<'a> {
    closes: &'a [f64],
}

impl<'a> Indicators<'a> {
    pub fn new(closes: &'a [f64]) -> Self {
        Self { closes }
    }

    pub fn last(&self) -> f64 {
        self.closes.last().copied().unwrap_or(0.0)
    }

    pub fn pct_change(&self) -> f64 {
        match self.closes.first() {
            Some(&first) if first != 0.0 => (self.last() - first) / first * 100.0,
            _ => 0.0,
        }
    }

    /// Mean of at most the last `period` closes. Empty series yield 0.
    pub fn sma(&self, period: usize) -> f64 {
        let start = self.closes.len().saturating_sub(period);
        let window = &self.closes[start..];
        window.iter().sum::<f64>() / window.len().max(1) as f64
    }

    pub fn momentum(&self) -> f64 {
        let sma = self.sma(SMA_PERIOD);
        if sma == 0.0 {
            return 0.0;
        }
        (self.last() - sma) / sma * 100.0
    }

    /// Simple period-over-period returns. A zero close yields a non-finite return,
    /// which is dropped.
    pub fn returns(&self) -> Vec<f64> {
        self.closes
            .windows(2)
            .map(|w| (w[1] - w[0]) / w[0])
            .filter(|r| r.is_finite())
            .collect()
    }

    /// Population standard deviation of returns, in percent.
    pub fn volatility(&self) -> f64 {
        let returns = self.returns();
        let n = returns.len().max(1) as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() * 100.0
    }

    pub fn features(&self) -> FeatureSet {
        FeatureSet {
            last: self.last(),
            pct_change: self.pct_change(),
            momentum: self.momentum(),
            volatility: self.volatility(),
        }
    }
}

pub fn compute_features(closes: &[f64]) -> FeatureSet {
    Indicators::new(closes).features()
}
