use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Process-wide counters, exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    fallbacks: IntCounterVec,
    provider_errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("fluxfeed_requests_total", "Inbound requests by endpoint"),
            &["endpoint"],
        )?;
        let fallbacks = IntCounterVec::new(
            Opts::new(
                "fluxfeed_fallbacks_total",
                "Times a pipeline stage fell back to its degraded path",
            ),
            &["stage"],
        )?;
        let provider_errors = IntCounterVec::new(
            Opts::new(
                "fluxfeed_provider_errors_total",
                "Failed calls to external providers",
            ),
            &["provider"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(provider_errors.clone()))?;

        Ok(Self {
            registry,
            requests,
            fallbacks,
            provider_errors,
        })
    }

    pub fn record_request(&self, endpoint: &str) {
        self.requests.with_label_values(&[endpoint]).inc();
    }

    pub fn record_fallback(&self, stage: &str) {
        self.fallbacks.with_label_values(&[stage]).inc();
    }

    pub fn record_provider_error(&self, provider: &str) {
        self.provider_errors.with_label_values(&[provider]).inc();
    }

    #[cfg(test)]
    pub(crate) fn fallback_count(&self, stage: &str) -> u64 {
        self.fallbacks.with_label_values(&[stage]).get()
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
