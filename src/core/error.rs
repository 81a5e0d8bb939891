use thiserror::Error;

/// Failures at the boundary of a market-data or news provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} credential not configured")]
    MissingCredential { provider: &'static str },

    #[error("{provider} error {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider} transport error: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned a malformed payload: {reason}")]
    Decode { provider: &'static str, reason: String },

    #[error("{provider} returned no usable price points")]
    EmptySeries { provider: &'static str },
}

impl ProviderError {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::MissingCredential { provider }
            | ProviderError::Status { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::EmptySeries { provider } => provider,
        }
    }

    pub(crate) fn transport(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ProviderError::Transport { provider, source }
    }

    pub(crate) fn decode(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| ProviderError::Decode {
            provider,
            reason: e.to_string(),
        }
    }
}

/// Failures of a chat-completion round trip.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM credential not configured")]
    NoCredential,

    #[error("openai_{0}")]
    Status(u16),

    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM reply had no content")]
    MissingContent,

    #[error("LLM reply was not valid JSON: {0}")]
    Parse(String),
}

impl LlmError {
    /// Whether the model answered at all. Unparseable answers and failed calls
    /// demote to differently tuned heuristics.
    pub fn is_reply_error(&self) -> bool {
        matches!(self, LlmError::MissingContent | LlmError::Parse(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        LlmError::Parse(e.to_string())
    }
}

/// Takes the primary result when it succeeded, otherwise logs why and builds the fallback.
pub fn resolve_or<T, E, F>(stage: &str, primary: Result<T, E>, fallback: F) -> T
where
    E: std::fmt::Display,
    F: FnOnce(&E) -> T,
{
    match primary {
        Ok(value) => value,
        Err(reason) => {
            tracing::warn!(stage, %reason, "primary path failed, using fallback");
            fallback(&reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_messages() {
        let e = ProviderError::Status {
            provider: "binance",
            status: 451,
        };
        assert_eq!(e.to_string(), "binance error 451");
        assert_eq!(e.provider(), "binance");

        let e = ProviderError::EmptySeries {
            provider: "coingecko",
        };
        assert_eq!(e.to_string(), "coingecko returned no usable price points");
    }

    #[test]
    fn test_reply_errors_are_distinguished() {
        assert!(LlmError::Parse("eof".into()).is_reply_error());
        assert!(LlmError::MissingContent.is_reply_error());
        assert!(!LlmError::Status(500).is_reply_error());
        assert_eq!(LlmError::Status(429).to_string(), "openai_429");
    }

    #[test]
    fn test_resolve_or_prefers_primary() {
        let ok: Result<u32, LlmError> = Ok(7);
        assert_eq!(resolve_or("test", ok, |_| 0), 7);

        let err: Result<u32, LlmError> = Err(LlmError::Status(500));
        assert_eq!(resolve_or("test", err, |_| 3), 3);
    }

    #[test]
    fn test_resolve_or_passes_reason_to_fallback() {
        let err: Result<u32, LlmError> = Err(LlmError::MissingContent);
        let picked = resolve_or("test", err, |e| if e.is_reply_error() { 1 } else { 2 });
        assert_eq!(picked, 1);
    }
}
