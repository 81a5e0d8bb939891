use anyhow::Result;
use fluxfeed_signals::core::logging::init_logging;
use fluxfeed_signals::core::{Config, HealthChecker, Metrics};
use fluxfeed_signals::trading::SignalOrchestrator;
use fluxfeed_signals::web;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config.server.log_level);

    tracing::info!("FluxFeed signal service starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if !config.has_news_credential() {
        tracing::warn!("CRYPTONEWS_API_KEY not set, news endpoints will return empty lists");
    }
    if !config.has_llm_credential() {
        tracing::warn!("OPENAI_API_KEY not set, using keyword and heuristic fallbacks");
    }

    let metrics = Arc::new(Metrics::new()?);
    let health_checker = HealthChecker::new(&config);
    let port = config.server.port;

    let orchestrator = Arc::new(SignalOrchestrator::new(config, health_checker, metrics));

    tracing::info!("Listening on http://0.0.0.0:{}", port);
    warp::serve(web::app(orchestrator))
        .run(([0, 0, 0, 0], port))
        .await;

    Ok(())
}
