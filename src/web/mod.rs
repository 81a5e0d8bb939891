pub mod handlers;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::trading::SignalOrchestrator;

pub use handlers::{handle_rejection, ApiError};

/// Largest accepted `/analyze` body.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

fn with_orchestrator(
    orchestrator: Arc<SignalOrchestrator>,
) -> impl Filter<Extract = (Arc<SignalOrchestrator>,), Error = Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}

/// Every endpoint, rooted at `/`.
pub fn routes(
    orchestrator: Arc<SignalOrchestrator>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state = with_orchestrator(orchestrator);
    let params = warp::query::<HashMap<String, String>>();

    let health = warp::path!("health")
        .and(warp::get())
        .and(state.clone())
        .and_then(handlers::health);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(state.clone())
        .and_then(handlers::metrics);

    let general_news = warp::path!("news" / "general")
        .and(warp::get())
        .and(params.clone())
        .and(state.clone())
        .and_then(handlers::general_news);

    let news = warp::path!("news")
        .and(warp::get())
        .and(params.clone())
        .and(state.clone())
        .and_then(handlers::news);

    let signal = warp::path!("signal")
        .and(warp::get())
        .and(params)
        .and(state.clone())
        .and_then(handlers::signal);

    let analyze = warp::path!("analyze")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(state.clone())
        .and_then(handlers::analyze);

    let tickers_db = warp::path!("tickersdb")
        .and(warp::get())
        .and(state)
        .and_then(handlers::tickers_db);

    health
        .or(metrics)
        .or(general_news)
        .or(news)
        .or(signal)
        .or(analyze)
        .or(tickers_db)
}

/// Routes served both at the root and under `/api`, with CORS and JSON errors.
pub fn app(
    orchestrator: Arc<SignalOrchestrator>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let routes = routes(orchestrator);
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    warp::path("api")
        .and(routes.clone())
        .or(routes)
        .with(cors)
        .with(warp::trace::request())
        .recover(handle_rejection)
}
