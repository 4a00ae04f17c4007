//! Competitor research service: binary entrypoint.
//! Boots the Axum HTTP server with the research pipeline, report stage and /metrics.

use anyhow::Context;
use competitor_research::ai_bootstrap::AppRuntime;
use competitor_research::api::{self, AppState};
use competitor_research::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - RESEARCH_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("RESEARCH_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("competitor_research=info,warn"));

    // shuttle may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let runtime = AppRuntime::from_env().context("building research runtime")?;
    let metrics = Metrics::init(&runtime.ai)?;

    let router = api::router(AppState::from(&runtime)).merge(metrics.router());
    Ok(router.into())
}
