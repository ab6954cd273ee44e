//! Service entrypoint: loads config, wires the pipeline and serves the API.

use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use toolpulse::{api, metrics::Metrics, AppState};

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolpulse=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        // Shuttle's local runner may install its own subscriber first.
        eprintln!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let state = AppState::from_env()?;
    let metrics = Metrics::init(state.generator.contract().target_count)?;
    info!(
        target_count = state.generator.contract().target_count,
        auth = state.auth.password_required(),
        "toolpulse ready"
    );

    Ok(api::router(state, Some(&metrics)).into())
}
