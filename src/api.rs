mod config;
mod repo;

#[path = "api/error.rs"]
mod error;

#[path = "api/state.rs"]
mod state;

#[path = "api/cors.rs"]
pub mod cors;

#[path = "api/auth.rs"]
pub mod auth;

#[path = "api/router.rs"]
mod router;

#[path = "api/handlers/mod.rs"]
mod handlers;

use lambda_http::{run, service_fn, Error, Request};
use tracing_subscriber::EnvFilter;

use state::{ApiConfig, AppState};

async fn function_handler(
    event: Request,
    state: &AppState,
) -> Result<lambda_http::Response<lambda_http::Body>, Error> {
    router::route_request(event, state).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .without_time()
        .init();

    // Built once per container and shared by every invocation
    let config = ApiConfig::from_env().await.map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Error::from(format!("Configuration error: {}", e))
    })?;
    let state = AppState::new(config);

    run(service_fn(|event: Request| function_handler(event, &state))).await
}

#[cfg(test)]
pub(crate) fn api_state_for_test() -> AppState {
    use chrono::{TimeZone, Utc};
    use energy_monitor::shared::id_generator::FixedIdGenerator;
    use energy_monitor::shared::time::FixedClock;
    use std::sync::Arc;

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    AppState::with_seams(
        ApiConfig::for_test("http://localhost:8000"),
        Arc::new(FixedClock::new(now)),
        Arc::new(FixedIdGenerator::from_strings(&[
            "6f1c2a3b-0000-4000-8000-000000000001",
        ])),
    )
}
