pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::code_runner::{CodeRunner, HttpCodeRunner};
use crate::services::notifications::notifier_from_settings;

/// Loads configuration, connects Postgres and Redis and assembles the shared state.
async fn build_state() -> anyhow::Result<(AppState, RedisHandle)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; run rate limiting disabled");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let runner: Arc<dyn CodeRunner> = Arc::new(HttpCodeRunner::from_settings(settings.runner())?);
    let notifier = notifier_from_settings(settings.mail());
    let state = AppState::new(settings, db_pool, redis.clone(), runner, notifier);

    Ok((state, redis))
}

pub async fn run() -> anyhow::Result<()> {
    let (state, redis) = build_state().await?;

    if let Err(err) = core::bootstrap::ensure_admin(&state).await {
        tracing::error!(error = %err, "Failed to ensure first admin");
    }
    match core::bootstrap::seed_catalog(&state).await {
        Ok(inserted) if inserted > 0 => tracing::info!(inserted, "Catalog seeded"),
        Ok(_) => {}
        Err(err) => tracing::error!(error = %err, "Failed to seed test catalog"),
    }

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "TalentTrack API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (state, redis) = build_state().await?;

    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
