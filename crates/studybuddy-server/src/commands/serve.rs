//! The `studybuddy serve` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use studybuddy_server::{create_router, AppState};
use studybuddy_store::{load_course_catalog, validate_catalog};

pub async fn execute(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    catalog: Option<PathBuf>,
) -> Result<()> {
    let config = studybuddy_providers::load_config_from(config_path.as_deref())?;

    let courses = match catalog.or_else(|| config.catalog.clone()) {
        Some(path) => {
            let courses = load_course_catalog(&path)?;
            for warning in validate_catalog(&courses) {
                tracing::warn!(course = %warning.course_id, "{}", warning.message);
            }
            tracing::info!(path = %path.display(), courses = courses.len(), "loaded course catalog");
            courses
        }
        None => {
            tracing::warn!("no course catalog configured; serving an empty catalog");
            Vec::new()
        }
    };

    let state = AppState::from_config(&config, courses).await?;
    let addr = bind.unwrap_or_else(|| config.bind.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %addr,
        provider = state.service.provider_name(),
        "studybuddy listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
    }
}
