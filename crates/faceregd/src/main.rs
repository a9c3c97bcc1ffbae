use std::sync::Arc;

use anyhow::{Context, Result};
use facereg_core::{FaceAnalyzer, FaceRegistry, ImageDir, RegistryStore};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("faceregd starting");

    let config = config::Config::from_env();
    tracing::info!(?config, "configuration loaded");

    let analyzer = FaceAnalyzer::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(analyzer, config.match_policy(), config.embed_timeout)
        .context("failed to spawn engine thread")?;

    let images = ImageDir::open(&config.faces_dir)?;
    let registry = Arc::new(
        FaceRegistry::new(Arc::new(RegistryStore::new()), images, Arc::new(engine))
            .with_options(config.enroll_options()),
    );

    // The registry must mirror the image directory before any request is served.
    let report = {
        let registry = Arc::clone(&registry);
        let policy = config.reconcile_policy();
        tokio::task::spawn_blocking(move || registry.reconcile(policy))
            .await?
            .context("startup reconciliation failed")?
    };
    tracing::info!(
        enrolled = report.enrolled.len(),
        skipped = report.skipped.len(),
        "registry loaded from {}",
        config.faces_dir.display()
    );

    let app = http::router(Arc::clone(&registry), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "faceregd ready");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("faceregd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
