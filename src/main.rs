use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use plantid_web::{
    engine::EngineFactory, ingest::ImageDirs, retention::RetentionSweeper, router,
    telemetry::init_tracing, AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let engine = EngineFactory::create(&config)
        .await
        .context("Failed to initialise identification engine")?;
    tracing::info!(engine = engine.name(), "Identification engine ready");

    if let Some(max_age) = config.retention {
        let dirs = ImageDirs::under(&config.static_dir)
            .all()
            .iter()
            .map(|dir| dir.to_path_buf())
            .collect();
        RetentionSweeper::new(dirs, max_age).start(config.retention_sweep_interval);
        tracing::info!(max_age_secs = max_age.as_secs(), "Image retention enabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        addr = %addr,
        static_dir = %config.static_dir.display(),
        body_limit_mb = config.body_limit_bytes / 1024 / 1024,
        "Listening"
    );

    let app = router(Arc::new(AppState::new(config, engine)?));
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutting down gracefully...");
}
