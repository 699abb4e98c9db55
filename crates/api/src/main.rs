use anyhow::Context;

use routekit_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    routekit_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;

    let app = routekit_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
