use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http_api;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        listen = %config.listen_addr,
        images_dir = %config.images_dir.display(),
        models_dir = %config.models_dir.display(),
        "facegated starting"
    );

    let engine = engine::spawn_engine(&config);
    let app = http_api::router(engine);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("facegated ready");

    axum::serve(listener, app).await?;

    Ok(())
}
