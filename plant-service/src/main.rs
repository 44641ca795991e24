use plant_service::config::PlantConfig;
use plant_service::startup::Application;
use service_core::middleware::init_metrics;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = PlantConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "plant-service",
        &config.observability.log_level,
        config.observability.otlp_endpoint.as_deref(),
    );

    // Recorder must be installed before any metric is recorded
    init_metrics();

    tracing::info!(
        environment = %config.app.env,
        backend = config.vision.backend.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting plant service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
