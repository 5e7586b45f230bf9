use anyhow::Context;

use id_onboard::api::{self, AppState};
use id_onboard::config::OnboardConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OnboardConfig::from_env().context("Invalid configuration")?;

    eprintln!("🪪 ID Onboard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding", config.port);
    eprintln!("   Agent: http://0.0.0.0:{}/api/agent/actions", config.port);
    eprintln!(
        "   Confidence threshold: {}",
        config.policy.confidence_threshold
    );

    let state = AppState::from_config(&config)
        .await
        .context("Failed to initialise onboarding service")?;
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Uploads: {}", config.object_root.display());
    match &config.registry_path {
        Some(path) => eprintln!("   Registry: {}", path.display()),
        None => eprintln!("   Registry: built-in seed data"),
    }

    let app = api::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Onboarding server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
