use anyhow::Result;
use concierge::integration::{KioskConfig, Orchestrator};
use concierge::llm::HttpAnswerClient;
use concierge::ui::terminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing on stderr; stdout belongs to the kiosk
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Concierge kiosk");

    let config = load_config()?;
    let answers = Arc::new(HttpAnswerClient::new(config.answer.clone())?);
    let (devices, microphone) = terminal::terminal_devices(answers);

    let (orchestrator, handle) = Orchestrator::new(config, devices);
    let task = orchestrator.start();

    terminal::run(handle, microphone).await?;
    task.await?;

    info!("Concierge stopped");
    Ok(())
}

/// First CLI argument, else `$CONCIERGE_CONFIG`, else the user config dir, else defaults
fn load_config() -> Result<KioskConfig> {
    if let Some(path) = std::env::args().nth(1) {
        info!("Loading config from {}", path);
        return Ok(KioskConfig::load(PathBuf::from(path))?);
    }

    match KioskConfig::default_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            Ok(KioskConfig::load(&path)?)
        }
        _ => {
            info!("No config file found, using defaults");
            Ok(KioskConfig::default())
        }
    }
}
