//! whisper-node binary entry point

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whisper_node::{ServerConfig, WhisperNode};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so its log filter can apply.
    let config = ServerConfig::load()?;

    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let node = WhisperNode::new(config)?;
    node.run().await?;

    Ok(())
}
