use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use rewind_logging::RewindSubscriberBuilder;
use rewind_node::{NodeConfig, RewindNode};

#[derive(Parser)]
#[command(name = "rewindd", about = "Session replay storage daemon")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Data directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Retention window, e.g. "14days" or "36h"
    #[arg(long, value_parser = humantime::parse_duration)]
    max_age: Option<Duration>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(max_age) = self.max_age {
            config.retention.max_age = max_age;
        }
        if let Some(level) = self.log_level {
            config.logging.default_level = level;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let _log_guard = RewindSubscriberBuilder::new()
        .with_config(config.log_config())
        .init()?;

    info!(
        data_dir = %config.data_dir.display(),
        max_age = %humantime::format_duration(config.retention.max_age),
        "Starting rewindd"
    );

    let node = RewindNode::new(config).await?;
    node.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    node.stop().await?;
    Ok(())
}
