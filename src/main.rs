use anyhow::Context;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duocam::console::Console;
use duocam::{Rig, RigSettings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings = RigSettings::load().context("failed to load rig settings")?;
    let mut rig = Rig::from_settings(settings).await.context("failed to set up cameras and lighting")?;
    if let Some(report) = rig.start().await {
        info!(path = %report.path.display(), cameras = report.applied.len(), "default configuration applied");
    }

    let console = Console::new(rig, BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    console.run().await.context("console I/O failed")?;
    Ok(())
}
