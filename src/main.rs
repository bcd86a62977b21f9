mod auth;
mod cli;
mod collector;
mod error;
mod events;
mod metrics;
mod publish;
mod render;
mod sources;
mod window;
mod workflows;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting devops-dashboard");
    cli.execute().await?;

    Ok(())
}
