use anyhow::Result;
use clap::Parser;

use stash_sidecar::config::{Command, Config};
use stash_sidecar::sidecar::Sidecar;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();
    let Command::RunSidecar(args) = config.command;
    Sidecar::new(args).run().await
}
