use anyhow::Result;
use clap::Parser;

use stash_operator::config::Config;
use stash_operator::operator::Operator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();
    Operator::new(config).run().await
}
