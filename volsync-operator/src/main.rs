use anyhow::Result;
use clap::Parser;
use tracing::debug;
use volsync_operator::config::Config;
use volsync_operator::operator::Operator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    debug!("{config:?}");

    Operator::new(config).run().await
}
