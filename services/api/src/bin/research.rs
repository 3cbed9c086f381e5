//! services/api/src/bin/research.rs
//!
//! The `research` command line client.

use api_lib::{
    cli::{Cli, Research},
    config::Config,
    error::ApiError,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let research = Research::from_config(config)?;
    let mut input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    research.run(cli.command, &mut input, &mut out).await
}
