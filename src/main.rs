//! Binary entry point: wires up logging, then hands off to the CLI.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = loraforge::cli::parse_cli();

    // RUST_LOG, when set, wins over --log-level.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    loraforge::cli::run_with_cli(cli).await
}
