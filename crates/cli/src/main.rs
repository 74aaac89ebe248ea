//! `dg` - delta-aware S3 object storage CLI.

mod cli;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{exit_code_for, Cli};

#[tokio::main]
async fn main() {
    let cli: Cli = Cli::parse();

    let default_level: String = if cli.debug {
        "debug".to_string()
    } else {
        std::env::var("DG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_new(&default_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.run().await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}
