//! agentwire CLI entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentwire_cli::{Cli, ExitCode};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // stdout carries envelopes; logs go to stderr
    let level = &cli.log_level;
    let filter = EnvFilter::try_new(format!(
        "agentwire={level},agentwire_cli={level},agentwire_core={level},agentwire_crypto={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.execute().await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::for_error(&e).to_exit_code()
        }
    }
}
