//! # Arbor
//!
//! Replay configuration tree scenarios from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Replay a scenario and print the action stream
//! arbor replay -f demos/reparent.toml
//!
//! # Check a scenario without running it
//! arbor validate -f demos/reparent.toml
//!
//! # Write the final tree as a canonical export
//! arbor dump -f demos/reparent.toml -o reparent.arbx
//!
//! # Summarize a canonical export
//! arbor inspect -i reparent.arbx
//! ```

use arbor::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // ARBOR_LOG_FORMAT=json switches to machine-parseable logs.
    let log_format = std::env::var("ARBOR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "arbor=info,arbor_core=info".into());

    // logs go to stderr so stdout stays parseable in --json-mode
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
