// Cofre — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits secret values), and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cofre::cli::{execute, Cli};

fn main() {
    // RUST_LOG=cofre=debug for verbose output. The default level is `info`,
    // which never includes secret values.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cofre=info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        if e.is_internal() {
            tracing::error!(error = %e, "Command failed");
        }
        eprintln!("Error: {}", e.public_message());
        std::process::exit(1);
    }
}
