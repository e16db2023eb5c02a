//! cli
//!
//! Command-line interface layer for bbkt.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Load configuration and delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Credential handling lives in [`crate::auth`] and
//! request execution in [`crate::client`]; handlers only wire them together
//! and format output.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::ui::output::Verbosity;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let config = Config::load().context("Failed to load configuration")?;
    if let Some(path) = config.loaded_from() {
        tracing::debug!(path = %path.display(), "configuration loaded");
    }

    let ctx = commands::Context {
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
        config,
    };

    commands::dispatch(cli.command, &ctx)
}

/// Default filter directive when `RUST_LOG` is unset.
fn default_directive(debug: bool) -> &'static str {
    if debug {
        "bbkt=debug"
    } else {
        "warn"
    }
}

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `--debug`.
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
