//! Tandem peer - serves one process's settings to a controller
//!
//! The controller launches this binary and talks to it over stdin and
//! stdout, one JSON line per request and reply. Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! tandem-peer                    # serve on stdin/stdout
//! TANDEM_LOG=debug tandem-peer   # with debug logging
//! ```

use std::io;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_core::{ExitSink, SettingRegistry, SettingsHandle};
use tandem_session::serve;

/// Tandem peer - settings endpoint for a backup session
#[derive(Parser, Debug)]
#[command(name = "tandem-peer", version, about)]
struct Args {
    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_env("TANDEM_LOG")
                .add_directive(format!("tandem_peer={default_level}").parse()?)
                .add_directive(format!("tandem_session={default_level}").parse()?),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Tandem peer starting"
    );

    let settings = SettingsHandle::new(SettingRegistry::with_defaults(Arc::new(ExitSink)));
    let summary = serve(io::stdin().lock(), io::stdout().lock(), settings)
        .context("Peer stopped with an error")?;

    info!(
        connection_id = summary.connection_id,
        requests = summary.requests,
        "Tandem peer exiting"
    );
    Ok(())
}
