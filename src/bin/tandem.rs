//! Tandem - controller for a multi-process backup session
//!
//! Loads the session configuration, launches the configured peers, brings
//! their settings in line with this process and broadcasts the configured
//! patterns.
//!
//! # Usage
//!
//! ```text
//! tandem show                                   # settings after config
//! tandem --config ./tandem.toml show
//! tandem sync --set blocksize=65536             # with extra assignments
//! tandem sync --peer "ssh backup-host tandem-peer"
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_core::{ExitSink, SettingRegistry, SettingValue};
use tandem_protocol::{from_wire, PeerReply, PeerRequest};
use tandem_session::{Connection, PeerCommand, Session, SessionConfig};

/// Tandem - shared settings for backup sessions
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about)]
struct Args {
    /// Configuration file (default: <config dir>/tandem/tandem.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the settings this process would start with
    Show,
    /// Launch peers and synchronize settings and patterns with them
    Sync {
        /// Extra assignment, NAME=VALUE (VALUE is JSON, or text otherwise)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Extra peer command line, in addition to the configured peers
        #[arg(short, long = "peer", value_name = "COMMAND")]
        peer: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_env("TANDEM_LOG")
                .add_directive("tandem=info".parse()?)
                .add_directive("tandem_session=info".parse()?)
                .add_directive("tandem_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config.unwrap_or_else(SessionConfig::default_path);
    let config = SessionConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    match args.command.unwrap_or(Command::Show) {
        Command::Show => show(&config),
        Command::Sync { set, peer } => sync(config, &set, &peer),
    }
}

fn start_session() -> Result<Session> {
    let registry = SettingRegistry::with_defaults(Arc::new(ExitSink));
    Session::start(registry).context("Failed to start session")
}

fn show(config: &SessionConfig) -> Result<()> {
    let mut session = start_session()?;
    session
        .apply_settings(config)
        .context("Failed to apply configured settings")?;
    session
        .install_patterns(config)
        .context("Failed to install configured patterns")?;

    session.settings().with(|reg| {
        for name in reg.names() {
            if let Ok(value) = reg.get(name) {
                println!("{name} = {value}");
            }
        }
    });
    Ok(())
}

fn sync(mut config: SessionConfig, assignments: &[String], peers: &[String]) -> Result<()> {
    for command_line in peers {
        config.peers.push(parse_peer(command_line)?);
    }

    let mut session = start_session()?;
    session
        .apply_settings(&config)
        .context("Failed to apply configured settings")?;
    for assignment in assignments {
        let (name, value) = parse_assignment(assignment)?;
        session.set(name, value);
    }

    info!(peers = config.peers.len(), pid = process::id(), "Launching peers");
    let ids = session
        .spawn_peers(&config)
        .context("Failed to attach peers")?;
    session
        .install_patterns(&config)
        .context("Failed to broadcast patterns")?;

    for connection in session.connections_mut().iter_mut() {
        let id = connection.id();
        match connection.invoke(PeerRequest::DrainChangeLog) {
            Ok(PeerReply::Names { names }) => {
                println!("connection {id} ({}): {} changes", connection.kind(), names.len());
            }
            Ok(other) => bail!("Connection {id} answered {other:?}"),
            Err(e) => bail!("Connection {id} failed: {e}"),
        }
    }

    let stopped = session.shutdown();
    println!("{} of {} peers stopped", stopped, ids.len());
    Ok(())
}

/// Splits `NAME=VALUE`. The value is read as JSON when it parses, as text
/// otherwise, and its kind is inferred from the result.
fn parse_assignment(assignment: &str) -> Result<(String, SettingValue)> {
    let Some((name, raw)) = assignment.split_once('=') else {
        bail!("Expected NAME=VALUE, got {assignment:?}");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Missing setting name in {assignment:?}");
    }
    let json = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let value = from_wire(name, &json, None)?;
    Ok((name.to_string(), value))
}

fn parse_peer(command_line: &str) -> Result<PeerCommand> {
    let mut words = command_line.split_whitespace().map(str::to_string);
    let Some(command) = words.next() else {
        bail!("Empty peer command");
    };
    Ok(PeerCommand {
        command,
        args: words.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let (name, value) = parse_assignment("blocksize=65536").unwrap();
        assert_eq!(name, "blocksize");
        assert_eq!(value, SettingValue::Integer(65536));

        let (_, value) = parse_assignment("time_separator=_").unwrap();
        assert_eq!(value, SettingValue::from("_"));

        let (_, value) = parse_assignment("compression=false").unwrap();
        assert_eq!(value, SettingValue::Bool(false));

        assert!(parse_assignment("blocksize").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn test_parse_peer() {
        let peer = parse_peer("ssh backup-host tandem-peer").unwrap();
        assert_eq!(peer.command, "ssh");
        assert_eq!(peer.args, vec!["backup-host", "tandem-peer"]);
        assert!(parse_peer("   ").is_err());
    }
}
