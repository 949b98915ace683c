//! # fsrouter entry point
//!
//! Starts the request router that matches file-requesting clients to storage
//! nodes.
//!
//! ## Usage
//!
//! ```bash
//! # Round-robin on the default port
//! fsrouter
//!
//! # Least-response-time on an explicit bind address, with telemetry
//! fsrouter -b 0.0.0.0:8000 -p least-response-time --telemetry-log events.jsonl
//! ```
//!
//! The router stops cleanly when a peer sends a shutdown frame; everything
//! else it survives.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use fsrouter_router::{Policy, Router, Telemetry};

/// fsrouter - request router for a distributed file-storage cluster
#[derive(FromArgs)]
struct Cli {
    /// address to bind the router's listener to
    ///
    /// Storage nodes, clients and the shutdown signal all connect here.
    /// Defaults to "0.0.0.0:8000".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8000\".into()")]
    bind: String,

    /// scheduling policy: round-robin, least-connections or
    /// least-response-time
    ///
    /// Defaults to "round-robin".
    #[argh(option, short = 'p', default = "\"round-robin\".into()")]
    policy: String,

    /// optional file to append telemetry events to, one JSON object per line
    ///
    /// Without it, telemetry events are emitted through the normal log
    /// output instead.
    #[argh(option, long = "telemetry-log")]
    telemetry_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level INFO, RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let policy: Policy = cli
        .policy
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}, expected round-robin, least-connections or least-response-time"))?;
    let addr: SocketAddr = cli
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {:?}: {e}", cli.bind))?;

    let telemetry = match &cli.telemetry_log {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            tracing::info!(path = %path.display(), "appending telemetry events as JSON lines");
            Telemetry::spawn_with_writer(file)
        }
        None => Telemetry::spawn(),
    };

    let mut router = Router::bind(addr, policy, telemetry).await?;
    router.run().await?;

    tracing::info!("router stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::from_args(&["fsrouter"], &[]).unwrap();
        assert_eq!(cli.bind, "0.0.0.0:8000");
        assert_eq!(cli.policy, "round-robin");
        assert!(cli.telemetry_log.is_none());
    }

    #[test]
    fn test_cli_parse_policy_and_bind() {
        let cli = Cli::from_args(
            &["fsrouter"],
            &["-b", "127.0.0.1:9000", "-p", "least-response-time"],
        )
        .unwrap();
        assert_eq!(cli.bind, "127.0.0.1:9000");
        assert_eq!(cli.policy, "least-response-time");
    }

    #[test]
    fn test_cli_parse_telemetry_log() {
        let cli = Cli::from_args(&["fsrouter"], &["--telemetry-log", "events.jsonl"]).unwrap();
        assert_eq!(cli.telemetry_log, Some(PathBuf::from("events.jsonl")));
    }

    #[test]
    fn test_policy_names_resolve() {
        for name in ["round-robin", "least-connections", "least-response-time"] {
            assert!(name.parse::<Policy>().is_ok());
        }
        assert!("weighted".parse::<Policy>().is_err());
    }
}
