//! Header Cache Daemon - keeps a local header store in sync with a remote peer
//!
//! Runs the periodic sync loop by default; the other commands operate on a
//! store once and exit.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use header_cache::config::{default_local_path, DEFAULT_PEER_PORT};
use header_cache::{CacheConfig, HeaderCache};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Sync periodically from the configured peer (default)
    Run,
    /// Sync once from a peer
    Sync {
        host: String,
        port: u16,
        path: String,
    },
    /// Print stored headers
    List { path: String, since: u32 },
    /// Drop headers expiring before a cutoff
    Prune { path: String, cutoff: u32 },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Header Cache Daemon - Replicate message headers from a remote peer

USAGE:
    header-cache-daemon                          # Run periodic sync (default)
    header-cache-daemon run
    header-cache-daemon sync <host> <port> [path]
    header-cache-daemon list <path> [since]
    header-cache-daemon prune <path> <cutoff>
    header-cache-daemon help

COMMANDS:
    run     Sync from HEADER_CACHE_HOST every interval until Ctrl+C
    sync    Pull new headers from a peer once (in-memory store without a path)
    list    Print canonical headers with time >= since
    prune   Remove headers with expire < cutoff (unix seconds)
    help    Show this help message

EXAMPLES:
    # Follow a peer with the default store location
    HEADER_CACHE_HOST=indigo.example.com header-cache-daemon

    # One-off sync into a store directory
    header-cache-daemon sync indigo.example.com 7754 /var/lib/header-cache

    # Headers created since a point in time
    header-cache-daemon list /var/lib/header-cache 1461333736

ENVIRONMENT:
    HEADER_CACHE_CONFIG                 JSON config file for run (overrides the variables below)
    HEADER_CACHE_HOST                   Peer host (empty: local store only)
    HEADER_CACHE_PORT                   Peer port (default 7754)
    HEADER_CACHE_PATH                   Store directory (default: user data dir)
    HEADER_CACHE_TIMEOUT_SECS           Request deadline (default 30)
    HEADER_CACHE_CONNECT_TIMEOUT_SECS   Connect deadline (default 10)
    HEADER_CACHE_SYNC_INTERVAL_SECS     Pause between syncs (default 60)
    RUST_LOG                            Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_u32(value: &str, name: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("Invalid {}: {}", name, value))
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Run);
    }

    match args[1].as_str() {
        "run" => Ok(Command::Run),
        "sync" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: header-cache-daemon sync <host> <port> [path]"));
            }
            Ok(Command::Sync {
                host: args[2].clone(),
                port: args[3]
                    .parse()
                    .with_context(|| format!("Invalid port: {}", args[3]))?,
                path: args.get(4).cloned().unwrap_or_default(),
            })
        }
        "list" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: header-cache-daemon list <path> [since]"));
            }
            let since = match args.get(3) {
                Some(since) => parse_u32(since, "since")?,
                None => 0,
            };
            Ok(Command::List {
                path: args[2].clone(),
                since,
            })
        }
        "prune" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: header-cache-daemon prune <path> <cutoff>"));
            }
            Ok(Command::Prune {
                path: args[2].clone(),
                cutoff: parse_u32(&args[3], "cutoff")?,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Config for `run`: a JSON file if `HEADER_CACHE_CONFIG` names one, else the
/// environment with the user data dir as the default store
fn run_config() -> Result<CacheConfig> {
    if let Some(path) = env::var_os("HEADER_CACHE_CONFIG") {
        return CacheConfig::from_json_file(path);
    }
    let mut config = CacheConfig::from_env();
    if env::var_os("HEADER_CACHE_PATH").is_none() {
        config.local_path = default_local_path().display().to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Run => {
            let config = run_config()?;
            info!(
                peer = %config.remote_host,
                port = config.remote_port,
                path = %config.local_path,
                "Starting header cache daemon"
            );
            if config.remote_host.is_empty() {
                warn!("HEADER_CACHE_HOST not set, serving the local store only");
            }

            let cache = match HeaderCache::open_with_config(&config) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    error!(error = %e, "Failed to open header cache");
                    return Err(e.into());
                }
            };

            let cancel = CancellationToken::new();
            let sync_task =
                HeaderCache::spawn_sync_task(Arc::clone(&cache), config.sync_interval(), cancel.clone());

            info!("Daemon ready. Press Ctrl+C to stop.");

            // Wait for Ctrl+C
            tokio::signal::ctrl_c().await?;

            info!("Received shutdown signal, stopping sync...");
            cancel.cancel();
            if let Err(e) = sync_task.await {
                error!(error = %e, "Sync task panicked");
            }
            cache.close();

            info!("Shutdown complete.");
        }
        Command::Sync { host, port, path } => {
            let cache = HeaderCache::open(&host, port, &path)
                .with_context(|| format!("Failed to open header cache at {:?}", path))?;
            let result = cache.sync().await;
            let total = cache.len();
            cache.close();

            let report = result.with_context(|| format!("Sync from {}:{} failed", host, port))?;
            println!(
                "Applied {} headers, rejected {}, watermark {} ({} stored)",
                report.applied,
                report.rejected,
                report.watermark,
                total?
            );
        }
        Command::List { path, since } => {
            let cache = HeaderCache::open("", DEFAULT_PEER_PORT, &path)
                .with_context(|| format!("Failed to open header store at {}", path))?;
            for header in cache.list_since(since)? {
                println!("{}", header);
            }
            cache.close();
        }
        Command::Prune { path, cutoff } => {
            let cache = HeaderCache::open("", DEFAULT_PEER_PORT, &path)
                .with_context(|| format!("Failed to open header store at {}", path))?;
            let pruned = cache.prune(cutoff)?;
            cache.close();
            println!("Pruned {} headers expiring before {}", pruned, cutoff);
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
