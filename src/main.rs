//! Wallet Bridge
//!
//! Runs the wallet connection coordination layer as a standalone process.
//!
//! # Architecture Overview
//!
//! ```text
//!        ┌──────────────────────────────────────────────────────────────┐
//!        │                        WALLET BRIDGE                         │
//!        │                                                              │
//!        │  ┌───────────┐   ┌───────────┐   ┌────────────────────────┐  │
//!  RPC ──┼─▶│  provider │──▶│ discovery │──▶│ guard (proxy + slot)   │  │
//! nodes  │  │  sources  │   │  poller   │   └───────────┬────────────┘  │
//!        │  └───────────┘   └───────────┘               │               │
//!        │                                              ▼               │
//!        │  ┌───────────┐   ┌────────────┐   ┌────────────────────────┐ │
//! stdin ─┼─▶│  broker   │   │ connection │◀──│ transactions           │ │
//! stdout◀┼──│ (origins) │   │  machine   │   │ (dispatch + receipts)  │ │
//!        │  └───────────┘   └─────┬──────┘   └────────────────────────┘ │
//!        │                        ▼                                     │
//!        │                   event bus ──▶ noise controller             │
//!        │                                                              │
//!        │  config (hot reload) · observability · lifecycle · admin    │
//!        └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! With `--stdio`, stdout carries messages posted to the parent context as
//! JSON lines, and stdin accepts `{"origin": ..., "data": ...}` lines as
//! inbound messages.

use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use wallet_bridge::admin::{self, AdminState};
use wallet_bridge::broker::{ChannelTarget, InboundMessage, MessageTarget};
use wallet_bridge::config::loader::load_config;
use wallet_bridge::config::watcher::ConfigWatcher;
use wallet_bridge::config::BridgeConfig;
use wallet_bridge::discovery::{DiscoveryOutcome, ProviderSource, StaticSource};
use wallet_bridge::lifecycle::{signals, Shutdown};
use wallet_bridge::observability::{logging, metrics};
use wallet_bridge::origin::{self, OriginPolicy};
use wallet_bridge::provider::JsonRpcProvider;
use wallet_bridge::WalletBridge;

#[derive(Parser)]
#[command(name = "wallet-bridge")]
#[command(about = "Wallet connection coordination layer", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/bridge.toml")]
    config: PathBuf,

    /// Exchange broker messages over stdin/stdout.
    #[arg(long)]
    stdio: bool,

    /// Ask the wallet for an account if none is pre-authorized.
    #[arg(long)]
    connect: bool,
}

#[derive(Deserialize)]
struct InboundLine {
    origin: String,
    data: Value,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let config = if config_found {
        load_config(&args.config)?
    } else {
        BridgeConfig::default()
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wallet-bridge starting");
    if !config_found {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut sources: Vec<Arc<dyn ProviderSource>> = Vec::new();
    for source in &config.sources {
        match JsonRpcProvider::new(source) {
            Ok(provider) => sources.push(Arc::new(StaticSource::new(source.name.clone(), Arc::new(provider)))),
            Err(e) => tracing::error!(source = %source.name, error = %e, "Skipping provider source"),
        }
    }
    tracing::info!(sources = sources.len(), "Provider sources configured");

    let (parent, posted) = if args.stdio {
        let (target, rx) = ChannelTarget::new();
        (Some(Arc::new(target) as Arc<dyn MessageTarget>), Some(rx))
    } else {
        (None, None)
    };

    let policy = origin::shared(OriginPolicy::new(&config.origins.allowed));
    let bridge = WalletBridge::with_policy(config.clone(), sources, parent, Arc::clone(&policy));
    let shutdown = Shutdown::new();

    bridge.on_any(|event| {
        tracing::info!(event = event.name(), detail = ?event, "Wallet event");
    });

    // Hot reload of the origin allow-list
    let _watcher = if config_found {
        Some(ConfigWatcher::new(&args.config, config.clone(), Arc::clone(&policy)).run()?)
    } else {
        None
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(config.admin.bind_address.as_str()).await?;
        let state = AdminState::new(Arc::clone(&bridge), &config.admin.api_key);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    if let Some(mut posted) = posted {
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(message) = posted.recv().await {
                let line = serde_json::json!({"targetOrigin": message.target_origin, "data": message.data});
                if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<InboundLine>(&line) {
                    Ok(inbound) => {
                        let disposition = bridge
                            .broker()
                            .handle_inbound(&InboundMessage::new(inbound.origin, inbound.data));
                        tracing::debug!(disposition = ?disposition, "Inbound message handled");
                    }
                    Err(e) => {
                        bridge.report_error(&format!("malformed stdin message: {}", e));
                    }
                }
            }
        });
    }

    match bridge.start().await {
        DiscoveryOutcome::Found(found) => {
            tracing::info!(source = %found.source, attempts = found.attempts, "Provider ready");
            if args.connect && !bridge.get_current_state().is_connected() {
                match bridge.request_connection().await {
                    Ok(state) => tracing::info!(address = ?state.address, "Connection established"),
                    Err(e) => tracing::warn!(error = %e, "Connection request failed"),
                }
            }
        }
        DiscoveryOutcome::NotFound { attempts } => {
            tracing::warn!(attempts = attempts, "Running standalone, no wallet provider");
        }
    }

    signals::shutdown_on_signal(shutdown.clone()).await;
    bridge.teardown();

    tracing::info!("Shutdown complete");
    Ok(())
}
