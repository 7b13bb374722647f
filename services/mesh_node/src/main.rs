//! Mesh peer entry point

use anyhow::{Context, Result};
use clap::Parser;
use mesh::{rest, App, MemoryService, MicroService};
use mesh_config::MeshConfig;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "mesh=info,mesh_node=info,warn";
const DEBUG_LOG_FILTER: &str = "mesh=debug,mesh_node=debug,network=debug,codec=debug,warn";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Namespace scoping exchange, queues and routing keys
    #[arg(long)]
    namespace: Option<String>,

    /// Service name other peers route RPC calls to
    #[arg(long)]
    service: Option<String>,

    /// Broker url (`amqp://...` or `memory://<name>`)
    #[arg(long)]
    url: Option<String>,

    /// Announce local services and answer RPC calls
    #[arg(long)]
    publish: bool,

    /// Install facades for services published by other peers
    #[arg(long)]
    register: bool,

    /// Serve local services over REST on this port
    #[arg(long)]
    http_port: Option<u16>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Debug logging for the mesh crates
    #[arg(long)]
    debug: bool,

    /// Mount an in-memory data service at this path
    #[arg(long)]
    demo_path: Option<String>,
}

impl Args {
    /// Command line flags on top of file and environment configuration
    fn apply(&self, config: &mut MeshConfig) {
        if let Some(namespace) = &self.namespace {
            config.namespace = Some(namespace.clone());
        }
        if let Some(service) = &self.service {
            config.service = Some(service.clone());
        }
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        config.publish |= self.publish;
        config.register |= self.register;
        config.debug |= self.debug;
    }
}

/// `--log-level` first, then `debug` from config, then RUST_LOG
fn log_filter(args: &Args, config: &MeshConfig) -> EnvFilter {
    if let Some(level) = &args.log_level {
        return EnvFilter::new(level);
    }
    if config.debug {
        return EnvFilter::new(DEBUG_LOG_FILTER);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing(args: &Args, config: &MeshConfig) {
    let registry = tracing_subscriber::registry().with(log_filter(args, config));
    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = MeshConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    init_tracing(&args, &config);

    info!("Starting mesh node");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let app = App::new();
    if let Some(path) = &args.demo_path {
        app.use_service(path, Arc::new(MemoryService::with_records([json!({"id": "0", "name": "One"})])));
    }

    let header = config.http.internal_request_header.clone();
    let peer = MicroService::init(app.clone(), config)
        .await
        .context("Failed to join mesh")?;

    let server = match args.http_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!(%addr, "Serving local services over REST");
            let router = rest::router(Arc::clone(&app), &header);
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    error!("REST server error: {}", e);
                }
            }))
        }
        None => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Shutdown signal received");

    if let Some(server) = server {
        server.abort();
    }
    peer.shutdown().await?;
    Ok(())
}
