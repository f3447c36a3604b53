// crates/thunder-daemon/src/main.rs
//
// Binary entrypoint for the Thunder daemon.
//
// Parses CLI arguments, loads configuration, initializes tracing, builds the
// admission chain once, and runs the native RPC server and the HTTP gateway
// side by side until ctrl-c.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::DaemonConfig;
use tokio::sync::watch;

use thunder_core::JwtVerifier;
use thunder_rpc::{
    admission_chain, gateway, AuthStage, GatewayState, HandlerRegistry, LimiterRegistry,
    MetadataBridge, RateLimitStage, RpcConfig, ThunderRpcServer,
};

/// Thunder daemon: RPC server and HTTP/GraphQL gateway behind one admission chain.
#[derive(Parser, Debug)]
#[command(name = "thunder-daemon", version = "0.1.0", about = "Thunder RPC gateway daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.thunder/config.toml")]
    config: String,

    /// Override the native RPC port.
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Override the HTTP gateway port.
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    // CLI flags override the config file values.
    if let Some(port) = args.rpc_port {
        daemon_config.rpc_port = port;
    }
    if let Some(port) = args.http_port {
        daemon_config.http_port = port;
    }
    if let Some(level) = args.log_level.clone() {
        daemon_config.log_level = level;
    }

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match &loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            config_path,
            e
        ),
    }

    tracing::info!("Thunder daemon v0.1.0");
    let services = build_services(&daemon_config);
    let rpc_config = services.rpc.config();
    tracing::info!("RPC endpoint: {}:{}", rpc_config.host, rpc_config.port);
    tracing::info!(
        "HTTP gateway: {}:{}",
        daemon_config.rpc_host,
        daemon_config.http_port
    );
    let cleanup = services
        .limiters
        .spawn_cleanup(Duration::from_secs(daemon_config.cleanup_interval_secs.max(1)));

    let http_addr: SocketAddr =
        format!("{}:{}", daemon_config.rpc_host, daemon_config.http_port).parse()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Thunder daemon received shutdown signal"),
            Err(e) => {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    let result = tokio::try_join!(
        services
            .rpc
            .serve_with_shutdown(wait_for_shutdown(shutdown_rx.clone())),
        gateway::serve(http_addr, services.gateway, wait_for_shutdown(shutdown_rx)),
    );
    cleanup.abort();
    result?;

    tracing::info!("Thunder daemon stopped");
    Ok(())
}

/// Everything the daemon serves, built from one configuration.
struct Services {
    rpc: ThunderRpcServer,
    gateway: GatewayState,
    limiters: Arc<LimiterRegistry>,
}

/// Construct the admission chain once and hand it to both front doors.
fn build_services(config: &DaemonConfig) -> Services {
    let limiters = Arc::new(LimiterRegistry::from_settings(&config.rate_limit));

    let secret = config.resolve_jwt_secret();
    if secret.is_empty() {
        tracing::warn!("No JWT secret configured; protected methods will fail with Internal");
    }
    let mut verifier = JwtVerifier::new(secret);
    if let Some(issuer) = &config.jwt_issuer {
        verifier = verifier.with_issuer(issuer);
    }
    let auth = AuthStage::with_exempt(Arc::new(verifier), config.exempt_methods.clone());

    let rate_limit = if config.rate_limit.enabled {
        Some(RateLimitStage::new(Arc::clone(&limiters)))
    } else {
        tracing::warn!("Rate limiting disabled by configuration");
        None
    };

    let chain = admission_chain(rate_limit, auth);
    let handlers = HandlerRegistry::with_builtins();
    tracing::info!(stages = ?chain.names(), methods = ?handlers.methods(), "Admission chain built");

    let rpc_config = RpcConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let rpc = ThunderRpcServer::new(rpc_config, &chain, &handlers);
    let gateway = GatewayState::new(rpc.handler(), MetadataBridge::default());

    Services {
        rpc,
        gateway,
        limiters,
    }
}

/// Resolve once the shutdown flag flips to true. A dropped sender never
/// resolves, so the servers keep running.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Expand a leading `~` in a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &path[1..]);
        }
    }
    path.to_string()
}
