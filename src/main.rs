//! `mrim-gateway` binary: MRIM server, redirector and SOCKS5 gateway in one process.
//!
//! Configuration comes from the TOML file named by `MRIM_CONFIG` (defaults otherwise) with
//! `MRIM_*` environment overrides on top. `MRIM_ACCOUNTS` seeds the in-memory store with
//! `login:password` pairs separated by commas.

use std::sync::Arc;
use std::time::Duration;

use mrim_gateway::config::GatewayConfig;
use mrim_gateway::engine::{ConnectionHandler, Server, ServerLimits};
use mrim_gateway::error::{ProtocolError, Result};
use mrim_gateway::mrim::{MrimContext, MrimHandler};
use mrim_gateway::redirector::Redirector;
use mrim_gateway::socks::{gateway, SocksRoutes};
use mrim_gateway::store::MemoryStore;
use mrim_gateway::utils::logging::init_logging;
use mrim_gateway::utils::metrics::{global_metrics, init_metrics};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const METRICS_INTERVAL: Duration = Duration::from_secs(300);

fn load_config() -> Result<GatewayConfig> {
    let config = match std::env::var("MRIM_CONFIG") {
        Ok(path) => GatewayConfig::from_file(path)?,
        Err(_) => GatewayConfig::default(),
    };
    let config = config.with_env_overrides()?;
    config.validate_strict()?;
    Ok(config)
}

async fn seed_accounts(store: &MemoryStore) -> Result<usize> {
    let Ok(raw) = std::env::var("MRIM_ACCOUNTS") else {
        return Ok(0);
    };
    let mut seeded = 0;
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (login, password) = pair.split_once(':').ok_or_else(|| {
            ProtocolError::ConfigError(format!("MRIM_ACCOUNTS entry is not login:password: '{pair}'"))
        })?;
        let nickname = login.split('@').next().unwrap_or(login);
        store.add_user(login, password, nickname).await?;
        seeded += 1;
    }
    Ok(seeded)
}

async fn run() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;
    init_metrics();

    let store = Arc::new(MemoryStore::new());
    match seed_accounts(&store).await? {
        0 => warn!("User store is empty; set MRIM_ACCOUNTS to create accounts"),
        seeded => info!(accounts = seeded, "User store seeded"),
    }

    let limits = ServerLimits {
        max_connections: config.server.max_connections,
        idle_timeout: config.server.idle_timeout,
        shutdown_timeout: config.server.shutdown_timeout,
    };

    let ctx = MrimContext::new(store, config.mrim.clone());
    let mrim: Arc<dyn ConnectionHandler> = Arc::new(MrimHandler::new(
        ctx,
        config.server.max_payload_size,
        config.server.idle_timeout,
    ));
    let mrim_server = Server::bind("mrim", &config.server.mrim_address, Arc::clone(&mrim), limits).await?;
    let mrim_port = mrim_server.local_addr()?.port();

    let redirector: Arc<dyn ConnectionHandler> =
        Arc::new(Redirector::new(&config.server.advertised_host, mrim_port));
    let redirector_server = Server::bind(
        "redirector",
        &config.server.redirector_address,
        Arc::clone(&redirector),
        limits,
    )
    .await?;

    let socks = Arc::new(gateway(SocksRoutes::new(&config.socks, mrim, redirector)));
    let socks_limits = ServerLimits {
        idle_timeout: config.socks.negotiation_timeout,
        ..limits
    };
    let socks_server = Server::bind("socks5", &config.server.socks_address, socks, socks_limits).await?;

    let (mrim_tx, mrim_rx) = mpsc::channel(1);
    let (redirector_tx, redirector_rx) = mpsc::channel(1);
    let (socks_tx, socks_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        for tx in [mrim_tx, redirector_tx, socks_tx] {
            let _ = tx.send(()).await;
        }
    });

    let reporter = tokio::spawn(async {
        let mut ticker = tokio::time::interval(METRICS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            global_metrics().log_metrics();
        }
    });

    let (mrim_done, redirector_done, socks_done) = tokio::join!(
        mrim_server.run(mrim_rx),
        redirector_server.run(redirector_rx),
        socks_server.run(socks_rx),
    );
    reporter.abort();
    global_metrics().log_metrics();

    mrim_done?;
    redirector_done?;
    socks_done?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("mrim-gateway: {e}");
        std::process::exit(1);
    }
}
