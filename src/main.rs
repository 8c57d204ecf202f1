//! MARTEN — Martingale Automated Re-entry Trading ENgine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the equity registry from disk (or creates fresh), starts the
//! control surface, and runs the reconcile→submit engine loop with
//! graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use marten::advisor::openai::OpenAiAdvisor;
use marten::advisor::AdvisoryService;
use marten::broker::alpaca::AlpacaClient;
use marten::broker::BrokerGateway;
use marten::config;
use marten::engine::{EngineConfig, EngineLoop};
use marten::registry::EquityRegistry;
use marten::surface::routes::SurfaceState;
use marten::surface::spawn_surface;

const BANNER: &str = r#"
 __  __    _    ____ _____ _____ _   _
|  \/  |  / \  |  _ \_   _| ____| \ | |
| |\/| | / _ \ | |_) || | |  _| |  \| |
| |  | |/ ___ \|  _ < | | | |___| |\  |
|_|  |_/_/   \_\_| \_\|_| |_____|_| \_|

  Martingale Automated Re-entry Trading ENgine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tick_interval_secs = cfg.engine.tick_interval_secs,
        broker = %cfg.broker.provider,
        currency = %cfg.agent.currency,
        "MARTEN starting up"
    );

    // -- Restore state ----------------------------------------------------

    let registry = EquityRegistry::load(Some(&cfg.engine.state_file));
    info!(symbols = registry.len(), "Registry ready");
    let registry = Arc::new(Mutex::new(registry));

    // -- Initialise components --------------------------------------------

    // Broker gateway
    let api_key = std::env::var(&cfg.broker.api_key_env).unwrap_or_default();
    let api_secret = std::env::var(&cfg.broker.api_secret_env).unwrap_or_default();
    if api_key.is_empty() || api_secret.is_empty() {
        warn!(
            key_env = %cfg.broker.api_key_env,
            "Broker credentials not set — broker calls will be rejected upstream"
        );
    }
    let broker: Arc<dyn BrokerGateway> = Arc::new(AlpacaClient::new(
        cfg.broker.trading_url.clone(),
        cfg.broker.data_url.clone(),
        api_key,
        api_secret,
    )?);

    // Advisory service
    let advisor_key = std::env::var(&cfg.advisor.api_key_env).unwrap_or_default();
    if advisor_key.is_empty() {
        warn!("No advisor API key configured — /api/ask will return errors");
    }
    let advisor: Arc<dyn AdvisoryService> = Arc::new(OpenAiAdvisor::new(
        advisor_key,
        Some(cfg.advisor.model.clone()),
        Some(cfg.advisor.max_tokens),
    )?);

    // Control surface (foreground)
    if cfg.surface.enabled {
        spawn_surface(
            Arc::new(SurfaceState {
                registry: Arc::clone(&registry),
                broker: Arc::clone(&broker),
                advisor,
            }),
            cfg.surface.port,
        )?;
    }

    // Engine loop (background)
    let engine = EngineLoop::new(
        Arc::clone(&broker),
        Arc::clone(&registry),
        EngineConfig {
            tick_interval: Duration::from_secs(cfg.engine.tick_interval_secs),
            submit_delay: Duration::from_millis(cfg.engine.submit_delay_ms),
            price_tolerance: cfg.engine.price_tolerance,
            order_qty: cfg.engine.order_qty,
            order_fetch_limit: cfg.engine.order_fetch_limit,
        },
    );

    // -- Run until shutdown ------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(async move { engine.run(shutdown_rx).await });

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    // The engine stops before its next tick and flushes the registry once.
    let _ = shutdown_tx.send(true);
    engine_task.await?;

    info!("MARTEN shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marten=info"));

    let json_logging = std::env::var("MARTEN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
