use polybot::config::{parse_strategies, Config, SyncRole};
use polybot::execution::dispatcher::Dispatcher;
use polybot::execution::gateway::{BackendClient, OrderGateway};
use polybot::feeds::history::PriceHistory;
use polybot::feeds::markets::MarketClient;
use polybot::models::account::Mode;
use polybot::persistence::local::LocalStore;
use polybot::persistence::remote::RemoteStore;
use polybot::persistence::{PersistedState, StateStore};
use polybot::risk::position_manager::PositionManager;
use polybot::runtime::actor::EngineActor;
use polybot::runtime::scheduler::{push_state, Scheduler};
use polybot::strategies::orchestrator::StrategyOrchestrator;
use polybot::telemetry::alerts::AlertManager;
use polybot::telemetry::latency::LatencyTracker;
use polybot::telemetry::pnl::StrategyAnalytics;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "polybot", version, about = "Prediction market paper/live trading engine")]
struct Args {
    /// paper | live
    #[arg(long)]
    mode: Option<Mode>,

    /// writer | reader (sync role)
    #[arg(long)]
    role: Option<SyncRole>,

    /// Directory for account.json, positions.json and trades.json
    #[arg(long)]
    data_dir: Option<String>,

    /// Start trading immediately
    #[arg(long)]
    start: bool,

    /// Enabled strategies, e.g. "A,B,C"
    #[arg(long)]
    strategies: Option<String>,
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Local files first, then the remote store.
async fn load_saved_state(
    local: &LocalStore,
    remote: Option<&RemoteStore>,
    key: &str,
) -> Option<PersistedState> {
    match local.load_state(key).await {
        Ok(Some(state)) => {
            info!("Loaded state from {}", local.dir().display());
            return Some(state);
        }
        Ok(None) => {}
        Err(e) => warn!("Local state unreadable: {e}"),
    }

    let remote = remote?;
    match remote.load_state(key).await {
        Ok(Some(state)) => {
            info!("Loaded shared state '{key}' from remote store");
            Some(state)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Remote state unavailable: {e}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default();
    if let Some(role) = args.role {
        config.sync.role = role;
    }
    if let Some(dir) = &args.data_dir {
        config.sync.data_dir = dir.clone();
    }
    let cli_strategies = args.strategies.as_deref().map(parse_strategies);
    if let Some(set) = &cli_strategies {
        config.engine.active_strategies = set.clone();
    }

    init_tracing(&config.telemetry.log_level, config.telemetry.json_logs);

    info!("================================================");
    info!("  POLYBOT prediction market engine v{}", env!("CARGO_PKG_VERSION"));
    info!("  Paper-first, heuristic opportunity scanner");
    info!("================================================");

    if let Err(e) = config.validate() {
        error!("Config validation failed: {e}");
        return Err(e);
    }

    info!("--- Engine configuration ---");
    info!("  Market API:      {}", config.api.market_api_host);
    info!("  Backend:         {}", config.api.backend_host);
    info!("  Poll interval:   {}s", config.api.poll_interval_secs);
    info!("  Dispatch:        {}ms", config.dispatch.interval_ms);
    info!("  Max positions:   {}", config.engine.max_open_positions);
    info!("  Max per trade:   {}%", config.dispatch.max_position_fraction * 100.0);
    info!("  Stop loss:       {}%", config.dispatch.stop_loss_pct * 100.0);
    info!("  Max hold:        {}s", config.dispatch.max_hold_secs);
    info!("  Fill timeout:    {}s", config.engine.fill_timeout_secs);
    info!("  Sync role:       {:?} key={}", config.sync.role, config.sync.shared_key);
    info!("  Remote store:    {}", config.sync.remote_url.as_deref().unwrap_or("disabled"));
    info!("  Alerts:          {}", config.telemetry.alert_url.as_deref().unwrap_or("log only"));

    // === Initialize components ===

    let latency = Arc::new(LatencyTracker::new(500));
    let market_client = Arc::new(MarketClient::new(&config.api)?.with_latency(latency.clone()));
    let backend = Arc::new(BackendClient::new(&config.api)?);
    let alerts = Arc::new(AlertManager::new(config.telemetry.clone()));

    let local = LocalStore::new(&config.sync.data_dir);
    let remote = RemoteStore::from_config(&config.sync)?.map(Arc::new);
    let key = config.sync.shared_key.clone();

    let mut manager = PositionManager::new(config.engine.clone());
    match load_saved_state(&local, remote.as_deref(), &key).await {
        Some(mut state) => {
            if let Some(set) = &cli_strategies {
                state.account.active_strategies = set.clone();
            }
            manager.restore(state);
        }
        None => info!(
            "No saved state, starting fresh with ${:.2}",
            config.engine.initial_balance
        ),
    }
    if let Some(mode) = args.mode {
        manager.set_mode(mode);
    }
    if args.start {
        manager.start();
    }

    let account = manager.account().clone();
    let strategies: Vec<String> = account.active_strategies.iter().map(|c| c.to_string()).collect();
    info!(
        "Account: mode={} status={:?} balance=${:.2} open={} strategies=[{}]",
        account.mode,
        account.status,
        account.balance,
        account.open_positions,
        strategies.join(",")
    );

    if account.mode == Mode::Live {
        match backend.health().await {
            Ok(true) => {}
            Ok(false) | Err(_) => warn!("Trading backend is not healthy, live orders will fail"),
        }
        match backend.wallet().await {
            Ok(wallet) => {
                info!(
                    "Wallet {}: ${:.2} USDC, {:.4} MATIC",
                    wallet.address, wallet.usdc_balance, wallet.matic_balance
                );
                if !wallet.can_pay_gas() {
                    warn!("Wallet has no gas, live orders will be rejected");
                }
            }
            Err(e) => warn!("Wallet query failed: {e}"),
        }
        match backend.open_orders().await {
            Ok(orders) if !orders.is_empty() => info!("{} open orders at venue", orders.len()),
            Ok(_) => {}
            Err(e) => warn!("Open order query failed: {e}"),
        }
    }

    let is_writer = config.sync.role == SyncRole::Writer;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (stale_tx, stale_rx) = mpsc::unbounded_channel();
    let mut actor = EngineActor::new(
        manager,
        StrategyOrchestrator::new(config.detectors.clone()),
        config.dispatch.clone(),
    )
    .with_local_store(local.clone())
    .with_events(events_tx);
    // Only the writer owns venue orders.
    if is_writer {
        actor = actor.with_order_cancels(stale_tx);
    }
    let (engine, engine_task) = actor.spawn();

    // === Start periodic tasks ===

    let mut scheduler = Scheduler::new();
    scheduler.spawn_poll(
        market_client.clone(),
        engine.clone(),
        PriceHistory::new(config.detectors.history_len),
        config.api.market_limit,
        Duration::from_secs(config.api.poll_interval_secs),
    );

    if is_writer {
        let gateway: Arc<dyn OrderGateway> = backend.clone();
        let dispatcher = Dispatcher::new(engine.clone(), config.dispatch.clone())
            .with_books(market_client.clone())
            .with_gateway(gateway.clone());
        scheduler.spawn_cancels(stale_rx, gateway, engine.clone());
        scheduler.spawn_dispatch(
            dispatcher,
            engine.clone(),
            Duration::from_millis(config.dispatch.interval_ms),
        );
    } else {
        info!("Reader role: mirroring shared state, no order entry");
    }

    if let Some(remote) = &remote {
        let store: Arc<dyn StateStore> = remote.clone();
        scheduler.spawn_sync(store, engine.clone(), &config.sync);
    }

    scheduler.spawn_report(
        engine.clone(),
        alerts.clone(),
        latency.clone(),
        Duration::from_secs(config.telemetry.summary_interval_secs),
        Duration::from_secs(config.telemetry.status_interval_secs),
    );
    scheduler.spawn_alerts(events_rx, alerts.clone());

    info!("=== POLYBOT running: {} ===", scheduler.task_names().join(", "));
    info!("Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Cleaning up...");
    scheduler.shutdown().await;

    if is_writer {
        if let Err(e) = push_state(&local, &engine, &key).await {
            error!("Final local save failed: {e}");
        }
        if let Some(remote) = &remote {
            if let Err(e) = push_state(&**remote, &engine, &key).await {
                error!("Final remote save failed: {e}");
            }
        }
    }

    // Final P&L summary
    let status = engine.status();
    let analytics = StrategyAnalytics::new();
    if let (Ok(trades), Ok(positions)) =
        (engine.recent_trades(usize::MAX).await, engine.positions().await)
    {
        analytics.rebuild(&trades, &positions);
    }
    analytics.log_summary(&status.account, status.unrealized);
    latency.log_summary();
    info!(
        "Final: balance=${:.2} total P&L=${:+.2} trades={} open={}",
        status.account.balance,
        status.account.total_pnl,
        status.account.total_trades,
        status.account.open_positions
    );

    drop(engine);
    if tokio::time::timeout(Duration::from_secs(5), engine_task).await.is_err() {
        warn!("Engine actor did not stop in time");
    }
    info!("POLYBOT shutdown complete.");
    Ok(())
}
