use crate::config::{SyncConfig, SyncRole};
use crate::execution::dispatcher::{Dispatcher, TickOutcome};
use crate::execution::gateway::OrderGateway;
use crate::feeds::history::PriceHistory;
use crate::feeds::markets::MarketClient;
use crate::persistence::StateStore;
use crate::runtime::actor::{EngineHandle, TradeClosed};
use crate::telemetry::alerts::{format_daily, AlertManager};
use crate::telemetry::latency::LatencyTracker;
use crate::telemetry::pnl::StrategyAnalytics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the named periodic tasks and their shared shutdown signal.
pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Run `job` every `period` until shutdown. The first run is immediate.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => job().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Task '{name}' stopped");
        });
        self.tasks.push((name, handle));
    }

    /// Fetch markets, tag history, mark positions and rebuild the queue.
    pub fn spawn_poll(
        &mut self,
        client: Arc<MarketClient>,
        engine: EngineHandle,
        history: PriceHistory,
        limit: usize,
        period: Duration,
    ) {
        let history = Arc::new(tokio::sync::Mutex::new(history));
        self.every("poll", period, move || {
            let client = client.clone();
            let engine = engine.clone();
            let history = history.clone();
            async move {
                match client.fetch_markets(limit).await {
                    Ok(markets) => {
                        let markets = history.lock().await.tag(markets);
                        let count = markets.len();
                        match engine.apply_snapshot(markets).await {
                            Ok(report) => debug!(
                                "Poll: {count} markets, {} filled, {} cancelled, {} closed",
                                report.filled.len(),
                                report.cancelled.len(),
                                report.closed.len()
                            ),
                            Err(e) => warn!("Engine rejected snapshot: {e}"),
                        }
                    }
                    Err(e) => {
                        warn!("Market fetch failed, keeping previous state: {e}");
                        engine.report_error(&e, true).await;
                    }
                }
            }
        });
    }

    /// One entry attempt per tick. Parks while the engine is stopped.
    pub fn spawn_dispatch(&mut self, dispatcher: Dispatcher, engine: EngineHandle, period: Duration) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut status = engine.subscribe();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                let running = status.borrow_and_update().account.is_running();
                if !running {
                    tokio::select! {
                        changed = status.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }

                tokio::select! {
                    _ = interval.tick() => {
                        match dispatcher.tick().await {
                            Ok(TickOutcome::Opened(_)) | Ok(TickOutcome::Idle) => {}
                            Ok(TickOutcome::Dropped(reason)) => debug!("Tick dropped: {reason}"),
                            Err(e) => warn!("Dispatch tick failed ({}): {e}", e.kind()),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Task 'dispatch' stopped");
        });
        self.tasks.push(("dispatch", handle));
    }

    /// Writer pushes state on its interval; reader pulls and merges on its own.
    pub fn spawn_sync(&mut self, store: Arc<dyn StateStore>, engine: EngineHandle, config: &SyncConfig) {
        let key = config.shared_key.clone();
        match config.role {
            SyncRole::Writer => {
                let period = Duration::from_secs(config.writer_interval_secs);
                self.every("sync", period, move || {
                    let store = store.clone();
                    let engine = engine.clone();
                    let key = key.clone();
                    async move {
                        if let Err(e) = push_state(store.as_ref(), &engine, &key).await {
                            warn!("State save to {} failed: {e}", store.name());
                            engine.report_error(&e, false).await;
                        }
                    }
                });
            }
            SyncRole::Reader => {
                let period = Duration::from_secs(config.reader_interval_secs);
                self.every("sync", period, move || {
                    let store = store.clone();
                    let engine = engine.clone();
                    let key = key.clone();
                    async move {
                        match store.load_state(&key).await {
                            Ok(Some(state)) => {
                                if let Err(e) = engine.merge_state(state).await {
                                    warn!("Sync merge failed: {e}");
                                }
                            }
                            Ok(None) => debug!("No shared state under '{key}' yet"),
                            Err(e) => {
                                warn!("State load from {} failed: {e}", store.name());
                                engine.report_error(&e, false).await;
                            }
                        }
                    }
                });
            }
        }
    }

    /// Periodic P&L and latency summaries, status alerts while running, and a
    /// daily summary when the trading day rolls over.
    pub fn spawn_report(
        &mut self,
        engine: EngineHandle,
        alerts: Arc<AlertManager>,
        latency: Arc<LatencyTracker>,
        summary_every: Duration,
        status_every: Duration,
    ) {
        let analytics = Arc::new(StrategyAnalytics::new());
        {
            let engine = engine.clone();
            self.every("report", summary_every, move || {
                let engine = engine.clone();
                let analytics = analytics.clone();
                let latency = latency.clone();
                async move {
                    let (Ok(trades), Ok(positions)) =
                        (engine.recent_trades(usize::MAX).await, engine.positions().await)
                    else {
                        return;
                    };
                    analytics.rebuild(&trades, &positions);
                    let status = engine.status();
                    analytics.log_summary(&status.account, status.unrealized);
                    latency.log_summary();
                }
            });
        }

        let last_day = Arc::new(std::sync::Mutex::new(None));
        self.every("status-alert", status_every, move || {
            let engine = engine.clone();
            let alerts = alerts.clone();
            let last_day = last_day.clone();
            async move {
                let status = engine.status();
                let day = status.account.trading_day;
                let rolled = match last_day.lock() {
                    Ok(mut prev) => {
                        let rolled = prev.is_some() && *prev != day;
                        *prev = day;
                        rolled
                    }
                    Err(_) => false,
                };
                if rolled {
                    alerts.send(&format_daily(&status.account)).await;
                }
                if status.account.is_running() {
                    alerts.on_status(&status.account, status.unrealized).await;
                }
            }
        });
    }

    /// Forward closed trades to the alert relay.
    pub fn spawn_alerts(&mut self, mut events: mpsc::UnboundedReceiver<TradeClosed>, alerts: Arc<AlertManager>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        alerts.on_close(&event.trade, &event.account).await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        self.tasks.push(("alerts", handle));
    }

    /// Cancel venue orders whose local entry timed out unfilled.
    pub fn spawn_cancels(
        &mut self,
        mut stale: mpsc::UnboundedReceiver<String>,
        gateway: Arc<dyn OrderGateway>,
        engine: EngineHandle,
    ) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    order_id = stale.recv() => {
                        let Some(order_id) = order_id else { break };
                        match gateway.cancel_order(&order_id).await {
                            Ok(()) => info!("Cancelled stale venue order {order_id}"),
                            Err(e) => {
                                warn!("Cancel of venue order {order_id} failed ({}): {e}", e.kind());
                                engine.report_error(&e, false).await;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        self.tasks.push(("cancels", handle));
    }

    /// Signal every task and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for (name, task) in self.tasks {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Task '{name}' panicked: {e}"),
                Err(_) => warn!("Task '{name}' did not stop in time"),
            }
        }
        info!("Scheduler stopped");
    }
}

/// Export engine state and save it under `key`.
pub async fn push_state(store: &dyn StateStore, engine: &EngineHandle, key: &str) -> crate::error::Result<()> {
    let state = engine.export_state().await?;
    store.save_state(key, &state).await?;
    debug!("State saved to {} under '{key}'", store.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_every_runs_until_shutdown() {
        let mut scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.every("count", Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(scheduler.task_names(), vec!["count"]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
