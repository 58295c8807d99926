use crate::config::DispatchConfig;
use crate::error::{BotError, Result};
use crate::models::account::{AccountState, Mode};
use crate::models::market::{MarketSnapshot, Side};
use crate::models::opportunity::{Opportunity, StrategyCode};
use crate::models::position::Position;
use crate::models::trade::Trade;
use crate::persistence::local::LocalStore;
use crate::persistence::{PersistedState, StateStore};
use crate::risk::position_manager::{EntryOrder, MarkReport, PositionManager};
use crate::risk::sizing::Sizing;
use crate::strategies::orchestrator::StrategyOrchestrator;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the dispatcher should try this tick, read from live state.
#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub opportunity: Opportunity,
    pub side: Side,
    pub size: f64,
    pub mode: Mode,
}

/// Published after every command.
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub account: AccountState,
    pub queue_len: usize,
    pub unrealized: f64,
    pub degraded: bool,
    pub last_error: Option<String>,
}

/// A close worth telling someone about.
#[derive(Debug, Clone)]
pub struct TradeClosed {
    pub trade: Trade,
    pub account: AccountState,
}

enum Command {
    ApplySnapshot {
        markets: Vec<MarketSnapshot>,
        now: DateTime<Utc>,
        reply: oneshot::Sender<MarkReport>,
    },
    ReportError {
        message: String,
        degraded: bool,
    },
    PlanEntry {
        reply: oneshot::Sender<Option<EntryPlan>>,
    },
    CommitEntry {
        order: EntryOrder,
        reply: oneshot::Sender<Result<Position>>,
    },
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    ToggleStrategy {
        code: StrategyCode,
        reply: oneshot::Sender<bool>,
    },
    SetMode {
        mode: Mode,
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Export {
        reply: oneshot::Sender<PersistedState>,
    },
    Merge {
        state: PersistedState,
        reply: oneshot::Sender<()>,
    },
    Positions {
        reply: oneshot::Sender<Vec<Position>>,
    },
    Trades {
        limit: usize,
        reply: oneshot::Sender<Vec<Trade>>,
    },
    Queue {
        reply: oneshot::Sender<Vec<Opportunity>>,
    },
}

/// Single owner of all mutable engine state. Commands run one at a time, so
/// a mark-to-market pass is never observed half done.
pub struct EngineActor {
    manager: PositionManager,
    orchestrator: StrategyOrchestrator,
    dispatch: DispatchConfig,
    queue: Vec<Opportunity>,
    degraded: bool,
    last_error: Option<String>,
    local: Option<LocalStore>,
    events: Option<mpsc::UnboundedSender<TradeClosed>>,
    stale_orders: Option<mpsc::UnboundedSender<String>>,
    status_tx: watch::Sender<EngineStatus>,
}

impl EngineActor {
    pub fn new(
        manager: PositionManager,
        orchestrator: StrategyOrchestrator,
        dispatch: DispatchConfig,
    ) -> Self {
        let mut actor = Self {
            manager,
            orchestrator,
            dispatch,
            queue: Vec::new(),
            degraded: false,
            last_error: None,
            local: None,
            events: None,
            stale_orders: None,
            status_tx: watch::channel(EngineStatus::default()).0,
        };
        actor.publish();
        actor
    }

    /// Write state files after every change.
    pub fn with_local_store(mut self, store: LocalStore) -> Self {
        self.local = Some(store);
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<TradeClosed>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Venue order ids that must be cancelled after a local fill timeout.
    pub fn with_order_cancels(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.stale_orders = Some(tx);
        self
    }

    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let status_rx = self.status_tx.subscribe();
        let task = tokio::spawn(self.run(rx));
        (
            EngineHandle {
                tx,
                status: status_rx,
            },
            task,
        )
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            account: self.manager.account().clone(),
            queue_len: self.queue.len(),
            unrealized: self.manager.unrealized_total(),
            degraded: self.degraded,
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        debug!("Engine actor stopped: all handles dropped");
    }

    /// Persist when state changed, then publish status. Runs before the
    /// caller gets its reply.
    async fn settle(&self, changed: bool) {
        if changed {
            self.persist().await;
        }
        self.publish();
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::ApplySnapshot {
                markets,
                now,
                reply,
            } => {
                let report = self.manager.apply_snapshot(&markets, now);
                self.queue = self
                    .orchestrator
                    .evaluate(&markets, &self.manager.account().active_strategies);
                self.degraded = false;

                for trade in &report.closed {
                    self.emit(trade);
                }
                if let Some(tx) = &self.stale_orders {
                    for order_id in &report.stale_orders {
                        let _ = tx.send(order_id.clone());
                    }
                }
                self.settle(!report.is_empty()).await;
                let _ = reply.send(report);
            }
            Command::ReportError { message, degraded } => {
                if degraded {
                    self.degraded = true;
                }
                self.last_error = Some(message);
                self.settle(false).await;
            }
            Command::PlanEntry { reply } => {
                let _ = reply.send(self.plan_entry());
            }
            Command::CommitEntry { order, reply } => {
                let result = self.manager.open_position(order, Utc::now());
                if let Err(e) = &result {
                    debug!("Entry rejected at commit: {e}");
                }
                self.settle(result.is_ok()).await;
                let _ = reply.send(result);
            }
            Command::Start { reply } => {
                self.manager.start();
                info!("Engine started");
                self.settle(true).await;
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                self.manager.stop();
                info!("Engine stopped");
                self.settle(true).await;
                let _ = reply.send(());
            }
            Command::ToggleStrategy { code, reply } => {
                let enabled = self.manager.toggle_strategy(code);
                info!("Strategy {code} {}", if enabled { "enabled" } else { "disabled" });
                self.settle(true).await;
                let _ = reply.send(enabled);
            }
            Command::SetMode { mode, reply } => {
                self.manager.set_mode(mode);
                self.settle(true).await;
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                self.manager.reset();
                self.queue.clear();
                self.settle(true).await;
                let _ = reply.send(());
            }
            Command::Export { reply } => {
                let _ = reply.send(self.manager.export_state());
            }
            Command::Merge { state, reply } => {
                self.manager.merge_state(state);
                self.settle(true).await;
                let _ = reply.send(());
            }
            Command::Positions { reply } => {
                let _ = reply.send(self.manager.positions().to_vec());
            }
            Command::Trades { limit, reply } => {
                let _ = reply.send(self.manager.ledger().recent(limit));
            }
            Command::Queue { reply } => {
                let _ = reply.send(self.queue.clone());
            }
        }
    }

    fn plan_entry(&self) -> Option<EntryPlan> {
        let account = self.manager.account();
        if !account.is_running() || account.active_strategies.is_empty() {
            return None;
        }
        if self.manager.at_capacity() {
            debug!("Position limit reached ({})", self.manager.max_open());
            return None;
        }

        let (opportunity, side) = self.queue.iter().find_map(|opp| {
            let side = opp.action.entry_side(&opp.market)?;
            if self.manager.has_position(&opp.market.id) {
                return None;
            }
            Some((opp, side))
        })?;

        let size = Sizing::for_opportunity(account.balance, opportunity, &self.dispatch);
        if size < self.dispatch.min_trade_size {
            debug!("Trade size ${size:.4} below minimum, skipping tick");
            return None;
        }

        Some(EntryPlan {
            opportunity: opportunity.clone(),
            side,
            size,
            mode: account.mode,
        })
    }

    fn emit(&self, trade: &Trade) {
        if let Some(tx) = &self.events {
            let _ = tx.send(TradeClosed {
                trade: trade.clone(),
                account: self.manager.account().clone(),
            });
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.local else {
            return;
        };
        if let Err(e) = store.save_state("", &self.manager.export_state()).await {
            warn!("Local state write failed: {e}");
        }
    }
}

/// Cloneable front door to the engine actor.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| BotError::EngineClosed)?;
        rx.await.map_err(|_| BotError::EngineClosed)
    }

    pub async fn apply_snapshot(&self, markets: Vec<MarketSnapshot>) -> Result<MarkReport> {
        self.apply_snapshot_at(markets, Utc::now()).await
    }

    pub async fn apply_snapshot_at(
        &self,
        markets: Vec<MarketSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<MarkReport> {
        self.request(|reply| Command::ApplySnapshot {
            markets,
            now,
            reply,
        })
        .await
    }

    /// Record an error on the status surface. `degraded` marks lost market
    /// connectivity until the next good snapshot.
    pub async fn report_error(&self, error: &BotError, degraded: bool) {
        let cmd = Command::ReportError {
            message: format!("{} ({})", error, error.kind()),
            degraded,
        };
        if self.tx.send(cmd).await.is_err() {
            warn!("Engine gone, dropping error report: {error}");
        }
    }

    pub async fn plan_entry(&self) -> Result<Option<EntryPlan>> {
        self.request(|reply| Command::PlanEntry { reply }).await
    }

    pub async fn commit_entry(&self, order: EntryOrder) -> Result<Position> {
        self.request(|reply| Command::CommitEntry { order, reply })
            .await?
    }

    pub async fn start(&self) -> Result<()> {
        self.request(|reply| Command::Start { reply }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn toggle_strategy(&self, code: StrategyCode) -> Result<bool> {
        self.request(|reply| Command::ToggleStrategy { code, reply })
            .await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        self.request(|reply| Command::SetMode { mode, reply }).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn export_state(&self) -> Result<PersistedState> {
        self.request(|reply| Command::Export { reply }).await
    }

    pub async fn merge_state(&self, state: PersistedState) -> Result<()> {
        self.request(|reply| Command::Merge { state, reply }).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>> {
        self.request(|reply| Command::Positions { reply }).await
    }

    pub async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>> {
        self.request(|reply| Command::Trades { limit, reply }).await
    }

    pub async fn queue(&self) -> Result<Vec<Opportunity>> {
        self.request(|reply| Command::Queue { reply }).await
    }

    /// Latest published status. Never blocks.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }
}
