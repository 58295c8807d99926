use crate::config::EngineConfig;
use crate::error::{BotError, Result};
use crate::execution::fill_policy::{FillPolicy, VolatilityFill};
use crate::models::account::{AccountState, BotStatus, Mode};
use crate::models::market::{MarketSnapshot, Side};
use crate::models::opportunity::{OpportunityKind, StrategyCode};
use crate::models::position::{CloseReason, OrderStatus, Position};
use crate::models::trade::{Trade, TradeLedger};
use crate::persistence::PersistedState;
use crate::risk::fees::{FeeBreakdown, FeeModel};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A fully priced entry, ready to become a `Pending` position.
#[derive(Debug, Clone)]
pub struct EntryOrder {
    pub market_id: String,
    pub market_slug: String,
    pub question: String,
    pub token_id: Option<String>,
    pub side: Side,
    pub entry_price: f64, // reference space
    pub take_profit: f64,
    pub stop_loss: f64,
    pub size: f64,
    pub max_hold_secs: i64,
    pub strategy: OpportunityKind,
    pub signal: String,
    pub live_order_id: Option<String>,
}

/// What one mark-to-market pass changed.
#[derive(Debug, Clone, Default)]
pub struct MarkReport {
    pub filled: Vec<String>,
    pub cancelled: Vec<String>,
    /// Venue order ids of cancelled live entries, still resting at the venue.
    pub stale_orders: Vec<String>,
    pub closed: Vec<Trade>,
}

impl MarkReport {
    pub fn is_empty(&self) -> bool {
        self.filled.is_empty() && self.cancelled.is_empty() && self.closed.is_empty()
    }
}

/// Owns the open positions, the account and the trade ledger.
///
/// Every balance change goes through here: entries debit the notional,
/// cancellations refund it, closes credit notional plus net P&L.
pub struct PositionManager {
    config: EngineConfig,
    fees: FeeModel,
    fill_policy: Box<dyn FillPolicy>,
    account: AccountState,
    positions: Vec<Position>,
    ledger: TradeLedger,
    // balance + open notional - realized P&L, fixed between closes
    baseline: f64,
}

impl PositionManager {
    pub fn new(config: EngineConfig) -> Self {
        let mut account = AccountState::new(config.initial_balance);
        account.active_strategies = config.active_strategies.clone();

        let mut mgr = Self {
            fees: FeeModel::from_config(&config),
            fill_policy: Box::new(VolatilityFill::from_config(&config)),
            ledger: TradeLedger::new(config.ledger_capacity),
            account,
            positions: Vec::new(),
            baseline: 0.0,
            config,
        };
        mgr.rebase();
        mgr
    }

    pub fn with_fill_policy(mut self, policy: Box<dyn FillPolicy>) -> Self {
        self.fill_policy = policy;
        self
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn has_position(&self, market_id: &str) -> bool {
        self.positions.iter().any(|p| p.market_id == market_id)
    }

    pub fn open_notional(&self) -> f64 {
        self.positions.iter().map(|p| p.size).sum()
    }

    pub fn unrealized_total(&self) -> f64 {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }

    pub fn max_open(&self) -> usize {
        self.config.max_open_positions
    }

    pub fn at_capacity(&self) -> bool {
        self.positions.len() >= self.config.max_open_positions
    }

    /// Conservation check. Stays at zero (within float noise) across opens,
    /// fills, cancellations and closes.
    pub fn balance_drift(&self) -> f64 {
        self.baseline + self.account.total_pnl - self.open_notional() - self.account.balance
    }

    fn rebase(&mut self) {
        self.account.open_positions = self.positions.len();
        self.baseline = self.account.balance + self.open_notional() - self.account.total_pnl;
    }

    /// Commit a new `Pending` position. Re-checks every precondition against
    /// the current state, so a plan built before a stop or a sync merge is
    /// rejected here instead of double-spending.
    pub fn open_position(&mut self, order: EntryOrder, now: DateTime<Utc>) -> Result<Position> {
        if !self.account.is_running() {
            return Err(BotError::Validation("engine is stopped".into()));
        }
        if self.has_position(&order.market_id) {
            return Err(BotError::Validation(format!(
                "already holding market {}",
                order.market_id
            )));
        }
        if self.at_capacity() {
            return Err(BotError::Validation(format!(
                "position limit reached ({})",
                self.config.max_open_positions
            )));
        }
        if !order.size.is_finite() || order.size <= 0.0 {
            return Err(BotError::Validation(format!("bad trade size {}", order.size)));
        }
        if order.size > self.account.balance {
            return Err(BotError::Validation(format!(
                "insufficient balance: need ${:.2}, have ${:.2}",
                order.size, self.account.balance
            )));
        }
        let token_price = order.side.to_reference(order.entry_price);
        if !(token_price > 0.0 && token_price < 1.0) {
            return Err(BotError::Validation(format!(
                "entry price out of range: {:.4}",
                token_price
            )));
        }

        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            market_id: order.market_id,
            market_slug: order.market_slug,
            question: order.question,
            token_id: order.token_id,
            side: order.side,
            entry_price: order.entry_price,
            limit_price: order.entry_price,
            size: order.size,
            order_status: OrderStatus::Pending,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            max_hold_secs: order.max_hold_secs,
            opened_at: now,
            filled_at: None,
            current_price: order.entry_price,
            unrealized_pnl: 0.0,
            strategy: order.strategy,
            signal: order.signal,
            live_order_id: order.live_order_id,
        };

        self.account.balance -= position.size;
        self.positions.push(position.clone());
        self.account.open_positions = self.positions.len();

        info!(
            "OPEN {} {} @ {:.3} size=${:.2} [{}] balance=${:.2}",
            position.side.label(),
            position.market_slug,
            token_price,
            position.size,
            position.strategy,
            self.account.balance
        );
        Ok(position)
    }

    /// Mark every open position against a fresh snapshot list: fill or cancel
    /// pending orders, then apply stop-loss, take-profit and timeout exits in
    /// that order. Positions whose market is absent are carried unchanged.
    pub fn apply_snapshot(&mut self, markets: &[MarketSnapshot], now: DateTime<Utc>) -> MarkReport {
        if self.account.roll_day(now) {
            info!("New trading day {}: daily counters reset", now.date_naive());
        }

        let index: HashMap<&str, &MarketSnapshot> =
            markets.iter().map(|m| (m.id.as_str(), m)).collect();
        let fill_timeout = Duration::seconds(self.config.fill_timeout_secs);

        let mut report = MarkReport::default();
        let mut kept = Vec::with_capacity(self.positions.len());

        for mut pos in std::mem::take(&mut self.positions) {
            let Some(market) = index.get(pos.market_id.as_str()) else {
                kept.push(pos);
                continue;
            };

            if pos.is_pending() {
                if self.fill_policy.should_fill(&pos, market) {
                    pos.order_status = OrderStatus::Filled;
                    pos.filled_at = Some(now);
                    debug!("FILLED {} ({})", pos.market_slug, self.fill_policy.name());
                    report.filled.push(pos.id.clone());
                } else if now - pos.opened_at > fill_timeout {
                    self.account.balance += pos.size;
                    info!(
                        "CANCEL {} unfilled after {}s, refunded ${:.2}",
                        pos.market_slug,
                        pos.age_secs(now),
                        pos.size
                    );
                    report.cancelled.push(pos.id.clone());
                    if let Some(order_id) = pos.live_order_id.take() {
                        report.stale_orders.push(order_id);
                    }
                    continue;
                } else {
                    kept.push(pos);
                    continue;
                }
            }

            let current = pos.side.to_reference(market.ask(pos.side));
            let gross = pos.gross_pnl_at(current);
            let fees = self.fees.settle(pos.size, gross);

            let reason = if pos.stop_hit(current) {
                Some(CloseReason::StopLoss)
            } else if pos.take_profit_hit(current) {
                Some(CloseReason::TakeProfit)
            } else if now - pos.opened_at > Duration::seconds(pos.max_hold_secs) {
                if fees.net > 0.0 {
                    Some(CloseReason::TimeoutWin)
                } else {
                    Some(CloseReason::TimeoutLoss)
                }
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    let trade = self.close(pos, current, gross, fees, reason, now);
                    report.closed.push(trade);
                }
                None => {
                    pos.current_price = current;
                    pos.unrealized_pnl = gross;
                    kept.push(pos);
                }
            }
        }

        self.positions = kept;
        self.account.open_positions = self.positions.len();
        report
    }

    fn close(
        &mut self,
        pos: Position,
        exit: f64,
        gross: f64,
        fees: FeeBreakdown,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Trade {
        self.account.record_close(pos.size + fees.net, fees.net);

        let trade = Trade {
            timestamp: now,
            strategy: pos.strategy,
            market: pos.market_slug,
            market_id: pos.market_id,
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price: exit,
            size: pos.size,
            gross_pnl: gross,
            fees: fees.total(),
            profit: fees.net,
            close_reason: reason,
        };

        info!(
            "CLOSE [{}] {} {} net={:+.2} gross={:+.2} fees={:.2} balance=${:.2}",
            reason,
            trade.side.label(),
            trade.market,
            trade.profit,
            trade.gross_pnl,
            trade.fees,
            self.account.balance
        );

        self.ledger.push(trade.clone());
        trade
    }

    pub fn export_state(&self) -> PersistedState {
        PersistedState {
            account: self.account.clone(),
            positions: self.positions.clone(),
            trades: self.ledger.to_vec(),
        }
    }

    /// Replace all state with a persisted copy. Last write wins.
    pub fn restore(&mut self, state: PersistedState) {
        self.account = state.account;
        self.positions = state.positions;
        self.ledger = TradeLedger::from_trades(state.trades, self.config.ledger_capacity);
        self.rebase();
        info!(
            "State restored: balance=${:.2} positions={} trades={}",
            self.account.balance,
            self.positions.len(),
            self.ledger.len()
        );
    }

    pub fn merge_state(&mut self, state: PersistedState) {
        if (state.account.balance - self.account.balance).abs() > 0.01 {
            debug!(
                "Sync merge moves balance ${:.2} -> ${:.2}",
                self.account.balance, state.account.balance
            );
        }
        self.restore(state);
    }

    /// Back to a fresh paper account. Keeps the starting balance and the
    /// enabled strategies.
    pub fn reset(&mut self) {
        let mut account = AccountState::new(self.account.starting_balance);
        account.active_strategies = std::mem::take(&mut self.account.active_strategies);
        self.account = account;
        self.positions.clear();
        self.ledger.clear();
        self.rebase();
        warn!("Account reset to ${:.2}", self.account.balance);
    }

    /// Switching to paper starts a fresh paper account. Open positions are
    /// carried and their notional stays debited from the new balance.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.account.mode == mode {
            return;
        }
        if mode == Mode::Paper {
            // Fresh paper account. Carried positions stay funded out of it.
            let mut account = AccountState::new(self.config.initial_balance);
            account.status = self.account.status;
            account.trading_day = self.account.trading_day;
            account.active_strategies = std::mem::take(&mut self.account.active_strategies);
            account.balance -= self.open_notional();
            self.account = account;
            self.ledger.clear();
        }
        self.account.mode = mode;
        self.rebase();
        info!("Mode switched to {mode} (balance ${:.2})", self.account.balance);
    }

    pub fn start(&mut self) {
        self.account.status = BotStatus::Running;
    }

    pub fn stop(&mut self) {
        self.account.status = BotStatus::Stopped;
    }

    /// Flip one strategy. Returns whether it is now enabled.
    pub fn toggle_strategy(&mut self, code: StrategyCode) -> bool {
        let set = &mut self.account.active_strategies;
        if set.remove(&code) {
            false
        } else {
            set.insert(code);
            true
        }
    }
}
