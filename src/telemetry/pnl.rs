use crate::models::account::AccountState;
use crate::models::opportunity::OpportunityKind;
use crate::models::position::Position;
use crate::models::trade::Trade;
use dashmap::DashMap;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyStats {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_pnl: f64,
    pub open: usize,
    pub unrealized: f64,
}

impl StrategyStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    pub fn avg_pnl(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.total_pnl / self.trades as f64
        }
    }
}

/// Per-strategy P&L breakdown, rebuilt from the ledger and open positions.
pub struct StrategyAnalytics {
    by_kind: DashMap<OpportunityKind, StrategyStats>,
}

impl Default for StrategyAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyAnalytics {
    pub fn new() -> Self {
        Self {
            by_kind: DashMap::new(),
        }
    }

    pub fn rebuild<'a>(
        &self,
        trades: impl IntoIterator<Item = &'a Trade>,
        positions: &[Position],
    ) {
        self.by_kind.clear();
        for trade in trades {
            let mut s = self.by_kind.entry(trade.strategy).or_default();
            s.trades += 1;
            s.total_pnl += trade.profit;
            if trade.profit > 0.0 {
                s.wins += 1;
            } else if trade.profit < 0.0 {
                s.losses += 1;
            }
        }
        for pos in positions {
            let mut s = self.by_kind.entry(pos.strategy).or_default();
            s.open += 1;
            s.unrealized += pos.unrealized_pnl;
        }
    }

    pub fn get(&self, kind: OpportunityKind) -> StrategyStats {
        self.by_kind.get(&kind).map(|s| s.clone()).unwrap_or_default()
    }

    /// Snapshot sorted by strategy kind.
    pub fn snapshot(&self) -> Vec<(OpportunityKind, StrategyStats)> {
        let mut rows: Vec<_> = self
            .by_kind
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rows.sort_by_key(|(k, _)| *k);
        rows
    }

    pub fn log_summary(&self, account: &AccountState, unrealized: f64) {
        info!(
            "=== P&L SUMMARY === mode={} balance=${:.2} total_pnl={:+.2} today={:+.2} unrealized={:+.2} trades={} W/L={}/{} win_rate={:.1}% open={}",
            account.mode,
            account.balance,
            account.total_pnl,
            account.today_pnl,
            unrealized,
            account.total_trades,
            account.wins,
            account.losses,
            account.win_rate() * 100.0,
            account.open_positions,
        );

        for (kind, s) in self.snapshot() {
            info!(
                "  {kind}: trades={} W/L={}/{} pnl={:+.2} avg={:+.3} open={} unrealized={:+.2}",
                s.trades,
                s.wins,
                s.losses,
                s.total_pnl,
                s.avg_pnl(),
                s.open,
                s.unrealized
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Side;
    use crate::models::position::CloseReason;
    use chrono::Utc;

    fn trade(kind: OpportunityKind, profit: f64) -> Trade {
        Trade {
            timestamp: Utc::now(),
            strategy: kind,
            market: "m".into(),
            market_id: "m".into(),
            side: Side::Yes,
            entry_price: 0.5,
            exit_price: 0.5,
            size: 10.0,
            gross_pnl: profit,
            fees: 0.0,
            profit,
            close_reason: CloseReason::TakeProfit,
        }
    }

    #[test]
    fn test_groups_by_strategy() {
        let analytics = StrategyAnalytics::new();
        let trades = vec![
            trade(OpportunityKind::Scalp, 1.0),
            trade(OpportunityKind::Scalp, -0.5),
            trade(OpportunityKind::ComplementArb, 2.0),
        ];
        analytics.rebuild(&trades, &[]);

        let scalp = analytics.get(OpportunityKind::Scalp);
        assert_eq!(scalp.trades, 2);
        assert_eq!(scalp.wins, 1);
        assert!((scalp.avg_pnl() - 0.25).abs() < 1e-9);
        assert!((scalp.win_rate() - 0.5).abs() < 1e-9);

        assert_eq!(analytics.snapshot()[0].0, OpportunityKind::ComplementArb);
        assert_eq!(analytics.get(OpportunityKind::Momentum), StrategyStats::default());
    }
}
