use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::market::Side;
use super::opportunity::OpportunityKind;
use super::position::CloseReason;

/// Immutable record of a closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub strategy: OpportunityKind,
    pub market: String,
    pub market_id: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub profit: f64, // net of fees
    pub close_reason: CloseReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

/// Append-only trade history keeping only the most recent `capacity` records.
///
/// Iteration yields newest first.
#[derive(Debug, Clone)]
pub struct TradeLedger {
    trades: VecDeque<Trade>,
    capacity: usize,
}

impl TradeLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from a newest-first list, truncating to capacity.
    pub fn from_trades(trades: Vec<Trade>, capacity: usize) -> Self {
        let mut ledger = Self::new(capacity);
        ledger.trades.extend(trades.into_iter().take(capacity));
        ledger
    }

    pub fn push(&mut self, trade: Trade) {
        if self.capacity == 0 {
            return;
        }
        if self.trades.len() >= self.capacity {
            self.trades.pop_back();
        }
        self.trades.push_front(trade);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter()
    }

    pub fn recent(&self, n: usize) -> Vec<Trade> {
        self.trades.iter().take(n).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<Trade> {
        self.trades.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(profit: f64) -> Trade {
        Trade {
            timestamp: Utc::now(),
            strategy: OpportunityKind::Scalp,
            market: "m".into(),
            market_id: "m".into(),
            side: Side::Yes,
            entry_price: 0.5,
            exit_price: 0.5,
            size: 1.0,
            gross_pnl: profit,
            fees: 0.0,
            profit,
            close_reason: CloseReason::TimeoutWin,
        }
    }

    #[test]
    fn test_ledger_evicts_oldest() {
        let mut ledger = TradeLedger::new(3);
        for i in 0..5 {
            ledger.push(trade(i as f64));
        }
        let profits: Vec<f64> = ledger.iter().map(|t| t.profit).collect();
        assert_eq!(profits, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_from_trades_truncates() {
        let list: Vec<Trade> = (0..10).map(|i| trade(i as f64)).collect();
        let ledger = TradeLedger::from_trades(list, 4);
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.iter().next().unwrap().profit, 0.0);
    }
}
