use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::market::Side;
use super::opportunity::OpportunityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    TimeoutWin,
    TimeoutLoss,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::StopLoss => "SL",
            CloseReason::TakeProfit => "TP",
            CloseReason::TimeoutWin => "WIN",
            CloseReason::TimeoutLoss => "LOSS",
        };
        f.write_str(s)
    }
}

/// A simulated holding in one outcome token.
///
/// All prices (`entry_price`, `limit_price`, `stop_loss`, `take_profit`,
/// `current_price`) are reference prices in YES-probability space. For a NO
/// holding that is `1 - NO token price`, so P&L runs opposite to the reference
/// price and the stop sits above entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_id: String,
    pub market_slug: String,
    pub question: String,
    pub token_id: Option<String>,
    pub side: Side,
    pub entry_price: f64,
    pub limit_price: f64,
    pub size: f64, // dollar notional committed
    pub order_status: OrderStatus,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_hold_secs: i64,
    pub opened_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub strategy: OpportunityKind,
    pub signal: String,
    pub live_order_id: Option<String>,
}

impl Position {
    /// Price of the held token at entry.
    pub fn entry_token_price(&self) -> f64 {
        self.side.to_reference(self.entry_price)
    }

    pub fn limit_token_price(&self) -> f64 {
        self.side.to_reference(self.limit_price)
    }

    pub fn tokens(&self) -> f64 {
        let px = self.entry_token_price();
        if px <= 0.0 {
            return 0.0;
        }
        self.size / px
    }

    /// Gross P&L if marked at `current` (reference space).
    pub fn gross_pnl_at(&self, current: f64) -> f64 {
        let move_ = match self.side {
            Side::Yes => current - self.entry_price,
            Side::No => self.entry_price - current,
        };
        move_ * self.tokens()
    }

    pub fn stop_hit(&self, current: f64) -> bool {
        match self.side {
            Side::Yes => current <= self.stop_loss,
            Side::No => current >= self.stop_loss,
        }
    }

    pub fn take_profit_hit(&self, current: f64) -> bool {
        match self.side {
            Side::Yes => current >= self.take_profit,
            Side::No => current <= self.take_profit,
        }
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds()
    }

    pub fn is_pending(&self) -> bool {
        self.order_status == OrderStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(side: Side, entry: f64) -> Position {
        let now = Utc::now();
        Position {
            id: "p1".into(),
            market_id: "m1".into(),
            market_slug: "m1".into(),
            question: String::new(),
            token_id: None,
            side,
            entry_price: entry,
            limit_price: entry,
            size: 10.0,
            order_status: OrderStatus::Filled,
            stop_loss: match side {
                Side::Yes => entry * 0.97,
                Side::No => entry * 1.03,
            },
            take_profit: match side {
                Side::Yes => entry + 0.02,
                Side::No => entry - 0.02,
            },
            max_hold_secs: 60,
            opened_at: now,
            filled_at: Some(now),
            current_price: entry,
            unrealized_pnl: 0.0,
            strategy: OpportunityKind::Scalp,
            signal: String::new(),
            live_order_id: None,
        }
    }

    #[test]
    fn test_yes_tokens_and_pnl() {
        let p = make(Side::Yes, 0.40);
        assert!((p.tokens() - 25.0).abs() < 1e-9);
        assert!((p.gross_pnl_at(0.44) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_position_profits_when_yes_falls() {
        // Holding NO bought at 0.60 → reference entry 0.40.
        let p = make(Side::No, 0.40);
        assert!((p.entry_token_price() - 0.60).abs() < 1e-9);
        assert!(p.gross_pnl_at(0.35) > 0.0);
        assert!(p.gross_pnl_at(0.45) < 0.0);
    }

    #[test]
    fn test_exit_thresholds_mirror_by_side() {
        let yes = make(Side::Yes, 0.50);
        assert!(yes.stop_hit(0.48));
        assert!(!yes.stop_hit(0.49));
        assert!(yes.take_profit_hit(0.52));

        let no = make(Side::No, 0.50);
        assert!(no.stop_hit(0.52));
        assert!(!no.stop_hit(0.51));
        assert!(no.take_profit_hit(0.48));
    }
}
