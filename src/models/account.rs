use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::opportunity::StrategyCode;

pub const DEFAULT_BALANCE: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Paper,
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Paper => f.write_str("paper"),
            Mode::Live => f.write_str("live"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paper" => Ok(Mode::Paper),
            "live" => Ok(Mode::Live),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Running,
    Stopped,
}

/// Account aggregate. The only place balance changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub mode: Mode,
    pub status: BotStatus,
    pub balance: f64,
    pub starting_balance: f64,
    pub total_pnl: f64,
    pub today_pnl: f64,
    pub total_trades: u64,
    pub today_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub open_positions: usize,
    pub active_strategies: BTreeSet<StrategyCode>,
    #[serde(default)]
    pub trading_day: Option<NaiveDate>,
}

impl Default for AccountState {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE)
    }
}

impl AccountState {
    pub fn new(balance: f64) -> Self {
        Self {
            mode: Mode::Paper,
            status: BotStatus::Stopped,
            balance,
            starting_balance: balance,
            total_pnl: 0.0,
            today_pnl: 0.0,
            total_trades: 0,
            today_trades: 0,
            wins: 0,
            losses: 0,
            open_positions: 0,
            active_strategies: BTreeSet::new(),
            trading_day: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == BotStatus::Running
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.total_trades as f64
    }

    /// Reset the `today_*` counters when `now` falls on a new UTC date.
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        match self.trading_day {
            Some(day) if day == today => false,
            Some(_) => {
                self.today_pnl = 0.0;
                self.today_trades = 0;
                self.trading_day = Some(today);
                true
            }
            None => {
                self.trading_day = Some(today);
                false
            }
        }
    }

    /// Book a realized result. `returned` is notional plus net P&L.
    pub fn record_close(&mut self, returned: f64, net: f64) {
        self.balance += returned;
        self.total_pnl += net;
        self.today_pnl += net;
        self.total_trades += 1;
        self.today_trades += 1;
        if net > 0.0 {
            self.wins += 1;
        } else if net < 0.0 {
            self.losses += 1;
        }
    }

    pub fn daily_return_pct(&self) -> f64 {
        if self.starting_balance == 0.0 {
            return 0.0;
        }
        self.today_pnl / self.starting_balance * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_close_counts() {
        let mut acct = AccountState::new(100.0);
        acct.record_close(10.5, 0.5);
        acct.record_close(9.0, -1.0);
        acct.record_close(5.0, 0.0);
        assert_eq!(acct.total_trades, 3);
        assert_eq!(acct.wins, 1);
        assert_eq!(acct.losses, 1);
        assert!((acct.balance - 124.5).abs() < 1e-9);
    }

    #[test]
    fn test_roll_day_resets_today_counters() {
        let mut acct = AccountState::new(100.0);
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap();
        assert!(!acct.roll_day(day1));
        acct.record_close(11.0, 1.0);
        assert!(!acct.roll_day(day1));
        assert_eq!(acct.today_trades, 1);
        assert!(acct.roll_day(day2));
        assert_eq!(acct.today_trades, 0);
        assert_eq!(acct.today_pnl, 0.0);
        assert_eq!(acct.total_trades, 1);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("LIVE".parse::<Mode>().unwrap(), Mode::Live);
        assert!("demo".parse::<Mode>().is_err());
    }
}
