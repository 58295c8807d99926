use crate::config::TelemetryConfig;
use crate::models::account::{AccountState, Mode};
use crate::models::trade::Trade;
use anyhow::Result;
use tracing::{info, warn};

const RULE: &str = "━━━━━━━━━━━━━━━";

/// Sends chat alerts through the backend relay. Delivery is fire-and-forget.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    pub fn enabled(&self) -> bool {
        self.config.alert_url.is_some()
    }

    /// Log and relay a message. Failures are logged and dropped.
    pub async fn send(&self, message: &str) {
        info!("ALERT: {}", message.replace('\n', " | "));

        if let Err(e) = self.relay(message).await {
            warn!("Alert relay failed: {e}");
        }
    }

    async fn relay(&self, message: &str) -> Result<()> {
        let Some(base) = &self.config.alert_url else {
            return Ok(());
        };

        let resp = self
            .http
            .post(format!("{base}/api/telegram/send"))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "relay returned HTTP {}", resp.status());
        Ok(())
    }

    /// Alert for a finished trade. Wins always go out when enabled.
    pub async fn on_close(&self, trade: &Trade, account: &AccountState) {
        if trade.is_win() && self.config.alert_on_win {
            self.send(&format_win(trade, account.mode, account.balance)).await;
        }
    }

    pub async fn on_status(&self, account: &AccountState, unrealized: f64) {
        self.send(&format_status(account, unrealized)).await;
    }
}

fn header(mode: Mode) -> &'static str {
    match mode {
        Mode::Live => "🔴 LIVE",
        Mode::Paper => "🟢 PAPER",
    }
}

fn signed(v: f64) -> String {
    format!("{v:+.2}")
}

fn short_market(name: &str) -> String {
    name.chars().take(25).collect()
}

pub fn format_win(trade: &Trade, mode: Mode, balance: f64) -> String {
    format!(
        "{RULE}\n{} │ WIN 💰\n{RULE}\n✅ +{:.2}$\n📊 {}\n💼 Balance: {:.2}$\n{RULE}",
        header(mode),
        trade.profit,
        short_market(&trade.market),
        balance
    )
}

pub fn format_loss(trade: &Trade, mode: Mode, balance: f64) -> String {
    format!(
        "{RULE}\n{} │ LOSS 📉\n{RULE}\n❌ -{:.2}$\n📊 {}\n💼 Balance: {:.2}$\n{RULE}",
        header(mode),
        trade.profit.abs(),
        short_market(&trade.market),
        balance
    )
}

/// Realized today, unrealized and their sum.
pub fn format_status(account: &AccountState, unrealized: f64) -> String {
    format!(
        "{RULE}\n{} │ STATUS 📈\n{RULE}\n💰 Realized: {}$\n📊 Open: {}$\n📈 Total: {}$\n{RULE}\n💼 Balance: {:.2}$\n🎯 Positions: {}\n📊 Trades: {}\n{RULE}",
        header(account.mode),
        signed(account.today_pnl),
        signed(unrealized),
        signed(account.today_pnl + unrealized),
        account.balance,
        account.open_positions,
        account.today_trades
    )
}

pub fn format_daily(account: &AccountState) -> String {
    format!(
        "{RULE}\n{} │ END OF DAY 🌙\n{RULE}\n💰 P&L: {}$\n📊 {}W / {}L ({:.0}%)\n💼 Balance: {:.2}$\n{RULE}",
        header(account.mode),
        signed(account.total_pnl),
        account.wins,
        account.losses,
        account.win_rate() * 100.0,
        account.balance
    )
}
