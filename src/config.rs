use crate::models::opportunity::StrategyCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub dispatch: DispatchConfig,
    pub detectors: DetectorConfig,
    pub sync: SyncConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub market_api_host: String,
    pub backend_host: String,
    pub market_limit: usize,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_balance: f64,
    pub fill_timeout_secs: i64,
    pub fill_tolerance: f64,     // PENDING fills when ask <= limit * (1 + tolerance)
    pub fill_epsilon: f64,       // ... or when |ask - entry| exceeds this
    pub trading_fee_rate: f64,   // charged on notional, once per side
    pub profit_fee_rate: f64,    // charged on positive gross only
    pub ledger_capacity: usize,
    pub max_open_positions: usize,
    pub active_strategies: BTreeSet<StrategyCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub interval_ms: u64,
    pub default_position_fraction: f64,
    pub max_position_fraction: f64,
    pub min_trade_size: f64,
    pub stop_loss_pct: f64,
    pub max_hold_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub arbitrage: ArbitrageConfig,
    pub extreme: ExtremePriceConfig,
    pub momentum: MomentumConfig,
    pub max_queue: usize,
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    pub floor: f64,        // sums at or below this are treated as bad data
    pub lower: f64,        // BuyBoth when floor < sum < lower
    pub upper: f64,        // SellBoth when upper < sum < ceiling
    pub ceiling: f64,
    pub position_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtremePriceConfig {
    pub threshold: f64,
    pub volume_floor: f64,
    pub position_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    pub delta_threshold: f64,
    pub min_volume: f64,
    pub volume_threshold: f64,    // raw-volume rule when no previous snapshot
    pub spike_min_volume: f64,
    pub spike_ratio: f64,
    pub history_min_points: usize,
    pub history_momentum: f64,
    pub max_volatility: f64,
    pub position_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRole {
    Writer,
    Reader,
}

impl std::str::FromStr for SyncRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "writer" | "admin" => Ok(SyncRole::Writer),
            "reader" | "viewer" => Ok(SyncRole::Reader),
            other => Err(format!("unknown sync role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub role: SyncRole,
    pub shared_key: String,
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub writer_interval_secs: u64,
    pub reader_interval_secs: u64,
    pub remote_trade_limit: usize,
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub alert_url: Option<String>,
    pub alert_on_win: bool,
    pub status_interval_secs: u64,
    pub summary_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 300.0,
            fill_timeout_secs: 120,
            fill_tolerance: 0.005,
            fill_epsilon: 0.001,
            trading_fee_rate: 0.005,
            profit_fee_rate: 0.02,
            ledger_capacity: 100,
            max_open_positions: 25,
            active_strategies: BTreeSet::new(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            default_position_fraction: 0.05,
            max_position_fraction: 0.10,
            min_trade_size: 0.01,
            stop_loss_pct: 0.03,
            max_hold_secs: 60,
        }
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            floor: 0.8,
            lower: 0.995,
            upper: 1.015,
            ceiling: 1.2,
            position_size: 0.05,
        }
    }
}

impl Default for ExtremePriceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.10,
            volume_floor: 10_000.0,
            position_size: 0.08,
        }
    }
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            delta_threshold: 0.005,
            min_volume: 5_000.0,
            volume_threshold: 100_000.0,
            spike_min_volume: 50_000.0,
            spike_ratio: 0.10,
            history_min_points: 6,
            history_momentum: 0.02,
            max_volatility: 0.1,
            position_size: 0.01,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            arbitrage: ArbitrageConfig::default(),
            extreme: ExtremePriceConfig::default(),
            momentum: MomentumConfig::default(),
            max_queue: 50,
            history_len: 20,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            role: SyncRole::Writer,
            shared_key: "polybot_shared".into(),
            remote_url: None,
            remote_api_key: None,
            writer_interval_secs: 30,
            reader_interval_secs: 10,
            remote_trade_limit: 50,
            data_dir: "data".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                market_api_host: "http://localhost:3001".into(),
                backend_host: "http://localhost:3002".into(),
                market_limit: 100,
                poll_interval_secs: 5,
                request_timeout_secs: 10,
            },
            engine: EngineConfig::default(),
            dispatch: DispatchConfig::default(),
            detectors: DetectorConfig::default(),
            sync: SyncConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                json_logs: false,
                alert_url: None,
                alert_on_win: true,
                status_interval_secs: 300,
                summary_interval_secs: 30,
            },
        }
    }
}

/// Parse a comma separated list like "A,C" into strategy codes, skipping junk.
pub fn parse_strategies(raw: &str) -> BTreeSet<StrategyCode> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<StrategyCode>().ok())
        .collect()
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   MARKET_API_URL: market data proxy (markets + order books)
    ///   BACKEND_URL: signing backend for live orders and wallet queries
    ///   STARTING_BALANCE: paper balance (default: 300)
    ///   ACTIVE_STRATEGIES: e.g. "A,B,C" (default: none)
    ///   SYNC_ROLE: writer | reader (default: writer)
    ///   SYNC_KEY: shared persistence key (default: polybot_shared)
    ///   SUPABASE_URL, SUPABASE_KEY: remote state store
    ///   DATA_DIR: local state files (default: ./data)
    ///   ALERT_URL: alert relay base url
    ///   LOG_FORMAT: "json" for structured output
    ///   RUST_LOG: log level (default: info)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Some(url) = env_nonempty("MARKET_API_URL") {
            config.api.market_api_host = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = env_nonempty("BACKEND_URL") {
            config.api.backend_host = url.trim_end_matches('/').to_string();
        }
        if let Some(limit) = env_parse("MARKET_LIMIT") {
            config.api.market_limit = limit;
        }
        if let Some(secs) = env_parse("POLL_INTERVAL_SECS") {
            config.api.poll_interval_secs = secs;
        }

        if let Some(balance) = env_parse("STARTING_BALANCE") {
            config.engine.initial_balance = balance;
        }
        if let Some(raw) = env_nonempty("ACTIVE_STRATEGIES") {
            config.engine.active_strategies = parse_strategies(&raw);
        }

        if let Some(max) = env_parse("MAX_OPEN_POSITIONS") {
            config.engine.max_open_positions = max;
        }
        if let Some(ms) = env_parse("DISPATCH_INTERVAL_MS") {
            config.dispatch.interval_ms = ms;
        }

        if let Some(role) = env_parse("SYNC_ROLE") {
            config.sync.role = role;
        }
        if let Some(key) = env_nonempty("SYNC_KEY") {
            config.sync.shared_key = key;
        }
        config.sync.remote_url = env_nonempty("SUPABASE_URL")
            .map(|u| u.trim_end_matches('/').to_string());
        config.sync.remote_api_key = env_nonempty("SUPABASE_KEY");
        if let Some(dir) = env_nonempty("DATA_DIR") {
            config.sync.data_dir = dir;
        }

        config.telemetry.alert_url = env_nonempty("ALERT_URL")
            .map(|u| u.trim_end_matches('/').to_string());
        if let Some(level) = env_nonempty("RUST_LOG") {
            config.telemetry.log_level = level;
        }
        config.telemetry.json_logs = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.initial_balance > 0.0,
            "initial_balance must be positive"
        );
        anyhow::ensure!(
            self.dispatch.max_position_fraction > 0.0 && self.dispatch.max_position_fraction <= 1.0,
            "max_position_fraction must be between 0 and 1"
        );
        anyhow::ensure!(
            self.engine.max_open_positions > 0,
            "max_open_positions must be at least 1"
        );
        let arb = &self.detectors.arbitrage;
        anyhow::ensure!(
            arb.floor < arb.lower && arb.lower <= 1.0 && 1.0 <= arb.upper && arb.upper < arb.ceiling,
            "arbitrage bands must satisfy floor < lower <= 1 <= upper < ceiling"
        );
        anyhow::ensure!(
            self.detectors.extreme.threshold > 0.0 && self.detectors.extreme.threshold < 0.5,
            "extreme price threshold must be in (0, 0.5)"
        );
        anyhow::ensure!(
            url::Url::parse(&self.api.market_api_host).is_ok(),
            "MARKET_API_URL is not a valid url: {}",
            self.api.market_api_host
        );
        anyhow::ensure!(
            self.sync.remote_url.is_none() || self.sync.remote_api_key.is_some(),
            "SUPABASE_KEY must be set when SUPABASE_URL is"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_arb_bands_rejected() {
        let mut config = Config::default();
        config.detectors.arbitrage.lower = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_strategies_skips_unknown() {
        let set = parse_strategies("A, c,Z,,B");
        assert_eq!(set.len(), 3);
        assert!(set.contains(&StrategyCode::C));
    }

    #[test]
    fn test_sync_role_aliases() {
        assert_eq!("admin".parse::<SyncRole>().unwrap(), SyncRole::Writer);
        assert_eq!("Viewer".parse::<SyncRole>().unwrap(), SyncRole::Reader);
        assert!("owner".parse::<SyncRole>().is_err());
    }
}
