use crate::config::EngineConfig;
use crate::models::market::MarketSnapshot;
use crate::models::position::Position;

/// Decides when a simulated resting order counts as filled.
pub trait FillPolicy: Send + Sync {
    fn should_fill(&self, position: &Position, market: &MarketSnapshot) -> bool;

    fn name(&self) -> &'static str;
}

/// Fills when the held token's ask comes within `tolerance` of the limit, or
/// when the ask sits more than `epsilon` away from the entry price.
///
/// Entries rest at the bid, so the second rule compares the live ask against
/// the entry bid. Any book wider than `epsilon` therefore fills on its first
/// mark; only a book tighter than `epsilon` waits for the limit or the fill
/// timeout.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityFill {
    pub tolerance: f64,
    pub epsilon: f64,
}

impl Default for VolatilityFill {
    fn default() -> Self {
        Self {
            tolerance: 0.005,
            epsilon: 0.001,
        }
    }
}

impl VolatilityFill {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            tolerance: config.fill_tolerance,
            epsilon: config.fill_epsilon,
        }
    }
}

impl FillPolicy for VolatilityFill {
    fn should_fill(&self, position: &Position, market: &MarketSnapshot) -> bool {
        let ask = market.ask(position.side);
        let limit = position.limit_token_price();
        let entry = position.entry_token_price();

        ask <= limit * (1.0 + self.tolerance) || (ask - entry).abs() > self.epsilon
    }

    fn name(&self) -> &'static str {
        "volatility"
    }
}
