use crate::config::DispatchConfig;
use crate::models::opportunity::Opportunity;

/// Position sizing utilities.
pub struct Sizing;

impl Sizing {
    /// Dollar notional for an entry: the opportunity's suggested fraction of
    /// balance, capped at `max_position_fraction` of balance.
    pub fn trade_size(balance: f64, suggested_fraction: Option<f64>, config: &DispatchConfig) -> f64 {
        if balance <= 0.0 {
            return 0.0;
        }
        let fraction = suggested_fraction
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(config.default_position_fraction);
        (balance * fraction).min(balance * config.max_position_fraction)
    }

    pub fn for_opportunity(balance: f64, opp: &Opportunity, config: &DispatchConfig) -> f64 {
        Self::trade_size(balance, opp.position_size, config)
    }

    /// Stop price in reference space: below entry for a YES holding, above
    /// for a NO holding.
    pub fn stop_price(entry: f64, is_yes: bool, stop_loss_pct: f64) -> f64 {
        if is_yes {
            entry * (1.0 - stop_loss_pct)
        } else {
            entry * (1.0 + stop_loss_pct)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggested_fraction_used() {
        let config = DispatchConfig::default();
        let size = Sizing::trade_size(300.0, Some(0.05), &config);
        assert!((size - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_capped_at_max_fraction() {
        let config = DispatchConfig::default();
        let size = Sizing::trade_size(300.0, Some(0.50), &config);
        assert!((size - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_fraction_when_missing() {
        let config = DispatchConfig::default();
        assert!((Sizing::trade_size(200.0, None, &config) - 10.0).abs() < 1e-9);
        assert!((Sizing::trade_size(200.0, Some(-1.0), &config) - 10.0).abs() < 1e-9);
        assert_eq!(Sizing::trade_size(0.0, Some(0.05), &config), 0.0);
    }

    #[test]
    fn test_stop_price_direction() {
        assert!((Sizing::stop_price(0.50, true, 0.03) - 0.485).abs() < 1e-12);
        assert!((Sizing::stop_price(0.50, false, 0.03) - 0.515).abs() < 1e-12);
    }
}
