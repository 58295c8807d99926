use crate::config::ArbitrageConfig;
use crate::models::market::MarketSnapshot;
use crate::models::opportunity::{rank_by_confidence, Action, Opportunity, OpportunityKind};
use tracing::debug;

/// Complement arbitrage: flags markets whose YES + NO prices stray from $1.00.
///
/// Sums inside `(floor, lower)` are cheap (buy both legs), sums inside
/// `(upper, ceiling)` are rich (sell both). Anything outside the outer bounds
/// is treated as a data problem rather than an edge.
pub struct ArbitrageDetector {
    config: ArbitrageConfig,
}

impl ArbitrageDetector {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, markets: &[MarketSnapshot]) -> Vec<Opportunity> {
        let mut out: Vec<Opportunity> = markets.iter().filter_map(|m| self.check(m)).collect();
        rank_by_confidence(&mut out);
        out
    }

    fn check(&self, market: &MarketSnapshot) -> Option<Opportunity> {
        let c = &self.config;
        let sum = market.price_sum();

        let action = if sum > c.floor && sum < c.lower {
            Action::BuyBoth
        } else if sum > c.upper && sum < c.ceiling {
            Action::SellBoth
        } else {
            return None;
        };

        let deviation = (1.0 - sum).abs();
        let expected_profit = deviation * 100.0;
        let confidence = (0.5 + deviation * 5.0).min(1.0);

        debug!(
            "ARB: market={} YES={:.3}+NO={:.3}={:.3} action={:?} edge={:.2}%",
            market.id, market.yes_price, market.no_price, sum, action, expected_profit
        );

        Some(Opportunity {
            kind: OpportunityKind::ComplementArb,
            market: market.clone(),
            action,
            signal: format!(
                "YES {:.1}¢ + NO {:.1}¢ = {:.1}¢",
                market.yes_price * 100.0,
                market.no_price * 100.0,
                sum * 100.0
            ),
            expected_profit,
            confidence,
            position_size: Some(c.position_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ArbitrageDetector {
        ArbitrageDetector::new(ArbitrageConfig::default())
    }

    #[test]
    fn test_cheap_sum_is_buy_both() {
        let m = MarketSnapshot::from_prices("m", 0.40, 0.45, 0.0);
        let opps = detector().detect(&[m]);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].action, Action::BuyBoth);
        assert!((opps[0].expected_profit - 15.0).abs() < 1e-6);
        assert!(opps[0].confidence > 0.0 && opps[0].confidence <= 1.0);
    }

    #[test]
    fn test_rich_sum_is_sell_both() {
        let m = MarketSnapshot::from_prices("m", 0.55, 0.50, 0.0);
        let opps = detector().detect(&[m]);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].action, Action::SellBoth);
        assert!((opps[0].expected_profit - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_fair_and_broken_sums_ignored() {
        let fair = MarketSnapshot::from_prices("fair", 0.50, 0.505, 0.0);
        let broken = MarketSnapshot::from_prices("broken", 0.20, 0.30, 0.0);
        let silly = MarketSnapshot::from_prices("silly", 0.70, 0.60, 0.0);
        assert!(detector().detect(&[fair, broken, silly]).is_empty());
    }

    #[test]
    fn test_sorted_by_confidence() {
        let small = MarketSnapshot::from_prices("small", 0.49, 0.50, 0.0);
        let large = MarketSnapshot::from_prices("large", 0.45, 0.45, 0.0);
        let opps = detector().detect(&[small, large]);
        assert_eq!(opps[0].market.id, "large");
    }
}
