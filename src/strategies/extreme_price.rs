use crate::config::ExtremePriceConfig;
use crate::models::market::{MarketSnapshot, Side};
use crate::models::opportunity::{rank_by_confidence, Action, Opportunity, OpportunityKind};
use tracing::debug;

/// Buys the heavy favourite when one side trades at a long-shot price on a
/// liquid market.
pub struct ExtremePriceDetector {
    config: ExtremePriceConfig,
}

impl ExtremePriceDetector {
    pub fn new(config: ExtremePriceConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, markets: &[MarketSnapshot]) -> Vec<Opportunity> {
        let mut out = Vec::new();
        for market in markets {
            if market.volume_24h <= self.config.volume_floor {
                continue;
            }
            for extreme in [Side::Yes, Side::No] {
                if let Some(opp) = self.check(market, extreme) {
                    out.push(opp);
                }
            }
        }
        rank_by_confidence(&mut out);
        out
    }

    fn check(&self, market: &MarketSnapshot, extreme: Side) -> Option<Opportunity> {
        let threshold = self.config.threshold;
        let price = market.price(extreme);
        if price > threshold {
            return None;
        }

        let favourite = extreme.opposite();
        let fav_price = market.price(favourite);
        if fav_price <= 0.0 {
            return None;
        }

        let expected_profit = (1.0 - fav_price) / fav_price * 100.0;
        let confidence = (0.8 + 0.15 * (1.0 - price / threshold)).min(0.95);
        let action = match favourite {
            Side::Yes => Action::BuyYes,
            Side::No => Action::BuyNo,
        };

        debug!(
            "EXTREME: market={} {}={:.3} → {:?} yield={:.2}%",
            market.id,
            extreme.label(),
            price,
            action,
            expected_profit
        );

        Some(Opportunity {
            kind: OpportunityKind::ExtremePrice,
            market: market.clone(),
            action,
            signal: format!(
                "{} at {:.1}¢, {} yields {:.2}%",
                extreme.label(),
                price * 100.0,
                favourite.label(),
                expected_profit
            ),
            expected_profit,
            confidence,
            position_size: Some(self.config.position_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ExtremePriceDetector {
        ExtremePriceDetector::new(ExtremePriceConfig::default())
    }

    #[test]
    fn test_low_yes_buys_no() {
        let m = MarketSnapshot::from_prices("m", 0.04, 0.96, 20_000.0);
        let opps = detector().detect(&[m]);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].action, Action::BuyNo);
        assert!(opps[0].confidence > 0.8 && opps[0].confidence <= 1.0);
        assert!((opps[0].expected_profit - (0.04 / 0.96 * 100.0)).abs() < 1e-6);
    }

    #[test]
    fn test_low_no_buys_yes() {
        let m = MarketSnapshot::from_prices("m", 0.93, 0.07, 50_000.0);
        let opps = detector().detect(&[m]);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].action, Action::BuyYes);
    }

    #[test]
    fn test_thin_market_ignored() {
        let m = MarketSnapshot::from_prices("m", 0.04, 0.96, 9_000.0);
        assert!(detector().detect(&[m]).is_empty());
    }

    #[test]
    fn test_confidence_rises_as_price_falls() {
        let cheap = MarketSnapshot::from_prices("cheap", 0.02, 0.98, 20_000.0);
        let edge = MarketSnapshot::from_prices("edge", 0.10, 0.90, 20_000.0);
        let opps = detector().detect(&[edge, cheap]);
        assert_eq!(opps[0].market.id, "cheap");
        assert!((opps[1].confidence - 0.8).abs() < 1e-9);
    }
}
