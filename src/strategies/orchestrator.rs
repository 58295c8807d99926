use crate::config::DetectorConfig;
use crate::models::market::MarketSnapshot;
use crate::models::opportunity::{Opportunity, StrategyCode};
use crate::strategies::arbitrage::ArbitrageDetector;
use crate::strategies::extreme_price::ExtremePriceDetector;
use crate::strategies::momentum::MomentumDetector;
use std::collections::BTreeSet;
use tracing::debug;

/// Runs the enabled detectors over one poll and builds the opportunity queue.
///
/// Results are concatenated in strategy order A, B, C, each block already
/// ranked by its detector, then capped to `max_queue`.
pub struct StrategyOrchestrator {
    arbitrage: ArbitrageDetector,
    extreme: ExtremePriceDetector,
    momentum: MomentumDetector,
    max_queue: usize,
}

impl StrategyOrchestrator {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            arbitrage: ArbitrageDetector::new(config.arbitrage),
            extreme: ExtremePriceDetector::new(config.extreme),
            momentum: MomentumDetector::new(config.momentum),
            max_queue: config.max_queue,
        }
    }

    pub fn evaluate(
        &self,
        markets: &[MarketSnapshot],
        active: &BTreeSet<StrategyCode>,
    ) -> Vec<Opportunity> {
        let mut queue: Vec<Opportunity> = Vec::new();

        for code in StrategyCode::ALL {
            if !active.contains(&code) {
                continue;
            }
            let found = match code {
                StrategyCode::A => self.arbitrage.detect(markets),
                StrategyCode::B => self.extreme.detect(markets),
                StrategyCode::C => self.momentum.detect(markets),
            };
            debug!("Strategy {code}: {} candidates", found.len());
            queue.extend(found);
        }

        queue.truncate(self.max_queue);
        queue
    }
}
