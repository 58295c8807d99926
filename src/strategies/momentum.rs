use crate::config::MomentumConfig;
use crate::models::market::MarketSnapshot;
use crate::models::opportunity::{rank_by_confidence, Action, Opportunity, OpportunityKind};
use statrs::statistics::Statistics;
use tracing::debug;

/// Short-horizon momentum and scalp signals.
///
/// With a previous snapshot the detector reacts to the poll-over-poll YES move
/// and to 24h volume jumps. Without one it falls back to a raw-volume rule.
/// A price series of at least `history_min_points` additionally feeds a
/// trend-following rule gated on low realized volatility.
pub struct MomentumDetector {
    config: MomentumConfig,
}

impl MomentumDetector {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, markets: &[MarketSnapshot]) -> Vec<Opportunity> {
        let mut out = Vec::new();
        for market in markets {
            let trend = self.history_momentum(&market.history);

            match market.previous {
                Some(_) => {
                    if let Some(opp) = self.scalp(market) {
                        out.push(opp);
                    }
                    if let Some(opp) = self.volume_spike(market, trend.unwrap_or(0.0)) {
                        out.push(opp);
                    }
                }
                None => {
                    if let Some(opp) = self.high_volume(market) {
                        out.push(opp);
                    }
                }
            }

            if let Some(m) = trend {
                if let Some(opp) = self.trend_follow(market, m) {
                    out.push(opp);
                }
            }
        }
        rank_by_confidence(&mut out);
        out
    }

    /// Mean of the last three points minus the mean of the three before.
    pub fn history_momentum(&self, history: &[f64]) -> Option<f64> {
        let n = history.len();
        if n < self.config.history_min_points.max(6) {
            return None;
        }
        let recent = history[n - 3..].iter().mean();
        let older = history[n - 6..n - 3].iter().mean();
        Some(recent - older)
    }

    /// Population standard deviation of the series.
    pub fn volatility(history: &[f64]) -> f64 {
        if history.len() < 2 {
            return 0.0;
        }
        let sd = history.iter().population_std_dev();
        if sd.is_finite() {
            sd
        } else {
            0.0
        }
    }

    fn scalp(&self, market: &MarketSnapshot) -> Option<Opportunity> {
        let delta = market.yes_delta()?;
        if delta.abs() <= self.config.delta_threshold || market.volume_24h <= self.config.min_volume {
            return None;
        }
        // Buy whichever side the move just made cheaper.
        let action = if delta > 0.0 { Action::BuyNo } else { Action::BuyYes };
        debug!("SCALP: market={} delta={delta:+.4} → {action:?}", market.id);

        Some(Opportunity {
            kind: OpportunityKind::Scalp,
            market: market.clone(),
            action,
            signal: format!("YES moved {:+.2}¢ since last poll", delta * 100.0),
            expected_profit: delta.abs() * 50.0,
            confidence: (delta.abs() * 10.0).min(0.6),
            position_size: Some(self.config.position_size),
        })
    }

    fn volume_spike(&self, market: &MarketSnapshot, trend: f64) -> Option<Opportunity> {
        if market.volume_24h <= self.config.spike_min_volume {
            return None;
        }
        let change = market.volume_change()?;
        if change <= self.config.spike_ratio {
            return None;
        }
        let action = if trend > 0.0 { Action::BuyYes } else { Action::BuyNo };

        Some(Opportunity {
            kind: OpportunityKind::VolumeSpike,
            market: market.clone(),
            action,
            signal: format!(
                "24h volume +{:.0}% to ${:.0}k",
                change * 100.0,
                market.volume_24h / 1000.0
            ),
            expected_profit: 3.0 + change * 10.0,
            confidence: (change * 2.0).min(0.85),
            position_size: Some(0.025),
        })
    }

    fn high_volume(&self, market: &MarketSnapshot) -> Option<Opportunity> {
        if market.volume_24h <= self.config.volume_threshold
            || market.yes_price <= 0.25
            || market.yes_price >= 0.75
        {
            return None;
        }
        Some(Opportunity {
            kind: OpportunityKind::HighVolume,
            market: market.clone(),
            action: Action::buy_cheaper(market),
            signal: format!(
                "${:.0}k 24h volume, YES {:.0}¢",
                market.volume_24h / 1000.0,
                market.yes_price * 100.0
            ),
            expected_profit: 2.0 + market.volume_24h.log10() * 0.5,
            confidence: (market.volume_24h / 200_000.0).min(0.75),
            position_size: Some(0.03),
        })
    }

    fn trend_follow(&self, market: &MarketSnapshot, momentum: f64) -> Option<Opportunity> {
        if momentum.abs() <= self.config.history_momentum {
            return None;
        }
        if Self::volatility(&market.history) >= self.config.max_volatility {
            return None;
        }
        let action = if momentum > 0.0 { Action::BuyYes } else { Action::BuyNo };

        Some(Opportunity {
            kind: OpportunityKind::Momentum,
            market: market.clone(),
            action,
            signal: format!("trend {:+.1}¢ over last polls", momentum * 100.0),
            expected_profit: momentum.abs() * 25.0,
            confidence: (momentum.abs() * 4.0).min(0.8),
            position_size: Some(0.02),
        })
    }
}
