use serde::{Deserialize, Serialize};
use std::fmt;

use super::market::{MarketSnapshot, Side};

/// User-toggleable detector families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategyCode {
    A, // complement arbitrage
    B, // extreme-price value
    C, // momentum / scalp
}

impl StrategyCode {
    pub const ALL: [StrategyCode; 3] = [StrategyCode::A, StrategyCode::B, StrategyCode::C];
}

impl std::str::FromStr for StrategyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(StrategyCode::A),
            "B" => Ok(StrategyCode::B),
            "C" => Ok(StrategyCode::C),
            other => Err(format!("unknown strategy code '{other}'")),
        }
    }
}

impl fmt::Display for StrategyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyCode::A => "A",
            StrategyCode::B => "B",
            StrategyCode::C => "C",
        };
        f.write_str(s)
    }
}

/// Which rule produced an opportunity. Carried onto positions and trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpportunityKind {
    ComplementArb,
    ExtremePrice,
    Scalp,
    VolumeSpike,
    HighVolume,
    Momentum,
}

impl OpportunityKind {
    pub fn code(&self) -> StrategyCode {
        match self {
            OpportunityKind::ComplementArb => StrategyCode::A,
            OpportunityKind::ExtremePrice => StrategyCode::B,
            OpportunityKind::Scalp
            | OpportunityKind::VolumeSpike
            | OpportunityKind::HighVolume
            | OpportunityKind::Momentum => StrategyCode::C,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            OpportunityKind::ComplementArb => "ARBITRAGE",
            OpportunityKind::ExtremePrice => "FAVORITE_NO",
            OpportunityKind::Scalp => "SCALP",
            OpportunityKind::VolumeSpike => "VOLUME_SPIKE",
            OpportunityKind::HighVolume => "HIGH_VOL_PLAY",
            OpportunityKind::Momentum => "MOMENTUM",
        }
    }
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    BuyYes,
    BuyNo,
    BuyBoth,
    SellBoth,
}

impl Action {
    /// The single leg the simulator opens for this action, if any.
    ///
    /// `BuyBoth` takes the cheaper leg. `SellBoth` needs short inventory the
    /// simulator never holds, so it is informational only.
    pub fn entry_side(&self, market: &MarketSnapshot) -> Option<Side> {
        match self {
            Action::BuyYes => Some(Side::Yes),
            Action::BuyNo => Some(Side::No),
            Action::BuyBoth => {
                if market.yes_price <= market.no_price {
                    Some(Side::Yes)
                } else {
                    Some(Side::No)
                }
            }
            Action::SellBoth => None,
        }
    }

    /// Buy the side that is cheaper right now.
    pub fn buy_cheaper(market: &MarketSnapshot) -> Self {
        if market.yes_price <= market.no_price {
            Action::BuyYes
        } else {
            Action::BuyNo
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub market: MarketSnapshot,
    pub action: Action,
    pub signal: String,
    pub expected_profit: f64, // percent
    pub confidence: f64,
    pub position_size: Option<f64>, // fraction of balance
}

impl Opportunity {
    pub fn strategy(&self) -> StrategyCode {
        self.kind.code()
    }
}

/// Sort descending by confidence, ties kept in insertion order.
pub fn rank_by_confidence(opps: &mut [Opportunity]) {
    opps.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
