use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBreakdown {
    pub trading: f64,
    pub profit_fee: f64,
    pub net: f64,
}

impl FeeBreakdown {
    pub fn total(&self) -> f64 {
        self.trading + self.profit_fee
    }
}

/// Round-trip trading fee on notional plus a venue fee on winnings.
#[derive(Debug, Clone, Copy)]
pub struct FeeModel {
    pub trading_fee_rate: f64,
    pub profit_fee_rate: f64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            trading_fee_rate: 0.005,
            profit_fee_rate: 0.02,
        }
    }
}

impl FeeModel {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            trading_fee_rate: config.trading_fee_rate,
            profit_fee_rate: config.profit_fee_rate,
        }
    }

    /// Net P&L for a close. Never exceeds `gross`.
    pub fn settle(&self, size: f64, gross: f64) -> FeeBreakdown {
        let trading = size * self.trading_fee_rate * 2.0;
        let profit_fee = if gross > 0.0 {
            gross * self.profit_fee_rate
        } else {
            0.0
        };
        FeeBreakdown {
            trading,
            profit_fee,
            net: gross - trading - profit_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_never_exceeds_gross() {
        let fees = FeeModel::default();
        for gross in [-5.0, -0.01, 0.0, 0.01, 3.0, 100.0] {
            for size in [0.0, 1.0, 30.0] {
                let b = fees.settle(size, gross);
                assert!(b.net <= gross, "net {} > gross {gross}", b.net);
            }
        }
    }

    #[test]
    fn test_profit_fee_only_on_gains() {
        let fees = FeeModel::default();
        let win = fees.settle(10.0, 1.0);
        assert!((win.trading - 0.1).abs() < 1e-12);
        assert!((win.profit_fee - 0.02).abs() < 1e-12);
        assert!((win.net - 0.88).abs() < 1e-12);

        let loss = fees.settle(10.0, -1.0);
        assert_eq!(loss.profit_fee, 0.0);
        assert!((loss.net + 1.1).abs() < 1e-12);
    }
}
