use crate::models::market::{MarketSnapshot, PriorQuote};
use std::collections::{HashMap, VecDeque};

/// Remembers the previous poll per market id and a short YES price series.
///
/// Owned by the poll task. Markets that drop out of a poll are forgotten.
pub struct PriceHistory {
    max_points: usize,
    prior: HashMap<String, PriorQuote>,
    series: HashMap<String, VecDeque<f64>>,
}

impl PriceHistory {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            prior: HashMap::new(),
            series: HashMap::new(),
        }
    }

    /// Attach `previous` and `history` to each snapshot of a fresh poll.
    pub fn tag(&mut self, mut markets: Vec<MarketSnapshot>) -> Vec<MarketSnapshot> {
        let mut next_prior = HashMap::with_capacity(markets.len());
        let mut next_series = HashMap::with_capacity(markets.len());

        for market in markets.iter_mut() {
            market.previous = self.prior.get(&market.id).copied();

            let mut points = self.series.remove(&market.id).unwrap_or_default();
            if points.len() >= self.max_points {
                points.pop_front();
            }
            points.push_back(market.yes_price);
            market.history = points.iter().copied().collect();

            next_prior.insert(
                market.id.clone(),
                PriorQuote {
                    yes_price: market.yes_price,
                    no_price: market.no_price,
                    volume_24h: market.volume_24h,
                },
            );
            next_series.insert(market.id.clone(), points);
        }

        self.prior = next_prior;
        self.series = next_series;
        markets
    }

    pub fn tracked(&self) -> usize {
        self.prior.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(id: &str, yes: f64) -> MarketSnapshot {
        MarketSnapshot::from_prices(id, yes, 1.0 - yes, 10_000.0)
    }

    #[test]
    fn test_first_poll_has_no_previous() {
        let mut h = PriceHistory::new(20);
        let tagged = h.tag(vec![snap("a", 0.5)]);
        assert!(tagged[0].previous.is_none());
        assert_eq!(tagged[0].history, vec![0.5]);
    }

    #[test]
    fn test_second_poll_sees_previous() {
        let mut h = PriceHistory::new(20);
        h.tag(vec![snap("a", 0.50)]);
        let tagged = h.tag(vec![snap("a", 0.52)]);
        let prev = tagged[0].previous.unwrap();
        assert!((prev.yes_price - 0.50).abs() < 1e-9);
        assert!((tagged[0].yes_delta().unwrap() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut h = PriceHistory::new(3);
        let mut last = Vec::new();
        for i in 0..6 {
            last = h.tag(vec![snap("a", 0.40 + i as f64 * 0.01)]);
        }
        assert_eq!(last[0].history.len(), 3);
        assert!((last[0].history[2] - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_vanished_markets_forgotten() {
        let mut h = PriceHistory::new(5);
        h.tag(vec![snap("a", 0.5), snap("b", 0.5)]);
        h.tag(vec![snap("a", 0.5)]);
        assert_eq!(h.tracked(), 1);
        let tagged = h.tag(vec![snap("b", 0.6)]);
        assert!(tagged[0].previous.is_none());
    }
}
