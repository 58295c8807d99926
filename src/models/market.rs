use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_PRICE: f64 = 0.01;
pub const MAX_PRICE: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// Convert a held-token price into YES-probability space and back.
    /// The mapping is its own inverse.
    pub fn to_reference(&self, token_price: f64) -> f64 {
        match self {
            Side::Yes => token_price,
            Side::No => 1.0 - token_price,
        }
    }
}

/// Clamp a probability away from exact 0/1.
pub fn clamp_price(p: f64) -> f64 {
    if p <= 0.001 {
        MIN_PRICE
    } else if p >= 0.999 {
        MAX_PRICE
    } else {
        p.clamp(MIN_PRICE, MAX_PRICE)
    }
}

/// Previous poll's values for the same market id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorQuote {
    pub yes_price: f64,
    pub no_price: f64,
    pub volume_24h: f64,
}

/// One market as seen in a single poll. Replaced wholesale every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub slug: String,
    pub question: String,
    pub category: String,
    pub yes_price: f64,
    pub no_price: f64,
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub no_bid: f64,
    pub no_ask: f64,
    pub volume: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub token_ids: Option<(String, String)>,
    pub previous: Option<PriorQuote>,
    pub history: Vec<f64>,
}

impl MarketSnapshot {
    /// Snapshot with quotes derived at ±1% of the outcome prices.
    pub fn from_prices(id: &str, yes_price: f64, no_price: f64, volume_24h: f64) -> Self {
        let yes = clamp_price(yes_price);
        let no = clamp_price(no_price);
        Self {
            id: id.to_string(),
            slug: id.to_string(),
            question: String::new(),
            category: String::new(),
            yes_price: yes,
            no_price: no,
            yes_bid: yes * 0.99,
            yes_ask: yes * 1.01,
            no_bid: no * 0.99,
            no_ask: no * 1.01,
            volume: volume_24h,
            volume_24h,
            liquidity: 0.0,
            token_ids: None,
            previous: None,
            history: vec![yes],
        }
    }

    pub fn price(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }

    pub fn bid(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes_bid,
            Side::No => self.no_bid,
        }
    }

    pub fn ask(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes_ask,
            Side::No => self.no_ask,
        }
    }

    pub fn token_id(&self, side: Side) -> Option<&str> {
        self.token_ids.as_ref().map(|(yes, no)| match side {
            Side::Yes => yes.as_str(),
            Side::No => no.as_str(),
        })
    }

    pub fn price_sum(&self) -> f64 {
        self.yes_price + self.no_price
    }

    pub fn yes_delta(&self) -> Option<f64> {
        self.previous.map(|p| self.yes_price - p.yes_price)
    }

    /// Relative 24h volume change against the previous poll.
    pub fn volume_change(&self) -> Option<f64> {
        self.previous
            .filter(|p| p.volume_24h > 0.0)
            .map(|p| (self.volume_24h - p.volume_24h) / p.volume_24h)
    }

    pub fn display_name(&self) -> &str {
        if self.question.is_empty() {
            &self.slug
        } else {
            &self.question
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: BTreeMap<Decimal, Decimal>, // price → size (descending by price)
    pub asks: BTreeMap<Decimal, Decimal>, // price → size (ascending by price)
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Best bid and ask as floats, only when both exist and are sane.
    pub fn top_of_book(&self) -> Option<(f64, f64)> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        let (bid, ask) = (bid.to_f64()?, ask.to_f64()?);
        (bid > 0.0 && ask < 1.0 && bid <= ask).then_some((bid, ask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_clamp_price_edges() {
        assert_eq!(clamp_price(0.0), MIN_PRICE);
        assert_eq!(clamp_price(0.0005), MIN_PRICE);
        assert_eq!(clamp_price(1.0), MAX_PRICE);
        assert_eq!(clamp_price(0.42), 0.42);
    }

    #[test]
    fn test_reference_mapping_round_trips() {
        let p = 0.3;
        assert!((Side::No.to_reference(Side::No.to_reference(p)) - p).abs() < 1e-12);
        assert_eq!(Side::Yes.to_reference(p), p);
    }

    #[test]
    fn test_snapshot_quotes_bracket_price() {
        let m = MarketSnapshot::from_prices("m1", 0.40, 0.62, 1_000.0);
        assert!(m.bid(Side::Yes) < m.price(Side::Yes));
        assert!(m.ask(Side::No) > m.price(Side::No));
        assert!(m.previous.is_none());
        assert!(m.yes_delta().is_none());
    }

    #[test]
    fn test_top_of_book() {
        let mut book = OrderBook::new("tok".into());
        book.bids.insert(dec!(0.41), dec!(10));
        book.bids.insert(dec!(0.43), dec!(5));
        book.asks.insert(dec!(0.46), dec!(8));
        assert_eq!(book.best_bid(), Some((dec!(0.43), dec!(5))));
        assert_eq!(book.spread(), Some(dec!(0.03)));
        let (bid, ask) = book.top_of_book().unwrap();
        assert!((bid - 0.43).abs() < 1e-9 && (ask - 0.46).abs() < 1e-9);
    }

    #[test]
    fn test_top_of_book_rejects_crossed() {
        let mut book = OrderBook::new("tok".into());
        book.bids.insert(dec!(0.60), dec!(1));
        book.asks.insert(dec!(0.55), dec!(1));
        assert!(book.top_of_book().is_none());
    }
}
