use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::market::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    GTC, // Good-Til-Cancelled: standard limit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A limit order to relay through the signing backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub token_id: String,
    pub market_side: Side,
    pub order_side: OrderSide,
    pub price: Decimal,
    pub size: Decimal, // tokens
    pub order_type: OrderType,
}

impl OrderIntent {
    /// Maker buy of `notional` dollars at `token_price`, rounded to the venue's
    /// cent tick and two-decimal share size.
    pub fn maker_buy(token_id: &str, side: Side, token_price: f64, notional: f64) -> Option<Self> {
        if token_price <= 0.0 || notional <= 0.0 {
            return None;
        }
        let price = Decimal::from_f64(token_price)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        let shares = Decimal::from_f64(notional / token_price)?
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if price <= Decimal::ZERO || shares <= Decimal::ZERO {
            return None;
        }
        Some(Self {
            token_id: token_id.to_string(),
            market_side: side,
            order_side: OrderSide::Buy,
            price,
            size: shares,
            order_type: OrderType::GTC,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderID", alias = "orderId", default)]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    #[serde(alias = "orderID", alias = "order_id")]
    pub id: String,
    #[serde(default, alias = "asset_id", alias = "tokenID")]
    pub token_id: String,
    #[serde(default)]
    pub side: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    #[serde(default, alias = "original_size", with = "rust_decimal::serde::str_option")]
    pub size: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: String,
    pub usdc_balance: f64,
    pub matic_balance: f64,
    #[serde(default)]
    pub has_gas: Option<bool>,
}

impl WalletInfo {
    pub fn can_pay_gas(&self) -> bool {
        self.has_gas.unwrap_or(self.matic_balance > 0.001)
    }
}
