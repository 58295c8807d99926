use crate::config::ApiConfig;
use crate::error::{BotError, Result};
use crate::models::market::{clamp_price, MarketSnapshot, OrderBook};
use crate::telemetry::latency::LatencyTracker;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// REST client for the market data proxy.
///
/// Fetches the open-market list and per-token order books. Parsing is
/// tolerant: a bad record is logged and skipped, the rest of the batch is kept.
pub struct MarketClient {
    base: String,
    http: reqwest::Client,
    latency: Option<Arc<LatencyTracker>>,
}

impl MarketClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base: config.market_api_host.trim_end_matches('/').to_string(),
            http,
            latency: None,
        })
    }

    pub fn with_latency(mut self, tracker: Arc<LatencyTracker>) -> Self {
        self.latency = Some(tracker);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Fetch up to `limit` open markets. Invalid records are skipped.
    pub async fn fetch_markets(&self, limit: usize) -> Result<Vec<MarketSnapshot>> {
        let url = Url::parse_with_params(
            &format!("{}/api/markets", self.base),
            &[("closed", "false".to_string()), ("limit", limit.to_string())],
        )?;

        let _timer = self.latency.as_ref().map(|l| l.start_timer("fetch_markets"));
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Network(format!("markets endpoint returned HTTP {status}")));
        }
        let body: Value = resp.json().await?;

        let records = match body {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Array(items)) => items,
                _ => return Err(BotError::Network("unexpected markets payload".into())),
            },
            _ => return Err(BotError::Network("unexpected markets payload".into())),
        };

        let mut markets = Vec::with_capacity(records.len());
        for record in records {
            match parse_record(record) {
                Ok(Some(m)) => markets.push(m),
                Ok(None) => {}
                Err(e) => warn!("Skipping market record: {e}"),
            }
        }
        debug!("Fetched {} markets", markets.len());
        Ok(markets)
    }

    /// Fetch the order book for one outcome token.
    pub async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = Url::parse_with_params(
            &format!("{}/api/orderbook", self.base),
            &[("token_id", token_id)],
        )?;

        let _timer = self.latency.as_ref().map(|l| l.start_timer("fetch_order_book"));
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Network(format!("orderbook endpoint returned HTTP {status}")));
        }
        let raw: BookResponse = resp.json().await?;

        let mut book = OrderBook::new(token_id.to_string());
        for level in &raw.bids {
            if let (Some(price), Some(size)) = (decimal_of(&level.price), decimal_of(&level.size)) {
                book.bids.insert(price, size);
            }
        }
        for level in &raw.asks {
            if let (Some(price), Some(size)) = (decimal_of(&level.price), decimal_of(&level.size)) {
                book.asks.insert(price, size);
            }
        }
        Ok(book)
    }
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
}

#[derive(Debug, Deserialize)]
struct BookLevel {
    price: Value,
    size: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<RawEvent>>,
    #[serde(default)]
    pub outcome_prices: Option<Value>,
    #[serde(default)]
    pub best_bid: Option<Value>,
    #[serde(default)]
    pub best_ask: Option<Value>,
    #[serde(default)]
    pub volume: Option<Value>,
    #[serde(default, rename = "volume24hr")]
    pub volume_24hr: Option<Value>,
    #[serde(default)]
    pub liquidity: Option<Value>,
    #[serde(default)]
    pub clob_token_ids: Option<Value>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

fn parse_record(record: Value) -> Result<Option<MarketSnapshot>> {
    let raw: RawMarket = serde_json::from_value(record)
        .map_err(|e| BotError::Validation(format!("malformed market: {e}")))?;
    parse_market(raw)
}

/// Number-or-string field to f64.
fn number_of(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

fn decimal_of(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

fn opt_number(v: &Option<Value>) -> Option<f64> {
    v.as_ref().and_then(number_of)
}

/// An array field that may arrive JSON-encoded inside a string.
fn list_of(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn probability(v: Option<&Value>) -> Option<f64> {
    v.and_then(number_of).filter(|p| (0.0..=1.0).contains(p))
}

/// Normalize one venue record. `Ok(None)` means closed or inactive.
pub fn parse_market(raw: RawMarket) -> Result<Option<MarketSnapshot>> {
    if raw.closed == Some(true) || raw.active == Some(false) {
        return Ok(None);
    }

    let plain_id = raw.id.as_ref().and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let id = raw
        .condition_id
        .clone()
        .filter(|s| !s.is_empty())
        .or(plain_id)
        .ok_or_else(|| BotError::Validation("market record has no id".into()))?;

    let mut yes_price = 0.5;
    let mut no_price = 0.5;
    if let Some(prices) = raw.outcome_prices.as_ref().map(list_of) {
        if prices.len() >= 2 {
            if let Some(p) = probability(prices.first()) {
                yes_price = p;
            }
            if let Some(p) = probability(prices.get(1)) {
                no_price = p;
            }
        }
    }

    let best_bid = opt_number(&raw.best_bid);
    let best_ask = opt_number(&raw.best_ask);
    if yes_price == 0.5 {
        if let Some(bid) = best_bid.filter(|b| *b > 0.0 && *b < 1.0) {
            yes_price = bid;
            no_price = 1.0 - bid;
        }
    }

    let yes_price = clamp_price(yes_price);
    let no_price = clamp_price(no_price);

    let (yes_bid, yes_ask, no_bid, no_ask) = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) if bid > 0.0 && ask < 1.0 && bid <= ask => {
            (bid, ask, 1.0 - ask, 1.0 - bid)
        }
        _ => (
            yes_price * 0.99,
            yes_price * 1.01,
            no_price * 0.99,
            no_price * 1.01,
        ),
    };

    let volume = opt_number(&raw.volume).unwrap_or(0.0);
    let volume_24h = opt_number(&raw.volume_24hr)
        .filter(|v| *v > 0.0)
        .unwrap_or(volume);

    let token_ids = raw.clob_token_ids.as_ref().and_then(|v| {
        let ids: Vec<String> = list_of(v)
            .into_iter()
            .filter_map(|t| match t {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect();
        (ids.len() == 2).then(|| (ids[0].clone(), ids[1].clone()))
    });

    let event = raw.events.as_ref().and_then(|e| e.first());
    let slug = event
        .and_then(|e| e.slug.clone())
        .or(raw.slug)
        .unwrap_or_else(|| id.clone());
    let category = event
        .and_then(|e| e.title.clone())
        .or(raw.category)
        .unwrap_or_else(|| "Other".to_string());

    Ok(Some(MarketSnapshot {
        id,
        slug,
        question: raw.question.unwrap_or_default(),
        category,
        yes_price,
        no_price,
        yes_bid,
        yes_ask,
        no_bid,
        no_ask,
        volume,
        volume_24h,
        liquidity: opt_number(&raw.liquidity).unwrap_or(0.0),
        token_ids,
        previous: None,
        history: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw(v: Value) -> RawMarket {
        serde_json::from_value(v).unwrap()
    }

    fn client_for(server: &MockServer) -> MarketClient {
        let config = ApiConfig {
            market_api_host: server.uri(),
            backend_host: server.uri(),
            market_limit: 100,
            poll_interval_secs: 5,
            request_timeout_secs: 2,
        };
        MarketClient::new(&config).unwrap()
    }

    #[test]
    fn test_parse_string_encoded_prices() {
        let m = parse_market(raw(json!({
            "conditionId": "0xabc",
            "id": "123",
            "question": "Will it rain?",
            "outcomePrices": "[\"0.42\",\"0.61\"]",
            "volume": "1500.5",
            "volume24hr": 900,
            "clobTokenIds": "[\"y1\",\"n1\"]",
            "events": [{"slug": "rain-event", "title": "Weather"}]
        })))
        .unwrap()
        .unwrap();

        assert_eq!(m.id, "0xabc");
        assert_eq!(m.slug, "rain-event");
        assert_eq!(m.category, "Weather");
        assert!((m.yes_price - 0.42).abs() < 1e-9);
        assert!((m.no_price - 0.61).abs() < 1e-9);
        assert!((m.volume_24h - 900.0).abs() < 1e-9);
        assert_eq!(m.token_ids, Some(("y1".to_string(), "n1".to_string())));
        assert!(m.yes_bid < m.yes_price && m.yes_ask > m.yes_price);
    }

    #[test]
    fn test_parse_falls_back_to_best_bid() {
        let m = parse_market(raw(json!({
            "id": "m2",
            "bestBid": "0.30",
            "bestAsk": 0.32
        })))
        .unwrap()
        .unwrap();
        assert!((m.yes_price - 0.30).abs() < 1e-9);
        assert!((m.no_price - 0.70).abs() < 1e-9);
        assert!((m.yes_ask - 0.32).abs() < 1e-9);
        assert!((m.no_bid - 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_parse_clamps_extremes() {
        let m = parse_market(raw(json!({
            "id": "m3",
            "outcomePrices": ["0", "1"]
        })))
        .unwrap()
        .unwrap();
        assert_eq!(m.yes_price, 0.01);
        assert_eq!(m.no_price, 0.99);
    }

    #[test]
    fn test_parse_volume_falls_back_to_total() {
        let m = parse_market(raw(json!({"id": "m4", "volume": 2500}))).unwrap().unwrap();
        assert!((m.volume_24h - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_id_is_validation_error() {
        let err = parse_market(raw(json!({"question": "?"}))).unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }

    #[test]
    fn test_closed_market_skipped() {
        assert!(parse_market(raw(json!({"id": "x", "closed": true}))).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_markets_skips_bad_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/markets"))
            .and(query_param("closed", "false"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "good", "outcomePrices": "[\"0.4\",\"0.6\"]"},
                {"question": "no id here"},
                {"id": "also-good", "outcomePrices": ["0.2", "0.8"]}
            ])))
            .mount(&server)
            .await;

        let markets = client_for(&server).fetch_markets(100).await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[1].id, "also-good");
    }

    #[tokio::test]
    async fn test_fetch_markets_http_error_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/markets"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_markets(10).await.unwrap_err();
        assert!(matches!(err, BotError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_order_book() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orderbook"))
            .and(query_param("token_id", "tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bids": [{"price": "0.44", "size": "100"}, {"price": "0.45", "size": "20"}],
                "asks": [{"price": "0.47", "size": "50"}]
            })))
            .mount(&server)
            .await;

        let book = client_for(&server).fetch_order_book("tok1").await.unwrap();
        let (bid, ask) = book.top_of_book().unwrap();
        assert!((bid - 0.45).abs() < 1e-9);
        assert!((ask - 0.47).abs() < 1e-9);
    }
}
