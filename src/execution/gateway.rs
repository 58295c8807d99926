use crate::config::ApiConfig;
use crate::error::{BotError, Result};
use crate::models::order::{OpenOrder, OrderAck, OrderIntent, OrderSide, WalletInfo};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

/// Order routing seam. Live entries go through this; paper mode never
/// touches it.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn open_orders(&self) -> Result<Vec<OpenOrder>>;

    async fn wallet(&self) -> Result<WalletInfo>;

    async fn health(&self) -> Result<bool>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest<'a> {
    token_id: &'a str,
    side: OrderSide,
    price: f64,
    size: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// REST client for the backend proxy that holds the signing key.
pub struct BackendClient {
    base: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base: config.backend_host.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Pull a readable reason out of an error body, falling back to the status.
    fn rejection(status: reqwest::StatusCode, text: &str) -> String {
        serde_json::from_str::<ErrorBody>(text)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| format!("HTTP {status}: {text}"))
    }
}

#[async_trait]
impl OrderGateway for BackendClient {
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck> {
        let body = PlaceOrderRequest {
            token_id: &intent.token_id,
            side: intent.order_side,
            price: intent.price.to_f64().unwrap_or(0.0),
            size: intent.size.to_f64().unwrap_or(0.0),
        };

        let resp = self
            .http
            .post(self.url("/api/order"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::ExternalOrder(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BotError::ExternalOrder(e.to_string()))?;

        if !status.is_success() {
            let reason = Self::rejection(status, &text);
            error!("Order rejected: {reason}");
            return Err(BotError::ExternalOrder(reason));
        }

        let ack: OrderAck = serde_json::from_str(&text)
            .map_err(|e| BotError::ExternalOrder(format!("bad order response: {e}")))?;
        if ack.order_id.is_empty() {
            return Err(BotError::ExternalOrder(Self::rejection(status, &text)));
        }

        info!(
            "Order submitted: id={} {} {} @ {}",
            ack.order_id, intent.size, intent.market_side.label(), intent.price
        );
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/order/{order_id}")))
            .send()
            .await
            .map_err(|e| BotError::ExternalOrder(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BotError::ExternalOrder(Self::rejection(status, &text)));
        }
        debug!("Cancelled order {order_id}");
        Ok(())
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>> {
        let resp = self.http.get(self.url("/api/orders")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Network(format!("orders endpoint returned HTTP {status}")));
        }

        let body: Value = resp.json().await?;
        let list = match body {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("orders").or_else(|| obj.remove("data")) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        Ok(list
            .into_iter()
            .filter_map(|v| serde_json::from_value::<OpenOrder>(v).ok())
            .collect())
    }

    async fn wallet(&self) -> Result<WalletInfo> {
        let resp = self.http.get(self.url("/api/wallet")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Network(format!("wallet endpoint returned HTTP {status}")));
        }
        Ok(resp.json().await?)
    }

    async fn health(&self) -> Result<bool> {
        let resp = self.http.get(self.url("/health")).send().await?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Side;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        let config = ApiConfig {
            backend_host: server.uri(),
            ..crate::config::Config::default().api
        };
        BackendClient::new(&config).unwrap()
    }

    fn intent() -> OrderIntent {
        OrderIntent::maker_buy("tok-yes", Side::Yes, 0.50, 10.0).unwrap()
    }

    #[tokio::test]
    async fn test_place_order_returns_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/order"))
            .and(body_partial_json(serde_json::json!({
                "tokenId": "tok-yes",
                "side": "BUY",
                "price": 0.5,
                "size": 20.0
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"orderID": "0xabc", "status": "live"})),
            )
            .mount(&server)
            .await;

        let ack = client(&server).place_order(&intent()).await.unwrap();
        assert_eq!(ack.order_id, "0xabc");
        assert_eq!(intent().size, dec!(20));
    }

    #[tokio::test]
    async fn test_rejection_maps_to_external_order_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/order"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "not enough balance"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).place_order(&intent()).await.unwrap_err();
        match err {
            BotError::ExternalOrder(msg) => assert_eq!(msg, "not enough balance"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_external_order_error() {
        let config = ApiConfig {
            backend_host: "http://127.0.0.1:9".into(),
            request_timeout_secs: 1,
            ..crate::config::Config::default().api
        };
        let gateway = BackendClient::new(&config).unwrap();
        let err = gateway.place_order(&intent()).await.unwrap_err();
        assert_eq!(err.kind(), "external_order");
    }

    #[tokio::test]
    async fn test_wallet_and_open_orders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/wallet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": "0x1",
                "usdcBalance": 42.5,
                "maticBalance": 0.0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "o1", "asset_id": "tok", "side": "BUY", "price": "0.45", "original_size": "10"}
            ])))
            .mount(&server)
            .await;

        let gw = client(&server);
        let wallet = gw.wallet().await.unwrap();
        assert_eq!(wallet.usdc_balance, 42.5);
        assert!(!wallet.can_pay_gas());

        let orders = gw.open_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price, Some(dec!(0.45)));
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/order/o1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        assert!(client(&server).cancel_order("o1").await.is_ok());
        assert!(client(&server).cancel_order("missing").await.is_err());
    }
}
