use super::{PersistedState, StateStore};
use crate::config::SyncConfig;
use crate::error::{BotError, Result};
use crate::models::account::AccountState;
use crate::models::position::Position;
use crate::models::trade::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const TABLE: &str = "bot_states";

/// One row of the shared state table.
#[derive(Debug, Serialize, Deserialize)]
struct StateRow {
    user_id: String,
    bot_state: AccountState,
    #[serde(default)]
    open_positions: Vec<Position>,
    #[serde(default)]
    trades: Vec<Trade>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// PostgREST-backed state store (one row per shared key, upserted).
pub struct RemoteStore {
    base: String,
    api_key: String,
    trade_limit: usize,
    http: reqwest::Client,
}

impl RemoteStore {
    pub fn new(base: &str, api_key: &str, trade_limit: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            trade_limit,
            http,
        })
    }

    /// Build from config; `None` when no remote store is configured.
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>> {
        match (&config.remote_url, &config.remote_api_key) {
            (Some(url), Some(key)) => Ok(Some(Self::new(url, key, config.remote_trade_limit)?)),
            _ => Ok(None),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn persistence_err(e: impl std::fmt::Display) -> BotError {
    BotError::Persistence(e.to_string())
}

#[async_trait]
impl StateStore for RemoteStore {
    async fn load_state(&self, key: &str) -> Result<Option<PersistedState>> {
        let url = Url::parse_with_params(
            &self.table_url(),
            &[("user_id", format!("eq.{key}")), ("select", "*".to_string())],
        )?;

        let resp = self
            .authed(self.http.get(url))
            .send()
            .await
            .map_err(persistence_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Persistence(format!("state select returned HTTP {status}")));
        }

        let rows: Vec<StateRow> = resp.json().await.map_err(persistence_err)?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        debug!("Loaded remote state for {key} (updated {:?})", row.updated_at);

        Ok(Some(PersistedState {
            account: row.bot_state,
            positions: row.open_positions,
            trades: row.trades,
        }))
    }

    async fn save_state(&self, key: &str, state: &PersistedState) -> Result<()> {
        let url = Url::parse_with_params(&self.table_url(), &[("on_conflict", "user_id")])?;
        let row = StateRow {
            user_id: key.to_string(),
            bot_state: state.account.clone(),
            open_positions: state.positions.clone(),
            trades: state.trades.iter().take(self.trade_limit).cloned().collect(),
            updated_at: Some(Utc::now()),
        };

        let resp = self
            .authed(self.http.post(url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row)
            .send()
            .await
            .map_err(persistence_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Persistence(format!(
                "state upsert returned HTTP {status}: {body}"
            )));
        }
        debug!("Saved remote state for {key}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Side;
    use crate::models::opportunity::OpportunityKind;
    use crate::models::position::CloseReason;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn trade(i: usize) -> Trade {
        Trade {
            timestamp: Utc::now(),
            strategy: OpportunityKind::Scalp,
            market: format!("m{i}"),
            market_id: format!("m{i}"),
            side: Side::Yes,
            entry_price: 0.5,
            exit_price: 0.51,
            size: 1.0,
            gross_pnl: 0.02,
            fees: 0.01,
            profit: 0.01,
            close_reason: CloseReason::TakeProfit,
        }
    }

    #[tokio::test]
    async fn test_load_selects_by_key() {
        let server = MockServer::start().await;
        let row = serde_json::json!([{
            "user_id": "shared",
            "bot_state": AccountState::new(250.0),
            "open_positions": [],
            "trades": [trade(1)],
            "updated_at": "2026-01-01T00:00:00Z"
        }]);
        Mock::given(method("GET"))
            .and(path("/rest/v1/bot_states"))
            .and(query_param("user_id", "eq.shared"))
            .and(header("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(row))
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri(), "secret", 50).unwrap();
        let state = store.load_state("shared").await.unwrap().unwrap();
        assert!((state.account.balance - 250.0).abs() < 1e-9);
        assert_eq!(state.trades.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_row_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/bot_states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri(), "secret", 50).unwrap();
        assert!(store.load_state("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_upserts_and_caps_trades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/bot_states"))
            .and(query_param("on_conflict", "user_id"))
            .and(header("Prefer", "resolution=merge-duplicates"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri(), "secret", 50).unwrap();
        let state = PersistedState {
            trades: (0..80).map(trade).collect(),
            ..PersistedState::default()
        };
        store.save_state("shared", &state).await.unwrap();

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["trades"].as_array().unwrap().len(), 50);
        assert_eq!(body["user_id"], "shared");
    }

    #[tokio::test]
    async fn test_server_error_is_persistence_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri(), "secret", 50).unwrap();
        let err = store
            .save_state("shared", &PersistedState::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence");
    }
}
