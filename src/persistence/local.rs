//! Durable local copy of engine state.
//!
//! Three independent JSON files live in the data directory:
//! `account.json`, `positions.json` and `trades.json`. Each is read on its own,
//! so a corrupt trade history does not cost the account balance.

use super::{PersistedState, StateStore};
use crate::error::{BotError, Result};
use crate::models::account::AccountState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ACCOUNT_FILE: &str = "account.json";
const POSITIONS_FILE: &str = "positions.json";
const TRADES_FILE: &str = "trades.json";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Missing file is `None`. A corrupt file is logged and treated as missing.
    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read state file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt state file ignored");
                None
            }
        }
    }
}

#[async_trait]
impl StateStore for LocalStore {
    /// The key is ignored: one data directory holds one account.
    async fn load_state(&self, _key: &str) -> Result<Option<PersistedState>> {
        let Some(account) = self.read_json::<AccountState>(ACCOUNT_FILE).await else {
            info!(dir = %self.dir.display(), "No local account file, starting fresh");
            return Ok(None);
        };
        let positions = self.read_json(POSITIONS_FILE).await.unwrap_or_default();
        let trades = self.read_json(TRADES_FILE).await.unwrap_or_default();

        Ok(Some(PersistedState {
            account,
            positions,
            trades,
        }))
    }

    async fn save_state(&self, _key: &str, state: &PersistedState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BotError::Persistence(format!("{}: {e}", self.dir.display())))?;

        self.write_json(ACCOUNT_FILE, &state.account).await?;
        self.write_json(POSITIONS_FILE, &state.positions).await?;
        self.write_json(TRADES_FILE, &state.trades).await?;

        debug!(
            dir = %self.dir.display(),
            positions = state.positions.len(),
            trades = state.trades.len(),
            "Saved local state"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
