pub mod local;
pub mod remote;

use crate::error::Result;
use crate::models::account::AccountState;
use crate::models::position::Position;
use crate::models::trade::Trade;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything needed to rebuild the engine after a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub account: AccountState,
    pub positions: Vec<Position>,
    pub trades: Vec<Trade>, // newest first
}

/// Durable home for engine state. Implementations are best-effort: callers
/// log failures and retry on the next cycle.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self, key: &str) -> Result<Option<PersistedState>>;

    async fn save_state(&self, key: &str, state: &PersistedState) -> Result<()>;

    fn name(&self) -> &'static str;
}
