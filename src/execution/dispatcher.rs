use crate::config::DispatchConfig;
use crate::error::{BotError, Result};
use crate::execution::gateway::OrderGateway;
use crate::feeds::markets::MarketClient;
use crate::models::account::Mode;
use crate::models::market::Side;
use crate::models::order::OrderIntent;
use crate::models::position::Position;
use crate::risk::position_manager::EntryOrder;
use crate::risk::sizing::Sizing;
use crate::runtime::actor::{EngineHandle, EntryPlan};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing to do: stopped, at capacity, or no enterable opportunity.
    Idle,
    Opened(Position),
    /// The plan went stale before commit.
    Dropped(String),
}

/// One entry attempt per tick: plan from live engine state, price maker-style,
/// relay a live order when in live mode, then commit.
pub struct Dispatcher {
    engine: EngineHandle,
    config: DispatchConfig,
    books: Option<Arc<MarketClient>>,
    gateway: Option<Arc<dyn OrderGateway>>,
}

impl Dispatcher {
    pub fn new(engine: EngineHandle, config: DispatchConfig) -> Self {
        Self {
            engine,
            config,
            books: None,
            gateway: None,
        }
    }

    /// Price entries off the live order book instead of snapshot quotes.
    pub fn with_books(mut self, client: Arc<MarketClient>) -> Self {
        self.books = Some(client);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn OrderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub async fn tick(&self) -> Result<TickOutcome> {
        let Some(plan) = self.engine.plan_entry().await? else {
            return Ok(TickOutcome::Idle);
        };

        let (bid, ask) = self.quotes(&plan).await;
        let mut order = self.price(&plan, bid, ask);

        if plan.mode == Mode::Live {
            match self.relay(&plan, bid).await {
                Ok(order_id) => order.live_order_id = Some(order_id),
                Err(e) => {
                    warn!("Live order failed for {}: {e}", plan.opportunity.market.slug);
                    self.engine.report_error(&e, false).await;
                    return Err(e);
                }
            }
        }

        match self.engine.commit_entry(order).await {
            Ok(position) => {
                info!(
                    "ENTRY [{}] {} {} size=${:.2} signal=\"{}\"",
                    position.strategy,
                    position.side.label(),
                    position.market_slug,
                    position.size,
                    position.signal
                );
                Ok(TickOutcome::Opened(position))
            }
            Err(BotError::Validation(reason)) => {
                debug!("Entry dropped at commit: {reason}");
                Ok(TickOutcome::Dropped(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Held-token bid and ask. Order book first, snapshot quotes as fallback.
    async fn quotes(&self, plan: &EntryPlan) -> (f64, f64) {
        let market = &plan.opportunity.market;
        let fallback = (market.bid(plan.side), market.ask(plan.side));

        let (Some(client), Some(token)) = (&self.books, market.token_id(plan.side)) else {
            return fallback;
        };
        match client.fetch_order_book(token).await {
            Ok(book) => match book.top_of_book() {
                Some(top) => top,
                None => {
                    debug!("Empty or crossed book for {}, using snapshot quotes", market.slug);
                    fallback
                }
            },
            Err(e) => {
                debug!("Order book fetch failed for {}: {e}", market.slug);
                fallback
            }
        }
    }

    fn price(&self, plan: &EntryPlan, bid: f64, ask: f64) -> EntryOrder {
        let market = &plan.opportunity.market;
        let side = plan.side;
        let entry_price = side.to_reference(bid);

        EntryOrder {
            market_id: market.id.clone(),
            market_slug: market.slug.clone(),
            question: market.question.clone(),
            token_id: market.token_id(side).map(str::to_string),
            side,
            entry_price,
            take_profit: side.to_reference(ask),
            stop_loss: Sizing::stop_price(entry_price, side == Side::Yes, self.config.stop_loss_pct),
            size: plan.size,
            max_hold_secs: self.config.max_hold_secs,
            strategy: plan.opportunity.kind,
            signal: plan.opportunity.signal.clone(),
            live_order_id: None,
        }
    }

    async fn relay(&self, plan: &EntryPlan, bid: f64) -> Result<String> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| BotError::ExternalOrder("no trading gateway configured".into()))?;
        let token = plan
            .opportunity
            .market
            .token_id(plan.side)
            .ok_or_else(|| BotError::ExternalOrder("market has no token ids".into()))?;
        let intent = OrderIntent::maker_buy(token, plan.side, bid, plan.size)
            .ok_or_else(|| BotError::ExternalOrder(format!("order too small at {bid:.3}")))?;

        let ack = gateway.place_order(&intent).await?;
        Ok(ack.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, EngineConfig};
    use crate::models::market::MarketSnapshot;
    use crate::models::opportunity::StrategyCode;
    use crate::models::position::OrderStatus;
    use crate::risk::position_manager::PositionManager;
    use crate::runtime::actor::EngineActor;
    use crate::strategies::orchestrator::StrategyOrchestrator;

    async fn running_engine() -> EngineHandle {
        let engine = EngineConfig {
            active_strategies: [StrategyCode::A].into_iter().collect(),
            ..EngineConfig::default()
        };
        let (handle, _) = EngineActor::new(
            PositionManager::new(engine),
            StrategyOrchestrator::new(DetectorConfig::default()),
            DispatchConfig::default(),
        )
        .spawn();
        handle.start().await.unwrap();
        handle
    }

    #[tokio::test]
    async fn test_tick_opens_cheaper_leg_at_bid() {
        let engine = running_engine().await;
        engine
            .apply_snapshot(vec![MarketSnapshot::from_prices("arb", 0.40, 0.45, 0.0)])
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(engine.clone(), DispatchConfig::default());
        let TickOutcome::Opened(pos) = dispatcher.tick().await.unwrap() else {
            panic!("expected an entry");
        };
        assert_eq!(pos.side, Side::Yes);
        assert_eq!(pos.order_status, OrderStatus::Pending);
        assert!((pos.entry_price - 0.396).abs() < 1e-9);
        assert!((pos.take_profit - 0.404).abs() < 1e-9);
        assert!((pos.stop_loss - 0.396 * 0.97).abs() < 1e-9);
        assert!((engine.status().account.balance - 285.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_second_tick_skips_held_market() {
        let engine = running_engine().await;
        engine
            .apply_snapshot(vec![MarketSnapshot::from_prices("arb", 0.40, 0.45, 0.0)])
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(engine.clone(), DispatchConfig::default());
        assert!(matches!(dispatcher.tick().await.unwrap(), TickOutcome::Opened(_)));
        assert!(matches!(dispatcher.tick().await.unwrap(), TickOutcome::Idle));
        assert_eq!(engine.positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_live_mode_without_gateway_aborts() {
        let engine = running_engine().await;
        engine.set_mode(Mode::Live).await.unwrap();
        engine
            .apply_snapshot(vec![MarketSnapshot::from_prices("arb", 0.40, 0.45, 0.0)])
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(engine.clone(), DispatchConfig::default());
        let err = dispatcher.tick().await.unwrap_err();
        assert_eq!(err.kind(), "external_order");
        assert!(engine.positions().await.unwrap().is_empty());
    }
}
