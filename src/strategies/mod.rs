pub mod arbitrage;
pub mod extreme_price;
pub mod momentum;
pub mod orchestrator;
