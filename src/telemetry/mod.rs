pub mod alerts;
pub mod latency;
pub mod pnl;
