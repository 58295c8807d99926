pub mod account;
pub mod market;
pub mod opportunity;
pub mod order;
pub mod position;
pub mod trade;
