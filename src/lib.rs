pub mod config;
pub mod error;
pub mod execution;
pub mod feeds;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod runtime;
pub mod strategies;
pub mod telemetry;
