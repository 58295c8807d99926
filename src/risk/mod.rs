pub mod fees;
pub mod position_manager;
pub mod sizing;
