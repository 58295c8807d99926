pub mod history;
pub mod markets;
