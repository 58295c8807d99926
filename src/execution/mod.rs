pub mod dispatcher;
pub mod fill_policy;
pub mod gateway;
