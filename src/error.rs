use thiserror::Error;

/// Error taxonomy shared by the fetcher, dispatcher, gateway and sync layers.
///
/// None of these halt the engine. `ExternalOrder` only blocks the entry that
/// raised it.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid record: {0}")]
    Validation(String),

    #[error("order rejected: {0}")]
    ExternalOrder(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("engine unavailable")]
    EngineClosed,
}

impl BotError {
    /// Short tag used in logs and the status surface.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Network(_) => "network",
            BotError::Validation(_) => "validation",
            BotError::ExternalOrder(_) => "external_order",
            BotError::Persistence(_) => "persistence",
            BotError::Config(_) => "config",
            BotError::EngineClosed => "engine_closed",
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::Network(e.to_string())
    }
}

impl From<url::ParseError> for BotError {
    fn from(e: url::ParseError) -> Self {
        BotError::Config(e.to_string())
    }
}

impl From<std::io::Error> for BotError {
    fn from(e: std::io::Error) -> Self {
        BotError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(BotError::Network("x".into()).kind(), "network");
        assert_eq!(BotError::ExternalOrder("x".into()).kind(), "external_order");
        assert_eq!(BotError::EngineClosed.kind(), "engine_closed");
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BotError = io.into();
        assert!(matches!(err, BotError::Persistence(_)));
    }
}
