use thiserror::Error;

/// Typed failures surfaced by the hedge engine
#[derive(Debug, Error)]
pub enum HedgeError {
    #[error("no price available for {symbol} on either venue")]
    NoPriceAvailable { symbol: String },

    #[error("no hedge leg could be opened for {symbol}")]
    NoLegOpened { symbol: String },

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("invalid sizing: {0}")]
    InvalidSizing(String),
}
