//! Error taxonomy shared by the market-data engine

use crate::core::window::{DisplayRange, FetchWindow};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Unsupported range of {requested} days, showing {} instead", fallback.range)]
    InvalidRange {
        requested: u32,
        fallback: FetchWindow,
    },

    #[error("No data available for {symbol} over {range}")]
    NoData { symbol: String, range: DisplayRange },

    #[error("{source_name} is rate limiting requests")]
    RateLimited { source_name: String },

    #[error("{source_name} refused the request")]
    Forbidden { source_name: String },

    #[error("{source_name} is disabled for this session")]
    SourceUnavailable { source_name: String },

    #[error("Request to {source_name} failed: {message}")]
    Transport {
        source_name: String,
        message: String,
    },
}

impl MarketError {
    /// Errors the caller may retry on its own schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::Transport { .. })
    }

    pub fn suspends_source(&self) -> bool {
        matches!(
            self,
            MarketError::RateLimited { .. } | MarketError::Forbidden { .. }
        )
    }

    /// Text suitable for a degraded-mode banner.
    pub fn user_message(&self) -> String {
        match self {
            MarketError::InvalidRange { fallback, .. } => {
                format!("Unknown range, showing {} instead.", fallback.range)
            }
            MarketError::NoData { symbol, .. } => {
                format!("No data available for {symbol}. Try another symbol.")
            }
            MarketError::RateLimited { source_name } => format!(
                "{source_name} is busy right now. Prices will not refresh until the app is restarted."
            ),
            MarketError::Forbidden { source_name } => {
                format!("{source_name} has been disabled for this session.")
            }
            MarketError::SourceUnavailable { source_name } => {
                format!("{source_name} is unavailable for this session.")
            }
            MarketError::Transport { source_name, .. } => {
                format!("Could not reach {source_name}. Please try again.")
            }
        }
    }
}
