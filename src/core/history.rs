//! Upstream price-history abstraction

use crate::core::error::MarketError;
use crate::core::window::FetchWindow;
use async_trait::async_trait;
use serde_json::Value;

/// A third-party API that serves price history for a symbol.
///
/// Implementations only move bytes: they map HTTP failures onto
/// [`MarketError`] and hand back the decoded body untouched. Shape detection
/// and cleanup happen in [`crate::core::series::SeriesNormalizer`].
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Stable name used to key health tracking, e.g. `coingecko`.
    fn name(&self) -> &str;

    async fn fetch_history(
        &self,
        symbol: &str,
        window: &FetchWindow,
        quote_currency: &str,
    ) -> Result<Value, MarketError>;
}
