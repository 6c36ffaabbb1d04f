//! Session-sticky suspension of upstream sources that refuse service

use crate::core::error::MarketError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    RateLimited,
    Forbidden,
    /// Transport failures, timeouts and empty payloads.
    Failed,
}

impl FetchOutcome {
    pub fn of<T>(result: &Result<T, MarketError>) -> Self {
        match result {
            Ok(_) => FetchOutcome::Success,
            Err(MarketError::RateLimited { .. }) => FetchOutcome::RateLimited,
            Err(MarketError::Forbidden { .. }) => FetchOutcome::Forbidden,
            Err(_) => FetchOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionReason {
    RateLimited,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspension {
    pub reason: SuspensionReason,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStatus {
    pub consecutive_failures: u32,
    pub suspension: Option<Suspension>,
}

/// Tracks fetch outcomes per upstream source.
///
/// A rate-limited or forbidden response suspends the source for the rest of
/// the session. Nothing clears a suspension except [`SourceHealth::reset`].
#[derive(Debug, Default)]
pub struct SourceHealth {
    sources: RwLock<HashMap<String, SourceStatus>>,
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, source: &str, outcome: FetchOutcome) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let status = sources.entry(source.to_string()).or_default();

        let reason = match outcome {
            FetchOutcome::Success => {
                status.consecutive_failures = 0;
                return;
            }
            FetchOutcome::Failed => {
                status.consecutive_failures += 1;
                debug!(
                    source,
                    failures = status.consecutive_failures,
                    "Upstream failure recorded"
                );
                return;
            }
            FetchOutcome::RateLimited => SuspensionReason::RateLimited,
            FetchOutcome::Forbidden => SuspensionReason::Forbidden,
        };

        status.consecutive_failures += 1;
        if status.suspension.is_none() {
            warn!(source, ?reason, "Suspending upstream source for this session");
            status.suspension = Some(Suspension {
                reason,
                since: Utc::now(),
            });
        }
    }

    pub fn is_suspended(&self, source: &str) -> bool {
        self.suspension(source).is_some()
    }

    pub fn suspension(&self, source: &str) -> Option<Suspension> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.get(source).and_then(|s| s.suspension)
    }

    pub fn status(&self, source: &str) -> SourceStatus {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.get(source).cloned().unwrap_or_default()
    }

    /// The error to report instead of calling a suspended source.
    pub fn unavailable(&self, source: &str) -> Option<MarketError> {
        self.suspension(source).map(|_| MarketError::SourceUnavailable {
            source_name: source.to_string(),
        })
    }

    /// Forgets every suspension, as a fresh session would.
    pub fn reset(&self) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.clear();
        debug!("Source health reset");
    }
}
