//! Display ranges and the upstream request windows they resolve to

use crate::core::error::MarketError;
use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Window requested upstream when the user asks for a single day.
pub const INTRADAY_REQUEST_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum DisplayRange {
    Intraday,
    OneWeek,
    OneMonth,
    OneYear,
}

impl Display for DisplayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DisplayRange::Intraday => "1D",
                DisplayRange::OneWeek => "1W",
                DisplayRange::OneMonth => "1M",
                DisplayRange::OneYear => "1Y",
            }
        )
    }
}

impl DisplayRange {
    pub const ALL: [DisplayRange; 4] = [
        DisplayRange::Intraday,
        DisplayRange::OneWeek,
        DisplayRange::OneMonth,
        DisplayRange::OneYear,
    ];

    pub fn days(&self) -> u32 {
        match self {
            DisplayRange::Intraday => 1,
            DisplayRange::OneWeek => 7,
            DisplayRange::OneMonth => 30,
            DisplayRange::OneYear => 365,
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.days() == days)
    }

    pub fn to_duration(&self) -> Duration {
        Duration::days(i64::from(self.days()))
    }

    pub fn is_intraday(&self) -> bool {
        *self == DisplayRange::Intraday
    }
}

impl FromStr for DisplayRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "1D" | "1" => Ok(DisplayRange::Intraday),
            "1W" | "7D" | "7" => Ok(DisplayRange::OneWeek),
            "1M" | "30D" | "30" => Ok(DisplayRange::OneMonth),
            "1Y" | "365D" | "365" => Ok(DisplayRange::OneYear),
            _ => Err(anyhow::anyhow!("Invalid display range: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

/// What to ask the upstream for, derived from the range the user selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchWindow {
    pub range: DisplayRange,
    pub requested_range_days: u32,
    pub actual_request_days: u32,
    pub granularity_hint: Granularity,
}

impl FetchWindow {
    /// The caller must clip the normalized series to the trailing 24 hours.
    pub fn clip_to_trailing_day(&self) -> bool {
        self.actual_request_days != self.requested_range_days
    }

    pub fn request_duration(&self) -> Duration {
        Duration::days(i64::from(self.actual_request_days))
    }
}

impl From<DisplayRange> for FetchWindow {
    fn from(range: DisplayRange) -> Self {
        let (actual_request_days, granularity_hint) = match range {
            // Fine samples only come back reliably over a wider window.
            DisplayRange::Intraday => (INTRADAY_REQUEST_DAYS, Granularity::Minute),
            DisplayRange::OneWeek => (range.days(), Granularity::Hour),
            DisplayRange::OneMonth => (range.days(), Granularity::Hour),
            DisplayRange::OneYear => (range.days(), Granularity::Day),
        };
        FetchWindow {
            range,
            requested_range_days: range.days(),
            actual_request_days,
            granularity_hint,
        }
    }
}

/// Resolves a requested day count into a request window.
///
/// Unknown day counts resolve to the one month window, which is handed back
/// inside the error so the caller can both use it and report the substitution.
pub fn resolve(requested_days: u32) -> Result<FetchWindow, MarketError> {
    match DisplayRange::from_days(requested_days) {
        Some(range) => Ok(FetchWindow::from(range)),
        None => Err(MarketError::InvalidRange {
            requested: requested_days,
            fallback: FetchWindow::from(DisplayRange::OneMonth),
        }),
    }
}
