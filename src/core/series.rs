//! Normalization of upstream price history into display-ready series

use crate::core::error::MarketError;
use crate::core::window::{DisplayRange, FetchWindow};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_LABEL_TIMEZONE: Tz = chrono_tz::Europe::Madrid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LabelResolution {
    /// `HH:MM`
    Time,
    /// `DD/MM HH:MM`
    DayAndTime,
    /// `DD/MM`
    Day,
}

impl LabelResolution {
    pub fn for_range(range: DisplayRange) -> Self {
        match range {
            DisplayRange::Intraday => LabelResolution::Time,
            DisplayRange::OneWeek => LabelResolution::DayAndTime,
            DisplayRange::OneMonth | DisplayRange::OneYear => LabelResolution::Day,
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            LabelResolution::Time => "%H:%M",
            LabelResolution::DayAndTime => "%d/%m %H:%M",
            LabelResolution::Day => "%d/%m",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub symbol: String,
    pub range: DisplayRange,
    pub resolution: LabelResolution,
    pub points: Vec<PricePoint>,
    /// One label per point, rendered in the normalizer's time zone.
    pub labels: Vec<String>,
}

impl Series {
    pub fn empty(symbol: &str, range: DisplayRange) -> Self {
        Series {
            symbol: symbol.to_string(),
            range,
            resolution: LabelResolution::for_range(range),
            points: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.points.last().map(|p| p.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochUnit {
    Seconds,
    Millis,
}

/// Shapes of upstream history payloads understood by the normalizer.
#[derive(Debug)]
enum RawPayload<'a> {
    /// `[[timestamp_ms, price], ...]`
    Pairs(&'a [Value]),
    /// Parallel timestamp and close arrays.
    Columns {
        timestamps: &'a [Value],
        closes: &'a [Value],
        unit: EpochUnit,
    },
}

impl<'a> RawPayload<'a> {
    fn detect(body: &'a Value) -> Option<Self> {
        if let Some(rows) = body.get("prices").and_then(Value::as_array) {
            return Some(RawPayload::Pairs(rows));
        }

        let flat = column(body, &["t", "timestamp"]).zip(column(body, &["c", "close"]));
        if let Some((timestamps, closes)) = flat {
            return Some(RawPayload::Columns {
                timestamps,
                closes,
                unit: EpochUnit::Seconds,
            });
        }

        // Yahoo nests its columns under chart.result[0]
        let item = body.pointer("/chart/result/0")?;
        let timestamps = item.get("timestamp").and_then(Value::as_array)?;
        let closes = item
            .pointer("/indicators/quote/0/close")
            .and_then(Value::as_array)?;
        Some(RawPayload::Columns {
            timestamps,
            closes,
            unit: EpochUnit::Seconds,
        })
    }

    fn points(&self) -> Vec<PricePoint> {
        match self {
            RawPayload::Pairs(rows) => rows
                .iter()
                .filter_map(|row| {
                    let pair = row.as_array()?;
                    let timestamp = parse_timestamp(pair.first()?, EpochUnit::Millis)?;
                    let price = parse_price(pair.get(1)?)?;
                    Some(PricePoint { timestamp, price })
                })
                .collect(),
            RawPayload::Columns {
                timestamps,
                closes,
                unit,
            } => timestamps
                .iter()
                .zip(closes.iter())
                .filter_map(|(ts, close)| {
                    Some(PricePoint {
                        timestamp: parse_timestamp(ts, *unit)?,
                        price: parse_price(close)?,
                    })
                })
                .collect(),
        }
    }
}

fn column<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a [Value]> {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
}

fn parse_timestamp(value: &Value, unit: EpochUnit) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    match unit {
        EpochUnit::Millis => DateTime::from_timestamp_millis(raw),
        EpochUnit::Seconds => DateTime::from_timestamp(raw, 0),
    }
}

/// Parses a price without going through floating point, so nothing
/// non-finite can come out of it.
fn parse_price(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesNormalizer {
    tz: Tz,
}

impl Default for SeriesNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_TIMEZONE)
    }
}

impl SeriesNormalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Turns an upstream payload into a time-ordered, labelled series.
    ///
    /// Points that fail to parse are dropped. Samples later than `now` are
    /// discarded for every range, and intraday windows are clipped to the 24
    /// hours before `now`. An unrecognized payload or one that ends up with no
    /// points is reported as [`MarketError::NoData`].
    pub fn normalize(
        &self,
        symbol: &str,
        window: &FetchWindow,
        body: &Value,
        now: DateTime<Utc>,
    ) -> Result<Series, MarketError> {
        let no_data = || MarketError::NoData {
            symbol: symbol.to_string(),
            range: window.range,
        };

        let payload = RawPayload::detect(body).ok_or_else(no_data)?;
        let mut points = payload.points();
        let parsed = points.len();

        let oldest = if window.clip_to_trailing_day() {
            Some(now - Duration::hours(24))
        } else {
            None
        };
        points.retain(|p| p.timestamp <= now && oldest.is_none_or(|o| p.timestamp >= o));

        points.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.price.cmp(&b.price))
        });
        points.dedup_by_key(|p| p.timestamp);

        debug!(
            symbol,
            range = %window.range,
            parsed,
            kept = points.len(),
            "Normalized price history"
        );

        if points.is_empty() {
            return Err(no_data());
        }

        let resolution = LabelResolution::for_range(window.range);
        let labels = points
            .iter()
            .map(|p| {
                p.timestamp
                    .with_timezone(&self.tz)
                    .format(resolution.pattern())
                    .to_string()
            })
            .collect();

        Ok(Series {
            symbol: symbol.to_string(),
            range: window.range,
            resolution,
            points,
            labels,
        })
    }
}
