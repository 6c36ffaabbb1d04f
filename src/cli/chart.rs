use super::ui;
use crate::core::config::AppConfig;
use crate::core::error::MarketError;
use crate::core::health::SourceHealth;
use crate::core::series::Series;
use crate::core::window::{self, FetchWindow};
use crate::dashboard::Market;
use crate::feed::{FeedSettings, MarketFeed, SeriesState, Selection};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub market: Market,
    pub symbol: Option<String>,
    pub range_days: u32,
    /// How many of the most recent points to list.
    pub points: usize,
    pub watch: bool,
}

/// Resolves the range, telling the user when the fallback was substituted.
pub fn resolve_window(range_days: u32) -> Result<FetchWindow> {
    window::resolve(range_days).or_else(|err| {
        let MarketError::InvalidRange { fallback, .. } = err else {
            return Err(err.into());
        };
        eprintln!("{}", ui::style_text(&err.user_message(), ui::StyleType::Warning));
        Ok(fallback)
    })
}

pub fn render_series(series: &Series, quote_currency: &str, max_points: usize) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Time"),
        ui::header_cell(&format!("Price ({})", quote_currency.to_uppercase())),
    ]);

    let skip = series.points.len().saturating_sub(max_points);
    for (label, point) in series.labels.iter().zip(&series.points).skip(skip) {
        table.add_row(vec![Cell::new(label), ui::amount_cell(point.price)]);
    }

    let mut summary = ui::new_styled_table();
    summary.set_header(vec![
        ui::header_cell("Points"),
        ui::header_cell("First"),
        ui::header_cell("Last"),
        ui::header_cell(&format!("Change ({})", series.range)),
    ]);
    let first = series.points.first().map(|p| p.price);
    let last = series.last_price();
    summary.add_row(vec![
        Cell::new(series.points.len()).set_alignment(CellAlignment::Right),
        ui::format_optional_cell(first, |p| format!("{:.2}", p.round_dp(2))),
        ui::format_optional_cell(last, |p| format!("{:.2}", p.round_dp(2))),
        match first.zip(last) {
            Some((first, last)) => ui::change_cell(first, last),
            None => Cell::new("N/A"),
        },
    ]);

    format!(
        "{} {}\n\n{table}\n{summary}",
        ui::style_text(&series.symbol, ui::StyleType::Title),
        ui::style_text(&series.range.to_string(), ui::StyleType::Subtle),
    )
}

pub fn render_state(state: &SeriesState, quote_currency: &str, max_points: usize) -> String {
    match state {
        SeriesState::Pending => ui::style_text("Loading...", ui::StyleType::Subtle),
        SeriesState::Ready(series) => render_series(series, quote_currency, max_points),
        SeriesState::Empty { error, .. } => {
            ui::style_text(&error.user_message(), ui::StyleType::Warning)
        }
        SeriesState::Unavailable(error) | SeriesState::Failed(error) => {
            ui::style_text(&error.user_message(), ui::StyleType::Error)
        }
    }
}

pub async fn run(config: &AppConfig, options: &ChartOptions) -> Result<()> {
    let source = options.market.source(config)?;
    let settings = FeedSettings::from_config(config)?;
    let quote_currency = settings.quote_currency.clone();
    let window = resolve_window(options.range_days)?;
    let symbol = options
        .symbol
        .as_deref()
        .unwrap_or(options.market.default_symbol())
        .to_uppercase();
    debug!(%symbol, market = %options.market, "Starting chart");

    let feed = MarketFeed::spawn(
        source,
        Arc::new(SourceHealth::new()),
        settings,
        Selection {
            symbol: symbol.clone(),
            window,
        },
    );
    let mut updates = feed.subscribe();

    let spinner = ui::new_spinner(&format!("Fetching {symbol} history..."));
    let state = updates.wait_for(SeriesState::is_settled).await?.clone();
    spinner.finish_and_clear();
    println!("{}", render_state(&state, &quote_currency, options.points));

    if !options.watch {
        return Ok(());
    }
    if !window.range.is_intraday() {
        println!(
            "\n{}",
            ui::style_text(
                "Only the intraday range refreshes on its own; nothing to watch.",
                ui::StyleType::Subtle
            )
        );
        return Ok(());
    }

    println!(
        "\n{}",
        ui::style_text("Watching for updates, press Ctrl-C to stop", ui::StyleType::Subtle)
    );
    loop {
        tokio::select! {
            changed = updates.changed() => {
                changed?;
                let state = updates.borrow_and_update().clone();
                ui::print_separator();
                println!("{}", render_state(&state, &quote_currency, options.points));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::{LabelResolution, PricePoint};
    use crate::core::window::DisplayRange;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn series() -> Series {
        let points = (0..5)
            .map(|i| PricePoint {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1 + i, 12, 0, 0).unwrap(),
                price: Decimal::from(100 + i * 10),
            })
            .collect::<Vec<_>>();
        Series {
            symbol: "SPY".to_string(),
            range: DisplayRange::OneWeek,
            resolution: LabelResolution::DayAndTime,
            labels: (1..=5).map(|d| format!("0{d}/03 13:00")).collect(),
            points,
        }
    }

    #[test]
    fn test_render_series_lists_latest_points() {
        let output = render_series(&series(), "eur", 2);
        assert!(output.contains("Price (EUR)"));
        assert!(output.contains("05/03 13:00"));
        assert!(output.contains("04/03 13:00"));
        assert!(!output.contains("03/03 13:00"));
        assert!(output.contains("40.00%"));
    }

    #[test]
    fn test_render_state_shows_user_message() {
        let state = SeriesState::Unavailable(MarketError::SourceUnavailable {
            source_name: "coingecko".to_string(),
        });
        assert!(render_state(&state, "EUR", 10).contains("coingecko is unavailable"));
    }

    #[test]
    fn test_resolve_window_falls_back() {
        assert_eq!(resolve_window(90).unwrap().range, DisplayRange::OneMonth);
        assert_eq!(resolve_window(1).unwrap().actual_request_days, 7);
    }
}
