//! Live price-history feed for one market view
//!
//! A [`MarketFeed`] owns a background worker that reacts to selection
//! changes with an immediate fetch and, while the intraday range is shown,
//! ticks on a short interval but only calls out once the cooldown since the
//! last real fetch has elapsed. The latest display state is published on a
//! watch channel.

use crate::core::config::AppConfig;
use crate::core::error::MarketError;
use crate::core::health::{FetchOutcome, SourceHealth};
use crate::core::history::HistorySource;
use crate::core::refresh::{DEFAULT_COOLDOWN, DEFAULT_TICK_INTERVAL, Decision, RefreshState};
use crate::core::series::{Series, SeriesNormalizer};
use crate::core::window::{self, FetchWindow};
use anyhow::Result;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub tick_interval: Duration,
    pub cooldown: Duration,
    pub quote_currency: String,
    pub normalizer: SeriesNormalizer,
}

impl FeedSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(FeedSettings {
            tick_interval: config.refresh.tick_interval(),
            cooldown: config.refresh.cooldown(),
            quote_currency: config.quote_currency.clone(),
            normalizer: SeriesNormalizer::new(config.label_timezone()?),
        })
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            tick_interval: DEFAULT_TICK_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            quote_currency: "EUR".to_string(),
            normalizer: SeriesNormalizer::default(),
        }
    }
}

/// What the chart for a market view should show right now.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesState {
    Pending,
    Ready(Arc<Series>),
    /// The source answered but had nothing for this symbol and range.
    Empty {
        series: Arc<Series>,
        error: MarketError,
    },
    /// The source refused service and is suspended for the session.
    Unavailable(MarketError),
    /// A transport failure; a later refresh may succeed.
    Failed(MarketError),
}

impl SeriesState {
    pub fn series(&self) -> Option<&Series> {
        match self {
            SeriesState::Ready(series) | SeriesState::Empty { series, .. } => Some(series),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&MarketError> {
        match self {
            SeriesState::Empty { error, .. }
            | SeriesState::Unavailable(error)
            | SeriesState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, SeriesState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub symbol: String,
    pub window: FetchWindow,
}

#[derive(Debug)]
enum Command {
    SelectSymbol(String),
    SelectWindow(FetchWindow),
}

/// Handle to a running feed. Dropping it stops the worker and its timers.
pub struct MarketFeed {
    source_name: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SeriesState>,
    worker: JoinHandle<()>,
}

impl MarketFeed {
    /// Starts the worker and immediately fetches the initial selection.
    pub fn spawn(
        source: Arc<dyn HistorySource>,
        health: Arc<SourceHealth>,
        settings: FeedSettings,
        selection: Selection,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SeriesState::Pending);
        let source_name = source.name().to_string();

        let worker = FeedWorker {
            refresh: RefreshState::new(settings.cooldown),
            source,
            health,
            settings,
            selection,
            generation: 0,
            ticker: None,
            in_flight: FuturesUnordered::new(),
            state: state_tx,
        };
        let worker = tokio::spawn(worker.run(receiver));

        MarketFeed {
            source_name,
            commands,
            state,
            worker,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn select_symbol(&self, symbol: &str) {
        self.send(Command::SelectSymbol(symbol.trim().to_string()));
    }

    /// Switches the displayed range. An unknown day count switches to the
    /// fallback window and returns the validation error describing it.
    pub fn select_range(&self, range_days: u32) -> Result<(), MarketError> {
        match window::resolve(range_days) {
            Ok(window) => {
                self.send(Command::SelectWindow(window));
                Ok(())
            }
            Err(err) => {
                if let MarketError::InvalidRange { fallback, .. } = &err {
                    self.send(Command::SelectWindow(*fallback));
                }
                Err(err)
            }
        }
    }

    pub fn current_series(&self) -> SeriesState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SeriesState> {
        self.state.clone()
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(source = %self.source_name, "Feed worker is gone, dropping {:?}", e.0);
        }
    }
}

impl Drop for MarketFeed {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct Completed {
    generation: u64,
    selection: Selection,
    result: Result<Value, MarketError>,
}

struct FeedWorker {
    source: Arc<dyn HistorySource>,
    health: Arc<SourceHealth>,
    settings: FeedSettings,
    selection: Selection,
    /// Bumped on every selection change; older completions are stale.
    generation: u64,
    refresh: RefreshState,
    ticker: Option<Interval>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completed>>,
    state: watch::Sender<SeriesState>,
}

impl FeedWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.begin_selection(true);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.complete(done)
                }
                _ = next_tick(&mut self.ticker) => self.tick(),
            }
        }
        debug!(source = self.source.name(), "Feed worker stopped");
    }

    fn handle(&mut self, command: Command) {
        let changed = match command {
            Command::SelectSymbol(symbol) if symbol != self.selection.symbol => {
                self.selection.symbol = symbol;
                Some(true)
            }
            Command::SelectWindow(window) if window != self.selection.window => {
                self.selection.window = window;
                Some(false)
            }
            _ => None,
        };
        if let Some(new_symbol) = changed {
            info!(
                symbol = %self.selection.symbol,
                range = %self.selection.window.range,
                "Selection changed"
            );
            self.begin_selection(new_symbol);
        }
    }

    fn begin_selection(&mut self, new_symbol: bool) {
        self.generation += 1;
        self.ticker = None;

        let suspended = self.health.is_suspended(self.source.name());
        match self.refresh.on_selection(Instant::now(), suspended, new_symbol) {
            Decision::Fetch => {
                self.state.send_replace(SeriesState::Pending);
                self.spawn_fetch();
            }
            _ => self.publish_unavailable(),
        }
    }

    fn tick(&mut self) {
        let suspended = self.health.is_suspended(self.source.name());
        match self.refresh.on_tick(Instant::now(), suspended) {
            Decision::Fetch => {
                info!(symbol = %self.selection.symbol, "Cooldown elapsed, refreshing");
                self.spawn_fetch();
            }
            Decision::CoolingDown { remaining } => {
                debug!(
                    symbol = %self.selection.symbol,
                    remaining_secs = remaining.as_secs(),
                    "Tick inside cooldown, no request"
                );
            }
            Decision::InFlight => debug!("Tick skipped, fetch still in flight"),
            Decision::Suspended => {
                self.ticker = None;
                self.publish_unavailable();
            }
            Decision::Inactive => self.ticker = None,
        }
    }

    fn spawn_fetch(&mut self) {
        let source = Arc::clone(&self.source);
        let selection = self.selection.clone();
        let generation = self.generation;
        let quote_currency = self.settings.quote_currency.clone();
        info!(
            source = source.name(),
            symbol = %selection.symbol,
            days = selection.window.actual_request_days,
            "Fetching price history"
        );

        self.in_flight.push(
            async move {
                let result = source
                    .fetch_history(&selection.symbol, &selection.window, &quote_currency)
                    .await;
                Completed {
                    generation,
                    selection,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn complete(&mut self, done: Completed) {
        let outcome = FetchOutcome::of(&done.result);
        self.health.observe(self.source.name(), outcome);

        if done.generation != self.generation {
            debug!(symbol = %done.selection.symbol, "Discarding stale fetch result");
            return;
        }

        let intraday = done.selection.window.range.is_intraday();
        self.refresh.on_fetch_finished(outcome, intraday);

        let normalized = done.result.and_then(|body| {
            self.settings.normalizer.normalize(
                &done.selection.symbol,
                &done.selection.window,
                &body,
                Utc::now(),
            )
        });
        let state = match normalized {
            Ok(series) => SeriesState::Ready(Arc::new(series)),
            Err(error @ MarketError::NoData { .. }) => SeriesState::Empty {
                series: Arc::new(Series::empty(
                    &done.selection.symbol,
                    done.selection.window.range,
                )),
                error,
            },
            Err(error) if error.suspends_source() => SeriesState::Unavailable(error),
            Err(error) => SeriesState::Failed(error),
        };
        if let Some(error) = state.error() {
            warn!(symbol = %done.selection.symbol, %error, "Price history unavailable");
        }
        self.state.send_replace(state);

        if !self.refresh.ticking {
            self.ticker = None;
        } else if self.ticker.is_none() {
            let period = self.settings.tick_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
        }
    }

    fn publish_unavailable(&mut self) {
        let error = self
            .health
            .unavailable(self.source.name())
            .unwrap_or_else(|| MarketError::SourceUnavailable {
                source_name: self.source.name().to_string(),
            });
        debug!(source = self.source.name(), "Skipping request to suspended source");
        self.state.send_replace(SeriesState::Unavailable(error));
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::DisplayRange;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const MINUTE: Duration = Duration::from_secs(60);

    type Behavior = Box<dyn Fn(&str) -> Result<Value, MarketError> + Send + Sync>;

    #[derive(Debug, Clone)]
    struct Call {
        symbol: String,
        days: u32,
        at: Instant,
    }

    struct MockSource {
        calls: Mutex<Vec<Call>>,
        delays: HashMap<String, Duration>,
        behavior: Behavior,
    }

    impl MockSource {
        fn new(behavior: Behavior) -> Arc<Self> {
            Self::with_delays(behavior, HashMap::new())
        }

        fn with_delays(behavior: Behavior, delays: HashMap<String, Duration>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                delays,
                behavior,
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HistorySource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_history(
            &self,
            symbol: &str,
            window: &FetchWindow,
            _quote_currency: &str,
        ) -> Result<Value, MarketError> {
            self.calls.lock().unwrap().push(Call {
                symbol: symbol.to_string(),
                days: window.actual_request_days,
                at: Instant::now(),
            });
            if let Some(delay) = self.delays.get(symbol) {
                tokio::time::sleep(*delay).await;
            }
            (self.behavior)(symbol)
        }
    }

    fn prices(symbol: &str) -> Result<Value, MarketError> {
        let price = if symbol == "ETH" { 3000.0 } else { 60000.0 };
        let ts = Utc::now().timestamp_millis() - 60_000;
        Ok(json!({ "prices": [[ts, price]] }))
    }

    fn selection(symbol: &str, days: u32) -> Selection {
        Selection {
            symbol: symbol.to_string(),
            window: window::resolve(days).unwrap(),
        }
    }

    async fn settled(feed: &MarketFeed) -> SeriesState {
        let mut rx = feed.subscribe();
        let state = rx.wait_for(SeriesState::is_settled).await.unwrap().clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_intraday_fetches_at_most_once_per_cooldown() {
        let source = MockSource::new(Box::new(prices));
        let feed = MarketFeed::spawn(
            source.clone(),
            Arc::new(SourceHealth::new()),
            FeedSettings::default(),
            selection("BTC", 1),
        );

        let state = settled(&feed).await;
        assert_eq!(state.series().unwrap().symbol, "BTC");

        tokio::time::sleep(MINUTE * 20 + Duration::from_secs(1)).await;

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.days == 7));
        for pair in calls.windows(2) {
            assert!(pair[1].at - pair[0].at >= MINUTE * 10);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_intraday_stops_ticking() {
        let source = MockSource::new(Box::new(prices));
        let feed = MarketFeed::spawn(
            source.clone(),
            Arc::new(SourceHealth::new()),
            FeedSettings::default(),
            selection("BTC", 1),
        );
        settled(&feed).await;

        feed.select_range(30).unwrap();
        tokio::time::sleep(MINUTE).await;
        assert_eq!(source.calls().len(), 2);
        assert_eq!(source.calls()[1].days, 30);

        tokio::time::sleep(MINUTE * 45).await;
        assert_eq!(source.calls().len(), 2);
        assert_eq!(
            feed.current_series().series().unwrap().range,
            DisplayRange::OneMonth
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselecting_same_symbol_does_not_refetch() {
        let source = MockSource::new(Box::new(prices));
        let feed = MarketFeed::spawn(
            source.clone(),
            Arc::new(SourceHealth::new()),
            FeedSettings::default(),
            selection("BTC", 7),
        );
        settled(&feed).await;

        feed.select_symbol("BTC");
        feed.select_range(7).unwrap();
        tokio::time::sleep(MINUTE).await;
        assert_eq!(source.calls().len(), 1);

        feed.select_symbol("ETH");
        tokio::time::sleep(MINUTE).await;
        assert_eq!(source.calls().len(), 2);
        assert_eq!(feed.current_series().series().unwrap().symbol, "ETH");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_does_not_replace_current_selection() {
        let delays = HashMap::from([("BTC".to_string(), Duration::from_secs(30))]);
        let source = MockSource::with_delays(Box::new(prices), delays);
        let health = Arc::new(SourceHealth::new());
        let feed = MarketFeed::spawn(
            source.clone(),
            health.clone(),
            FeedSettings::default(),
            selection("BTC", 7),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        feed.select_symbol("ETH");
        tokio::time::sleep(MINUTE).await;

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].symbol, "BTC");
        let state = feed.current_series();
        assert_eq!(state.series().unwrap().symbol, "ETH");
        assert_eq!(health.status("mock").consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_suspends_source_without_further_calls() {
        let source = MockSource::new(Box::new(|_: &str| {
            Err(MarketError::RateLimited {
                source_name: "mock".to_string(),
            })
        }));
        let health = Arc::new(SourceHealth::new());
        let feed = MarketFeed::spawn(
            source.clone(),
            health.clone(),
            FeedSettings::default(),
            selection("BTC", 1),
        );

        let state = settled(&feed).await;
        assert!(matches!(state, SeriesState::Unavailable(MarketError::RateLimited { .. })));
        assert!(health.is_suspended("mock"));

        feed.select_symbol("ETH");
        feed.select_range(365).unwrap();
        tokio::time::sleep(MINUTE * 30).await;

        assert_eq!(source.calls().len(), 1);
        assert_eq!(
            feed.current_series(),
            SeriesState::Unavailable(MarketError::SourceUnavailable {
                source_name: "mock".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspension_from_another_view_stops_ticking() {
        let source = MockSource::new(Box::new(prices));
        let health = Arc::new(SourceHealth::new());
        let feed = MarketFeed::spawn(
            source.clone(),
            health.clone(),
            FeedSettings::default(),
            selection("BTC", 1),
        );
        settled(&feed).await;

        health.observe("mock", FetchOutcome::Forbidden);
        tokio::time::sleep(MINUTE * 25).await;

        assert_eq!(source.calls().len(), 1);
        assert!(matches!(feed.current_series(), SeriesState::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_source_and_retries_after_cooldown() {
        let failures = Mutex::new(1);
        let source = MockSource::new(Box::new(move |symbol: &str| {
            let mut remaining = failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MarketError::Transport {
                    source_name: "mock".to_string(),
                    message: "timed out".to_string(),
                });
            }
            prices(symbol)
        }));
        let health = Arc::new(SourceHealth::new());
        let feed = MarketFeed::spawn(
            source.clone(),
            health.clone(),
            FeedSettings::default(),
            selection("BTC", 1),
        );

        let state = settled(&feed).await;
        assert!(matches!(state, SeriesState::Failed(ref e) if e.is_retryable()));
        assert!(!health.is_suspended("mock"));
        assert_eq!(health.status("mock").consecutive_failures, 1);

        tokio::time::sleep(MINUTE * 10 + Duration::from_secs(1)).await;
        assert_eq!(source.calls().len(), 2);
        assert!(matches!(feed.current_series(), SeriesState::Ready(_)));
        assert_eq!(health.status("mock").consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_reports_no_data() {
        let source = MockSource::new(Box::new(|_: &str| Ok(json!({ "prices": [] }))));
        let feed = MarketFeed::spawn(
            source.clone(),
            Arc::new(SourceHealth::new()),
            FeedSettings::default(),
            selection("XYZ", 30),
        );

        match settled(&feed).await {
            SeriesState::Empty { series, error } => {
                assert!(series.is_empty());
                assert_eq!(
                    error,
                    MarketError::NoData {
                        symbol: "XYZ".to_string(),
                        range: DisplayRange::OneMonth
                    }
                );
            }
            other => panic!("Expected empty series, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_range_uses_fallback_window() {
        let source = MockSource::new(Box::new(prices));
        let feed = MarketFeed::spawn(
            source.clone(),
            Arc::new(SourceHealth::new()),
            FeedSettings::default(),
            selection("BTC", 7),
        );
        settled(&feed).await;

        let err = feed.select_range(90).unwrap_err();
        assert!(matches!(err, MarketError::InvalidRange { requested: 90, .. }));
        tokio::time::sleep(MINUTE).await;
        assert_eq!(source.calls().last().unwrap().days, 30);
    }
}
