//! The dashboard: a crypto chart, a fund chart and the user's ledger

use crate::core::account::{Account, UserDirectory};
use crate::core::config::AppConfig;
use crate::core::error::MarketError;
use crate::core::health::SourceHealth;
use crate::core::history::HistorySource;
use crate::core::ledger::{FILTER_COLLECTION, FilterCriteria, Transaction, TransactionLedger};
use crate::core::store::{KeyValueCollection, Store};
use crate::core::window::{DisplayRange, FetchWindow};
use crate::feed::{FeedSettings, MarketFeed, SeriesState, Selection};
use crate::providers;
use anyhow::Result;
use clap::ValueEnum;
use std::fmt::Display;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_CRYPTO_SYMBOL: &str = "BTC";
pub const DEFAULT_FUND_SYMBOL: &str = "SPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Market {
    Crypto,
    Fund,
}

impl Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Crypto => write!(f, "crypto"),
            Market::Fund => write!(f, "fund"),
        }
    }
}

impl Market {
    pub fn default_symbol(&self) -> &'static str {
        match self {
            Market::Crypto => DEFAULT_CRYPTO_SYMBOL,
            Market::Fund => DEFAULT_FUND_SYMBOL,
        }
    }

    pub fn source(&self, config: &AppConfig) -> Result<Arc<dyn HistorySource>> {
        match self {
            Market::Crypto => providers::crypto_source(config),
            Market::Fund => providers::fund_source(config),
        }
    }
}

/// What each market view shows when the dashboard opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialViews {
    pub crypto: Selection,
    pub fund: Selection,
}

impl Default for InitialViews {
    fn default() -> Self {
        let window = FetchWindow::from(DisplayRange::Intraday);
        InitialViews {
            crypto: Selection {
                symbol: DEFAULT_CRYPTO_SYMBOL.to_string(),
                window,
            },
            fund: Selection {
                symbol: DEFAULT_FUND_SYMBOL.to_string(),
                window,
            },
        }
    }
}

pub struct DashboardSources {
    pub crypto: Arc<dyn HistorySource>,
    pub funds: Arc<dyn HistorySource>,
    pub users: Arc<dyn UserDirectory>,
}

/// Two independent market views sharing one source-health tracker, plus the
/// filtered transaction ledger.
pub struct Dashboard {
    crypto: MarketFeed,
    funds: MarketFeed,
    health: Arc<SourceHealth>,
    users: Arc<dyn UserDirectory>,
    ledger: TransactionLedger,
    account: Option<Account>,
}

impl Dashboard {
    /// Starts both feeds and restores the persisted filter.
    pub async fn open(
        sources: DashboardSources,
        settings: FeedSettings,
        filters: Arc<dyn KeyValueCollection>,
        views: InitialViews,
    ) -> Result<Self> {
        let health = Arc::new(SourceHealth::new());
        let crypto = MarketFeed::spawn(
            sources.crypto,
            Arc::clone(&health),
            settings.clone(),
            views.crypto,
        );
        let funds = MarketFeed::spawn(sources.funds, Arc::clone(&health), settings, views.fund);
        let ledger = TransactionLedger::restore(filters).await?;
        info!("Dashboard opened");

        Ok(Dashboard {
            crypto,
            funds,
            health,
            users: sources.users,
            ledger,
            account: None,
        })
    }

    pub async fn from_config(
        config: &AppConfig,
        store: &dyn Store,
        views: InitialViews,
    ) -> Result<Self> {
        let sources = DashboardSources {
            crypto: providers::crypto_source(config)?,
            funds: providers::fund_source(config)?,
            users: providers::user_directory(config)?,
        };
        let settings = FeedSettings::from_config(config)?;
        Self::open(sources, settings, store.collection(FILTER_COLLECTION)?, views).await
    }

    pub fn feed(&self, market: Market) -> &MarketFeed {
        match market {
            Market::Crypto => &self.crypto,
            Market::Fund => &self.funds,
        }
    }

    pub fn select_symbol(&self, market: Market, symbol: &str) {
        self.feed(market).select_symbol(symbol);
    }

    pub fn select_range(&self, market: Market, range_days: u32) -> Result<(), MarketError> {
        self.feed(market).select_range(range_days)
    }

    pub fn current_series(&self, market: Market) -> SeriesState {
        self.feed(market).current_series()
    }

    pub fn health(&self) -> &SourceHealth {
        &self.health
    }

    /// Fetches the user's record and replaces the ledger contents with it.
    pub async fn load_user(&mut self, identifier: &str) -> Result<()> {
        let record = self.users.get_user(identifier).await?;
        self.account = record.account;
        self.ledger.load_transactions(record.transactions);
        Ok(())
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub async fn apply_filter(&mut self, criteria: FilterCriteria) -> Result<()> {
        self.ledger.apply_filter(criteria).await
    }

    pub async fn reset_filter(&mut self) -> Result<()> {
        self.ledger.reset_filter().await
    }

    pub fn criteria(&self) -> &FilterCriteria {
        self.ledger.criteria()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.ledger.transactions()
    }

    pub fn filtered_transactions(&self) -> &[Transaction] {
        self.ledger.filtered_transactions()
    }
}
