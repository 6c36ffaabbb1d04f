//! Core market-data and ledger logic, independent of any transport or UI

pub mod account;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod ledger;
pub mod log;
pub mod refresh;
pub mod series;
pub mod store;
pub mod window;

// Re-export main types for cleaner imports
pub use account::{Account, UserDirectory, UserRecord};
pub use error::MarketError;
pub use health::{FetchOutcome, SourceHealth};
pub use history::HistorySource;
pub use ledger::{FilterCriteria, Transaction, TransactionLedger};
pub use series::{PricePoint, Series, SeriesNormalizer};
pub use window::{DisplayRange, FetchWindow, Granularity};
