pub mod cli;
pub mod core;
pub mod dashboard;
pub mod feed;
pub mod providers;
pub mod store;

use crate::cli::chart::ChartOptions;
use crate::cli::dashboard::DashboardOptions;
use crate::cli::transactions::TransactionOptions;
use crate::core::config::AppConfig;
use crate::store::KeyValueStore;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Chart(ChartOptions),
    Transactions(TransactionOptions),
    Dashboard(DashboardOptions),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("tickwatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(
        quote_currency = %config.quote_currency,
        timezone = %config.label_timezone,
        finnhub = config.providers.finnhub.is_some(),
        "Loaded config"
    );

    match command {
        AppCommand::Chart(options) => cli::chart::run(&config, &options).await,
        AppCommand::Transactions(options) => {
            let store = KeyValueStore::open(&config.store_path()?)?;
            cli::transactions::run(&config, &store, &options).await
        }
        AppCommand::Dashboard(options) => {
            let store = KeyValueStore::open(&config.store_path()?)?;
            cli::dashboard::run(&config, &store, &options).await
        }
    }
}
