use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use tickwatch::cli::chart::ChartOptions;
use tickwatch::cli::dashboard::DashboardOptions;
use tickwatch::cli::transactions::TransactionOptions;
use tickwatch::core::ledger::FilterCriteria;
use tickwatch::core::log::init_logging;
use tickwatch::dashboard::{DEFAULT_CRYPTO_SYMBOL, DEFAULT_FUND_SYMBOL, Market};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct FilterArgs {
    /// Smallest amount to show, inclusive
    #[arg(long)]
    min: Option<Decimal>,
    /// Largest amount to show, inclusive
    #[arg(long)]
    max: Option<Decimal>,
    /// First day to show (YYYY-MM-DD), inclusive
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day to show (YYYY-MM-DD), inclusive
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    /// `None` when no bound was given, so the persisted filter is kept.
    fn into_criteria(self) -> Option<FilterCriteria> {
        let criteria = FilterCriteria {
            min_amount: self.min,
            max_amount: self.max,
            start_date: self.from,
            end_date: self.to,
        };
        (!criteria.is_empty()).then_some(criteria)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show the price history of a crypto asset or fund
    Chart {
        /// Ticker, e.g. BTC or SPY
        symbol: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Market::Crypto)]
        market: Market,
        /// Range in days: 1, 7, 30 or 365
        #[arg(short, long, default_value_t = 1)]
        range: u32,
        /// Number of most recent points to list
        #[arg(short, long, default_value_t = 12)]
        points: usize,
        /// Keep running and print every refresh
        #[arg(short, long)]
        watch: bool,
    },
    /// List a user's transactions through the persisted filter
    Transactions {
        user_id: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// Clear the persisted filter
        #[arg(long, conflicts_with_all = ["min", "max", "from", "to"])]
        reset: bool,
    },
    /// Show both market views and, optionally, a user's ledger
    Dashboard {
        user_id: Option<String>,
        #[arg(long, default_value = DEFAULT_CRYPTO_SYMBOL)]
        crypto: String,
        #[arg(long, default_value = DEFAULT_FUND_SYMBOL)]
        fund: String,
        #[arg(short, long, default_value_t = 1)]
        range: u32,
        #[arg(short, long, default_value_t = 6)]
        points: usize,
    },
}

impl From<Commands> for tickwatch::AppCommand {
    fn from(cmd: Commands) -> tickwatch::AppCommand {
        match cmd {
            Commands::Chart {
                symbol,
                market,
                range,
                points,
                watch,
            } => tickwatch::AppCommand::Chart(ChartOptions {
                market,
                symbol,
                range_days: range,
                points,
                watch,
            }),
            Commands::Transactions {
                user_id,
                filter,
                reset,
            } => tickwatch::AppCommand::Transactions(TransactionOptions {
                user_id,
                filter: filter.into_criteria(),
                reset,
            }),
            Commands::Dashboard {
                user_id,
                crypto,
                fund,
                range,
                points,
            } => tickwatch::AppCommand::Dashboard(DashboardOptions {
                user_id,
                crypto_symbol: crypto,
                fund_symbol: fund,
                range_days: range,
                points,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => tickwatch::cli::setup::setup(),
        Some(cmd) => tickwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
