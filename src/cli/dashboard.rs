use super::{chart, transactions, ui};
use crate::core::config::AppConfig;
use crate::core::store::Store;
use crate::dashboard::{Dashboard, InitialViews, Market};
use crate::feed::{SeriesState, Selection};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub user_id: Option<String>,
    pub crypto_symbol: String,
    pub fund_symbol: String,
    pub range_days: u32,
    pub points: usize,
}

/// Prints one snapshot of both market views and, when a user is given, the
/// filtered ledger.
pub async fn run(config: &AppConfig, store: &dyn Store, options: &DashboardOptions) -> Result<()> {
    let window = chart::resolve_window(options.range_days)?;
    let views = InitialViews {
        crypto: Selection {
            symbol: options.crypto_symbol.to_uppercase(),
            window,
        },
        fund: Selection {
            symbol: options.fund_symbol.to_uppercase(),
            window,
        },
    };

    let spinner = ui::new_spinner("Loading dashboard...");
    let mut dashboard = Dashboard::from_config(config, store, views).await?;
    let user_loaded = match &options.user_id {
        Some(user_id) => dashboard.load_user(user_id).await.map(|()| true),
        None => Ok(false),
    };
    let mut crypto_updates = dashboard.feed(Market::Crypto).subscribe();
    let mut fund_updates = dashboard.feed(Market::Fund).subscribe();
    let (crypto, funds) = tokio::join!(
        crypto_updates.wait_for(SeriesState::is_settled),
        fund_updates.wait_for(SeriesState::is_settled)
    );
    let crypto = crypto?.clone();
    let funds = funds?.clone();
    spinner.finish_and_clear();

    for (market, state) in [(Market::Crypto, crypto), (Market::Fund, funds)] {
        println!(
            "{}\n",
            ui::style_text(&format!("{market} market"), ui::StyleType::TotalLabel)
        );
        println!(
            "{}",
            chart::render_state(&state, &config.quote_currency, options.points)
        );
        ui::print_separator();
    }

    if user_loaded? {
        println!("{}\n", transactions::render_account(dashboard.account()));
        println!(
            "{}",
            transactions::render_ledger(
                dashboard.criteria(),
                dashboard.filtered_transactions(),
                dashboard.transactions().len()
            )
        );
    }
    Ok(())
}
