use super::ui;
use crate::core::account::Account;
use crate::core::config::AppConfig;
use crate::core::ledger::{FILTER_COLLECTION, FilterCriteria, Transaction, TransactionLedger};
use crate::core::store::Store;
use crate::providers;
use anyhow::Result;
use comfy_table::Cell;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub user_id: String,
    /// New criteria to apply and persist. `None` keeps the persisted ones.
    pub filter: Option<FilterCriteria>,
    pub reset: bool,
}

pub fn render_account(account: Option<&Account>) -> String {
    match account {
        Some(account) => format!(
            "Account: {}\n{}: {}",
            ui::style_text(&account.number, ui::StyleType::Title),
            ui::style_text("Balance", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:.2}", account.balance.round_dp(2)),
                ui::StyleType::TotalValue
            )
        ),
        None => ui::style_text("No account on record", ui::StyleType::Subtle),
    }
}

fn describe_criteria(criteria: &FilterCriteria) -> String {
    if criteria.is_empty() {
        return "none".to_string();
    }
    let mut parts = Vec::new();
    if let Some(min) = criteria.min_amount {
        parts.push(format!("amount >= {min}"));
    }
    if let Some(max) = criteria.max_amount {
        parts.push(format!("amount <= {max}"));
    }
    if let Some(start) = criteria.start_date {
        parts.push(format!("from {start}"));
    }
    if let Some(end) = criteria.end_date {
        parts.push(format!("to {end}"));
    }
    parts.join(", ")
}

pub fn render_ledger(
    criteria: &FilterCriteria,
    shown: &[Transaction],
    total: usize,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("From"),
        ui::header_cell("To"),
        ui::header_cell("Amount"),
    ]);
    for transaction in shown {
        table.add_row(vec![
            Cell::new(
                transaction
                    .instant()
                    .map_or("N/A".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
            ),
            Cell::new(transaction.origin_account.as_deref().unwrap_or("-")),
            Cell::new(transaction.destination_account.as_deref().unwrap_or("-")),
            match transaction.amount {
                Some(amount) => ui::amount_cell(amount),
                None => ui::format_optional_cell(None::<Decimal>, |d| d.to_string()),
            },
        ]);
    }

    let sum: Decimal = shown.iter().filter_map(|t| t.amount).sum();
    format!(
        "Filter: {}\n\n{table}\n\nShowing {} of {} transactions, {}: {}",
        ui::style_text(&describe_criteria(criteria), ui::StyleType::Subtle),
        shown.len(),
        total,
        ui::style_text("Total", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", sum.round_dp(2)), ui::StyleType::TotalValue)
    )
}

pub async fn run(config: &AppConfig, store: &dyn Store, options: &TransactionOptions) -> Result<()> {
    let users = providers::user_directory(config)?;
    let mut ledger = TransactionLedger::restore(store.collection(FILTER_COLLECTION)?).await?;

    let spinner = ui::new_spinner("Fetching transactions...");
    let record = users.get_user(&options.user_id).await;
    spinner.finish_and_clear();
    let record = record?;
    ledger.load_transactions(record.transactions);

    if options.reset {
        ledger.reset_filter().await?;
    } else if let Some(criteria) = &options.filter {
        ledger.apply_filter(criteria.clone()).await?;
    }

    println!("{}\n", render_account(record.account.as_ref()));
    println!(
        "{}",
        render_ledger(
            ledger.criteria(),
            ledger.filtered_transactions(),
            ledger.transactions().len()
        )
    );
    Ok(())
}
