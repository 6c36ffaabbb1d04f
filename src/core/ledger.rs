//! Transaction ledger filtering with criteria that survive a restart

use crate::core::store::KeyValueCollection;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the store collection holding persisted criteria.
pub const FILTER_COLLECTION: &str = "filters";

const MIN_AMOUNT_KEY: &str = "minAmount";
const MAX_AMOUNT_KEY: &str = "maxAmount";
const START_DATE_KEY: &str = "startDate";
const END_DATE_KEY: &str = "endDate";

/// A date as the bank API happens to send it.
///
/// Numbers are epoch milliseconds, fractional ones truncated. Anything that
/// is neither a number nor text is kept as [`RawDate::Other`] and never
/// resolves to an instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawDate {
    EpochMillis(i64),
    Text(String),
    Other(Value),
}

impl<'de> Deserialize<'de> for RawDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_i64() {
                Some(ms) => RawDate::EpochMillis(ms),
                None => match n.as_f64().filter(|f| f.is_finite()) {
                    Some(f) => RawDate::EpochMillis(f.trunc() as i64),
                    None => RawDate::Other(Value::Number(n)),
                },
            },
            Value::String(text) => RawDate::Text(text),
            other => RawDate::Other(other),
        })
    }
}

impl RawDate {
    pub fn to_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            RawDate::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
            RawDate::Text(text) => parse_date_text(text.trim()),
            RawDate::Other(_) => None,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, RawDate::Text(text) if text.trim().is_empty())
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Reads a decimal from a JSON number or numeric text.
pub(crate) fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn text_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A ledger entry owned by the bank API; read-only here.
///
/// Decoding never fails on a single odd field: the row is kept and the
/// field reads as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireTransaction")]
pub struct Transaction {
    pub id: Option<i64>,
    pub origin_account: Option<String>,
    pub destination_account: Option<String>,
    /// `None` when the amount is missing or not numeric.
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<RawDate>,
    #[serde(rename = "dateISO", skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    origin_account: Option<Value>,
    #[serde(default)]
    destination_account: Option<Value>,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    monto: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    date: Option<RawDate>,
    #[serde(default, rename = "dateISO")]
    date_iso: Option<RawDate>,
    #[serde(default)]
    fecha: Option<RawDate>,
    #[serde(default)]
    created_at: Option<RawDate>,
    #[serde(default)]
    timestamp: Option<RawDate>,
}

impl From<WireTransaction> for Transaction {
    fn from(wire: WireTransaction) -> Self {
        // The first non-null of amount, monto, value is the amount
        let amount = [wire.amount, wire.monto, wire.value]
            .into_iter()
            .flatten()
            .find(|v| !v.is_null())
            .and_then(|v| decimal_from_value(&v));

        Transaction {
            id: wire.id.and_then(|v| v.as_i64()),
            origin_account: wire.origin_account.and_then(text_from_value),
            destination_account: wire.destination_account.and_then(text_from_value),
            amount,
            date: wire.date,
            date_iso: wire.date_iso,
            fecha: wire.fecha,
            created_at: wire.created_at,
            timestamp: wire.timestamp,
        }
    }
}

impl Transaction {
    pub fn new(amount: Decimal, date: Option<RawDate>) -> Self {
        Transaction {
            id: None,
            origin_account: None,
            destination_account: None,
            amount: Some(amount),
            date,
            date_iso: None,
            fecha: None,
            created_at: None,
            timestamp: None,
        }
    }

    /// The first non-blank date field wins, even when it does not parse.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        [
            &self.date,
            &self.date_iso,
            &self.fecha,
            &self.created_at,
            &self.timestamp,
        ]
        .into_iter()
        .flatten()
        .find(|raw| !raw.is_blank())
        .and_then(RawDate::to_instant)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    fn has_date_bounds(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start_date
            .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
    }

    fn end_instant(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }

    fn has_amount_bounds(&self) -> bool {
        self.min_amount.is_some() || self.max_amount.is_some()
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        if self.has_amount_bounds() {
            let Some(amount) = transaction.amount else {
                return false;
            };
            if self.min_amount.is_some_and(|min| amount < min) {
                return false;
            }
            if self.max_amount.is_some_and(|max| amount > max) {
                return false;
            }
        }
        if !self.has_date_bounds() {
            return true;
        }

        let Some(at) = transaction.instant() else {
            return false;
        };
        if self.start_instant().is_some_and(|start| at < start) {
            return false;
        }
        if self.end_instant().is_some_and(|end| at > end) {
            return false;
        }
        true
    }
}

/// Returns the transactions matching every criterion that is set.
pub fn apply(transactions: &[Transaction], criteria: &FilterCriteria) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|t| criteria.matches(t))
        .cloned()
        .collect()
}

/// Filtered view over the ledger, with criteria persisted to a collection.
pub struct TransactionLedger {
    store: Arc<dyn KeyValueCollection>,
    criteria: FilterCriteria,
    transactions: Vec<Transaction>,
    filtered: Vec<Transaction>,
}

impl TransactionLedger {
    /// Builds the ledger, reading back any criteria persisted earlier.
    pub async fn restore(store: Arc<dyn KeyValueCollection>) -> Result<Self> {
        let criteria = FilterCriteria {
            min_amount: read_field(store.as_ref(), MIN_AMOUNT_KEY).await?,
            max_amount: read_field(store.as_ref(), MAX_AMOUNT_KEY).await?,
            start_date: read_field(store.as_ref(), START_DATE_KEY).await?,
            end_date: read_field(store.as_ref(), END_DATE_KEY).await?,
        };
        debug!(?criteria, "Restored filter criteria");

        Ok(Self {
            store,
            criteria,
            transactions: Vec::new(),
            filtered: Vec::new(),
        })
    }

    /// Replaces the ledger contents and re-applies the current criteria.
    pub fn load_transactions(&mut self, transactions: Vec<Transaction>) {
        self.filtered = apply(&transactions, &self.criteria);
        self.transactions = transactions;
        debug!(
            total = self.transactions.len(),
            shown = self.filtered.len(),
            "Loaded transactions"
        );
    }

    pub async fn apply_filter(&mut self, criteria: FilterCriteria) -> Result<()> {
        write_field(self.store.as_ref(), MIN_AMOUNT_KEY, criteria.min_amount).await?;
        write_field(self.store.as_ref(), MAX_AMOUNT_KEY, criteria.max_amount).await?;
        write_field(self.store.as_ref(), START_DATE_KEY, criteria.start_date).await?;
        write_field(self.store.as_ref(), END_DATE_KEY, criteria.end_date).await?;
        self.store.flush().await?;

        self.filtered = apply(&self.transactions, &criteria);
        info!(?criteria, shown = self.filtered.len(), "Applied filter");
        self.criteria = criteria;
        Ok(())
    }

    pub async fn reset_filter(&mut self) -> Result<()> {
        for key in [MIN_AMOUNT_KEY, MAX_AMOUNT_KEY, START_DATE_KEY, END_DATE_KEY] {
            self.store.remove(key.as_bytes()).await?;
        }
        self.store.flush().await?;

        self.criteria = FilterCriteria::default();
        self.filtered = self.transactions.clone();
        info!("Filter reset");
        Ok(())
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn filtered_transactions(&self) -> &[Transaction] {
        &self.filtered
    }
}

async fn read_field<T>(store: &dyn KeyValueCollection, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(bytes) = store.get(key.as_bytes()).await? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, value = text, error = %e, "Ignoring unreadable persisted filter");
            Ok(None)
        }
    }
}

async fn write_field<T: Display>(
    store: &dyn KeyValueCollection,
    key: &str,
    value: Option<T>,
) -> Result<()> {
    match value {
        Some(v) => store.put(key.as_bytes(), v.to_string().as_bytes()).await,
        None => store.remove(key.as_bytes()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn tx(amount: &str, date: &str) -> Transaction {
        Transaction::new(dec(amount), Some(RawDate::Text(date.to_string())))
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("10", "2024-01-05"),
            tx("50", "2024-01-31T23:30:00Z"),
            tx("50.00", "2024-02-01"),
            tx("200", "2024-02-10"),
            Transaction::new(dec("75"), None),
        ]
    }

    #[test]
    fn test_empty_criteria_is_identity() {
        let transactions = sample();
        assert_eq!(apply(&transactions, &FilterCriteria::default()), transactions);
    }

    #[test]
    fn test_min_equals_max_keeps_exact_amounts() {
        let criteria = FilterCriteria {
            min_amount: Some(dec("50")),
            max_amount: Some(dec("50")),
            ..Default::default()
        };
        let result = apply(&sample(), &criteria);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|t| t.amount == Some(dec("50"))));
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let criteria = FilterCriteria {
            min_amount: Some(dec("20")),
            start_date: Some(date("2024-01-15")),
            ..Default::default()
        };
        let once = apply(&sample(), &criteria);
        assert_eq!(apply(&once, &criteria), once);
    }

    #[test]
    fn test_min_amount_example() {
        let transactions = vec![tx("10", "2024-01-05"), tx("200", "2024-02-10")];
        let criteria = FilterCriteria {
            min_amount: Some(dec("50")),
            ..Default::default()
        };
        assert_eq!(apply(&transactions, &criteria), vec![tx("200", "2024-02-10")]);
    }

    #[test]
    fn test_date_bounds_are_inclusive_whole_days() {
        let criteria = FilterCriteria {
            start_date: Some(date("2024-01-31")),
            end_date: Some(date("2024-02-01")),
            ..Default::default()
        };
        let transactions = vec![
            tx("1", "2024-01-30T23:59:59Z"),
            tx("2", "2024-01-31"),
            tx("3", "2024-02-01T23:59:59.999Z"),
            tx("4", "2024-02-02T00:00:00Z"),
        ];
        let amounts: Vec<Decimal> = apply(&transactions, &criteria)
            .iter()
            .filter_map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![dec("2"), dec("3")]);
    }

    #[test]
    fn test_undated_transactions_only_pass_without_date_bounds() {
        let undated = Transaction::new(dec("75"), None);
        let amount_only = FilterCriteria {
            max_amount: Some(dec("100")),
            ..Default::default()
        };
        let dated = FilterCriteria {
            end_date: Some(date("2030-01-01")),
            ..Default::default()
        };
        assert!(amount_only.matches(&undated));
        assert!(!dated.matches(&undated));
    }

    #[test]
    fn test_date_field_priority_and_shapes() {
        let value = json!({
            "id": 7,
            "originAccount": "ES11",
            "destinationAccount": "ES22",
            "monto": "12.5",
            "fecha": 1_704_067_200_000i64,
            "createdAt": "1999-01-01"
        });
        let t: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(t.amount, Some(dec("12.5")));
        assert_eq!(
            t.instant(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let naive: Transaction =
            serde_json::from_value(json!({ "amount": 3, "dateISO": "2024-03-04T10:15:00" }))
                .unwrap();
        assert_eq!(
            naive.instant(),
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 10, 15, 0).unwrap())
        );

        // An unreadable first field does not fall through to later ones
        let broken: Transaction = serde_json::from_value(
            json!({ "amount": 3, "date": "N/A", "timestamp": 1_704_067_200_000i64 }),
        )
        .unwrap();
        assert_eq!(broken.instant(), None);

        // Blank text counts as absent
        let blank: Transaction =
            serde_json::from_value(json!({ "amount": 3, "date": "  ", "dateISO": "2024-01-01" }))
                .unwrap();
        assert_eq!(
            blank.instant(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_odd_rows_are_kept() {
        let rows: Vec<Transaction> = serde_json::from_value(json!([
            { "amount": 10, "date": "2024-01-05" },
            { "amount": 20, "date": 1_704_067_200_000.0 },
            { "amount": 30, "date": true },
            { "amount": null, "monto": "40", "date": "2024-01-06" },
            { "amount": "n/a", "date": "2024-01-07" },
            { "value": null, "id": "abc", "originAccount": 4021 }
        ]))
        .unwrap();
        assert_eq!(rows.len(), 6);

        assert_eq!(
            rows[1].instant(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(rows[2].date, Some(RawDate::Other(json!(true))));
        assert_eq!(rows[2].instant(), None);
        assert_eq!(rows[3].amount, Some(dec("40")));
        assert_eq!(rows[4].amount, None);
        assert_eq!(rows[5].amount, None);
        assert_eq!(rows[5].id, None);
        assert_eq!(rows[5].origin_account.as_deref(), Some("4021"));

        assert_eq!(apply(&rows, &FilterCriteria::default()).len(), 6);

        // Rows without an amount only pass when no amount bound is set
        let amount_bound = FilterCriteria {
            min_amount: Some(dec("0")),
            ..Default::default()
        };
        let amounts: Vec<Decimal> = apply(&rows, &amount_bound)
            .iter()
            .filter_map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![dec("10"), dec("20"), dec("30"), dec("40")]);

        let date_bound = FilterCriteria {
            start_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        assert_eq!(apply(&rows, &date_bound).len(), 4);
    }

    #[tokio::test]
    async fn test_apply_and_reset_persist_criteria() {
        let store = Arc::new(MemoryCollection::new());
        let mut ledger = TransactionLedger::restore(store.clone()).await.unwrap();
        ledger.load_transactions(sample());
        assert_eq!(ledger.filtered_transactions().len(), 5);

        let criteria = FilterCriteria {
            min_amount: Some(dec("100")),
            start_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        ledger.apply_filter(criteria.clone()).await.unwrap();
        assert_eq!(ledger.filtered_transactions(), &[tx("200", "2024-02-10")]);
        assert_eq!(store.get(b"minAmount").await.unwrap(), Some(b"100".to_vec()));
        assert_eq!(
            store.get(b"startDate").await.unwrap(),
            Some(b"2024-01-01".to_vec())
        );
        assert!(store.get(b"maxAmount").await.unwrap().is_none());

        ledger.reset_filter().await.unwrap();
        assert!(ledger.criteria().is_empty());
        assert_eq!(ledger.filtered_transactions(), ledger.transactions());
        for key in ["minAmount", "maxAmount", "startDate", "endDate"] {
            assert!(store.get(key.as_bytes()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_reload_reconstructs_criteria_and_view() {
        let store = Arc::new(MemoryCollection::new());
        store.put(b"minAmount", b"100").await.unwrap();
        store.put(b"startDate", b"2024-01-01").await.unwrap();

        let first = {
            let mut ledger = TransactionLedger::restore(store.clone()).await.unwrap();
            ledger.load_transactions(sample());
            (ledger.criteria().clone(), ledger.filtered_transactions().to_vec())
        };

        let mut reloaded = TransactionLedger::restore(store.clone()).await.unwrap();
        assert_eq!(
            reloaded.criteria(),
            &FilterCriteria {
                min_amount: Some(dec("100")),
                start_date: Some(date("2024-01-01")),
                ..Default::default()
            }
        );
        reloaded.load_transactions(sample());
        assert_eq!(reloaded.criteria(), &first.0);
        assert_eq!(reloaded.filtered_transactions(), first.1.as_slice());
    }

    #[tokio::test]
    async fn test_unreadable_persisted_value_is_ignored() {
        let store = Arc::new(MemoryCollection::new());
        store.put(b"maxAmount", b"lots").await.unwrap();
        store.put(b"endDate", b"").await.unwrap();
        let ledger = TransactionLedger::restore(store).await.unwrap();
        assert!(ledger.criteria().is_empty());
    }
}
