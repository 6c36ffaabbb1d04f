//! User records served by the bank API

use crate::core::ledger::{Transaction, decimal_from_value};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "string_or_number")]
    pub number: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transactions: Vec<Transaction>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, identifier: &str) -> Result<UserRecord>;
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected account number, found {other}"
        ))),
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(decimal_from_value(&Value::deserialize(deserializer)?).unwrap_or_default())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Transaction>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Transaction>>::deserialize(deserializer)?.unwrap_or_default())
}
