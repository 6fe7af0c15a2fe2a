use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One account per currency. The balance is replaced, never accumulated: a
/// new screenshot reading supersedes the previous native balance outright.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub currency: String,
    /// Native-currency amount.
    pub balance: f64,
    /// USD value cached at the time of the last update.
    pub balance_usd: f64,
    pub last_updated: DateTime<Utc>,
}

/// Append-only record of one balance replacement.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub timestamp: DateTime<Utc>,
    pub old_balance: f64,
    pub new_balance: f64,
    pub change: f64,
    /// Provenance tag: "web", "telegram", "manual".
    pub source: String,
    /// Raw OCR line the value was extracted from.
    pub original_text: String,
}

pub const TOTAL_BALANCE_KEY: &str = "total_balance_usd";
