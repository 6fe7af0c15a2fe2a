use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::currency::Currency;
use crate::domain::{Account, Transaction};
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::rates::RateCache;

/// Aggregate USD balance across all accounts on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub balance: f64,
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Day-by-day timeline of the aggregate USD balance, reconstructed from the
/// transaction log with last-known-balance-per-account carry-forward.
pub async fn daily_totals(
    ledger: &dyn LedgerStore,
    rates: &RateCache,
) -> Result<Vec<HistoryPoint>> {
    let accounts = ledger.accounts().await?;
    let transactions = ledger.transactions().await?;

    let mut to_usd: HashMap<i64, f64> = HashMap::new();
    for account in &accounts {
        let multiplier = match Currency::from_code(&account.currency) {
            Some(currency) => rates.usd_multiplier(currency).await,
            None => 1.0,
        };
        to_usd.insert(account.id, multiplier);
    }

    Ok(compute(&accounts, &transactions, &to_usd))
}

/// `transactions` must be in timestamp order; `to_usd` maps account id to
/// its currency's USD multiplier.
fn compute(
    accounts: &[Account],
    transactions: &[Transaction],
    to_usd: &HashMap<i64, f64>,
) -> Vec<HistoryPoint> {
    if transactions.is_empty() {
        let total: f64 = accounts
            .iter()
            .map(|a| a.balance * to_usd.get(&a.id).copied().unwrap_or(1.0))
            .sum();
        if total > 0.0 {
            return vec![HistoryPoint {
                date: Utc::now().date_naive(),
                balance: round_cents(total),
            }];
        }
        return vec![];
    }

    // Last known native balance per account, carried forward across dates.
    let mut last_known: HashMap<i64, f64> = HashMap::new();
    let mut points = Vec::new();
    let mut index = 0;

    while index < transactions.len() {
        let date = transactions[index].timestamp.date_naive();
        while index < transactions.len() && transactions[index].timestamp.date_naive() == date {
            let tx = &transactions[index];
            last_known.insert(tx.account_id, tx.new_balance);
            index += 1;
        }

        let total: f64 = accounts
            .iter()
            .map(|a| {
                let balance = last_known.get(&a.id).copied().unwrap_or(0.0);
                balance * to_usd.get(&a.id).copied().unwrap_or(1.0)
            })
            .sum();
        points.push(HistoryPoint {
            date,
            balance: round_cents(total),
        });
    }

    points
}
