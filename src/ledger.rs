use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::currency::Currency;
use crate::domain::{Account, Transaction};
use crate::error::Result;

/// Storage for the account-per-currency ledger. The two implementations
/// (Postgres tables, flat JSON file) are interchangeable; the tracker only
/// sees this trait.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The unique account for `currency`, created with a zero balance and a
    /// currency-derived display name when absent. Safe under concurrent
    /// calls: at most one account per currency ever exists.
    async fn find_or_create(&self, currency: Currency) -> Result<Account>;

    /// Overwrite the account's native balance, cache the given USD value,
    /// stamp `last_updated` and append a Transaction. Creates the account
    /// when absent. The whole operation commits or rolls back as one unit;
    /// concurrent updates for the same currency serialize.
    async fn replace_balance(
        &self,
        currency: Currency,
        new_balance: f64,
        balance_usd: f64,
        source: &str,
        original_text: &str,
    ) -> Result<(Account, Transaction)>;

    async fn accounts(&self) -> Result<Vec<Account>>;

    /// All transactions in timestamp order.
    async fn transactions(&self) -> Result<Vec<Transaction>>;

    /// Sum of cached `balance_usd` across all accounts.
    async fn total_usd(&self) -> Result<f64>;

    async fn get_info(&self, key: &str) -> Result<Option<String>>;
    async fn put_info(&self, key: &str, value: &str) -> Result<()>;
}

/// Postgres-backed ledger. Uniqueness per currency is a database constraint;
/// `replace_balance` takes a row lock so same-currency updates serialize.
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn find_or_create(&self, currency: Currency) -> Result<Account> {
        sqlx::query(
            "
                INSERT INTO accounts (name, currency, balance, balance_usd, last_updated)
                VALUES ($1, $2, 0, 0, $3)
                ON CONFLICT (currency) DO NOTHING
            ",
        )
        .bind(currency.account_name())
        .bind(currency.code())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let account = sqlx::query_as::<_, Account>(
            "
                SELECT * FROM accounts
                WHERE currency = $1
            ",
        )
        .bind(currency.code())
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn replace_balance(
        &self,
        currency: Currency,
        new_balance: f64,
        balance_usd: f64,
        source: &str,
        original_text: &str,
    ) -> Result<(Account, Transaction)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "
                INSERT INTO accounts (name, currency, balance, balance_usd, last_updated)
                VALUES ($1, $2, 0, 0, $3)
                ON CONFLICT (currency) DO NOTHING
            ",
        )
        .bind(currency.account_name())
        .bind(currency.code())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let account = sqlx::query_as::<_, Account>(
            "
                SELECT * FROM accounts
                WHERE currency = $1
                FOR UPDATE
            ",
        )
        .bind(currency.code())
        .fetch_one(&mut *tx)
        .await?;

        let old_balance = account.balance;

        let account = sqlx::query_as::<_, Account>(
            "
                UPDATE accounts
                SET balance = $1, balance_usd = $2, last_updated = $3
                WHERE id = $4
                RETURNING *
            ",
        )
        .bind(new_balance)
        .bind(balance_usd)
        .bind(now)
        .bind(account.id)
        .fetch_one(&mut *tx)
        .await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            "
                INSERT INTO transactions (
                    account_id,
                    timestamp,
                    old_balance,
                    new_balance,
                    change,
                    source,
                    original_text
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            ",
        )
        .bind(account.id)
        .bind(now)
        .bind(old_balance)
        .bind(new_balance)
        .bind(new_balance - old_balance)
        .bind(source)
        .bind(original_text)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((account, transaction))
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(
            "
                SELECT * FROM accounts
                ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "
                SELECT * FROM transactions
                ORDER BY timestamp, id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn total_usd(&self) -> Result<f64> {
        let total = sqlx::query_scalar::<_, f64>(
            "
                SELECT COALESCE(SUM(balance_usd), 0) FROM accounts
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn get_info(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "
                SELECT value FROM system_info
                WHERE key = $1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn put_info(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "
                INSERT INTO system_info (key, value, updated_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (key)
                DO UPDATE SET
                    value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct JsonState {
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    info: HashMap<String, String>,
}

impl JsonState {
    fn next_account_id(&self) -> i64 {
        self.accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1
    }

    fn next_transaction_id(&self) -> i64 {
        self.transactions.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn account_for(&mut self, currency: Currency) -> &mut Account {
        let position = self
            .accounts
            .iter()
            .position(|a| a.currency == currency.code());
        let index = match position {
            Some(index) => index,
            None => {
                let id = self.next_account_id();
                self.accounts.push(Account {
                    id,
                    name: currency.account_name().to_string(),
                    currency: currency.code().to_string(),
                    balance: 0.0,
                    balance_usd: 0.0,
                    last_updated: Utc::now(),
                });
                self.accounts.len() - 1
            }
        };
        &mut self.accounts[index]
    }
}

/// Flat-file ledger: the whole state lives in one JSON document rewritten
/// after every mutation. The mutex serializes updates, which also gives the
/// same-currency ordering guarantee the Postgres row lock provides.
pub struct JsonLedger {
    path: PathBuf,
    state: Mutex<JsonState>,
}

impl JsonLedger {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => JsonState::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &JsonState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonLedger {
    async fn find_or_create(&self, currency: Currency) -> Result<Account> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter().find(|a| a.currency == currency.code()) {
            return Ok(account.clone());
        }

        // Stage on a copy; the shared state only changes once the file write
        // succeeded.
        let mut staged = state.clone();
        let account = staged.account_for(currency).clone();
        self.persist(&staged).await?;
        *state = staged;
        Ok(account)
    }

    async fn replace_balance(
        &self,
        currency: Currency,
        new_balance: f64,
        balance_usd: f64,
        source: &str,
        original_text: &str,
    ) -> Result<(Account, Transaction)> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        // Stage on a copy; a failed write must leave no trace in memory.
        let mut staged = state.clone();
        let transaction_id = staged.next_transaction_id();

        let account = staged.account_for(currency);
        let old_balance = account.balance;
        account.balance = new_balance;
        account.balance_usd = balance_usd;
        account.last_updated = now;
        let account = account.clone();

        let transaction = Transaction {
            id: transaction_id,
            account_id: account.id,
            timestamp: now,
            old_balance,
            new_balance,
            change: new_balance - old_balance,
            source: source.to_string(),
            original_text: original_text.to_string(),
        };
        staged.transactions.push(transaction.clone());

        self.persist(&staged).await?;
        *state = staged;
        Ok((account, transaction))
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.state.lock().await.accounts.clone())
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let mut transactions = self.state.lock().await.transactions.clone();
        transactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn total_usd(&self) -> Result<f64> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .map(|a| a.balance_usd)
            .sum())
    }

    async fn get_info(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.info.get(key).cloned())
    }

    async fn put_info(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        staged.info.insert(key.to_string(), value.to_string());
        self.persist(&staged).await?;
        *state = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_ledger() -> (tempfile::TempDir, JsonLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonLedger::open(dir.path().join("ledger.json"))
            .await
            .unwrap();
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_find_or_create_is_unique_per_currency() {
        let (_dir, ledger) = temp_ledger().await;
        let first = ledger.find_or_create(Currency::RUB).await.unwrap();
        let second = ledger.find_or_create(Currency::RUB).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Российский счет");
        assert_eq!(first.balance, 0.0);
        assert_eq!(ledger.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_balance_replaces_not_accumulates() {
        let (_dir, ledger) = temp_ledger().await;
        let (account, tx) = ledger
            .replace_balance(Currency::USD, 100.0, 100.0, "web", "100.00 $")
            .await
            .unwrap();
        assert_eq!(account.balance, 100.0);
        assert_eq!(tx.old_balance, 0.0);
        assert_eq!(tx.change, 100.0);

        let (account, tx) = ledger
            .replace_balance(Currency::USD, 40.0, 40.0, "web", "40.00 $")
            .await
            .unwrap();
        assert_eq!(account.balance, 40.0);
        assert_eq!(tx.old_balance, 100.0);
        assert_eq!(tx.change, -60.0);
    }

    #[tokio::test]
    async fn test_repeated_same_amount_yields_zero_change() {
        let (_dir, ledger) = temp_ledger().await;
        ledger
            .replace_balance(Currency::EUR, 55.5, 59.94, "manual", "")
            .await
            .unwrap();
        let (account, tx) = ledger
            .replace_balance(Currency::EUR, 55.5, 59.94, "manual", "")
            .await
            .unwrap();
        assert_eq!(account.balance, 55.5);
        assert_eq!(tx.change, 0.0);
        assert_eq!(ledger.transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_total_usd_sums_cached_values() {
        let (_dir, ledger) = temp_ledger().await;
        ledger
            .replace_balance(Currency::USD, 100.0, 100.0, "web", "")
            .await
            .unwrap();
        ledger
            .replace_balance(Currency::RUB, 1000.0, 11.0, "web", "")
            .await
            .unwrap();
        assert!((ledger.total_usd().await.unwrap() - 111.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonLedger::open(dir.path().join("ledger.json"))
            .await
            .unwrap();
        ledger
            .replace_balance(Currency::USD, 100.0, 100.0, "web", "100.00 $")
            .await
            .unwrap();

        // Removing the backing directory makes every file write fail.
        std::fs::remove_dir_all(dir.path()).unwrap();

        let err = ledger
            .replace_balance(Currency::USD, 999.0, 999.0, "web", "999.00 $")
            .await;
        assert!(err.is_err());

        let accounts = ledger.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance, 100.0);
        assert_eq!(ledger.transactions().await.unwrap().len(), 1);
        assert!((ledger.total_usd().await.unwrap() - 100.0).abs() < 1e-9);

        let err = ledger.find_or_create(Currency::EUR).await;
        assert!(err.is_err());
        assert_eq!(ledger.accounts().await.unwrap().len(), 1);

        let err = ledger.put_info("total_balance_usd", "999").await;
        assert!(err.is_err());
        assert_eq!(ledger.get_info("total_balance_usd").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_or_create_existing_account_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JsonLedger::open(path.clone()).await.unwrap();
        ledger.find_or_create(Currency::RUB).await.unwrap();
        assert!(path.exists());

        // With the account already present the lookup must not touch the
        // file: after deleting it, a repeat call still succeeds and does not
        // recreate it.
        std::fs::remove_file(&path).unwrap();
        let account = ledger.find_or_create(Currency::RUB).await.unwrap();
        assert_eq!(account.currency, "RUB");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        {
            let ledger = JsonLedger::open(path.clone()).await.unwrap();
            ledger
                .replace_balance(Currency::IDR, 900000.0, 58.5, "telegram", "Rp 900,000")
                .await
                .unwrap();
            ledger.put_info("total_balance_usd", "58.5").await.unwrap();
        }
        let ledger = JsonLedger::open(path).await.unwrap();
        let accounts = ledger.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].currency, "IDR");
        assert_eq!(accounts[0].balance, 900000.0);
        assert_eq!(
            ledger.get_info("total_balance_usd").await.unwrap().as_deref(),
            Some("58.5")
        );
    }
}
