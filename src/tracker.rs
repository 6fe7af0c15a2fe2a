use std::sync::Arc;

use serde::Serialize;

use crate::currency::Currency;
use crate::domain::{Account, TOTAL_BALANCE_KEY, Transaction};
use crate::error::{Result, TrackerError};
use crate::extractor::{self, Candidate};
use crate::history::{self, HistoryPoint, round_cents};
use crate::ledger::LedgerStore;
use crate::ocr::OcrClient;
use crate::rates::RateCache;

/// Result of one committed balance update from a screenshot.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub account: Account,
    /// The selected candidate the ledger was updated from.
    pub main_balance: Candidate,
    pub all_balances: Vec<Candidate>,
    pub text_lines: Vec<String>,
    /// Signed native-currency change on the account.
    pub change: f64,
    pub total_balance_usd: f64,
    /// Aggregate movement since the previously reported total.
    pub total_change_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct ManualUpdate {
    pub account: Account,
    pub transaction: Transaction,
    pub total_balance_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct AccountsSummary {
    pub accounts: Vec<Account>,
    pub total_balance_usd: f64,
}

/// Orchestrates OCR -> extraction -> ledger update. Collaborators are
/// injected once at startup and shared by reference; the tracker itself is
/// cheap to clone.
#[derive(Clone)]
pub struct Tracker {
    ledger: Arc<dyn LedgerStore>,
    ocr: Arc<dyn OcrClient>,
    rates: Arc<RateCache>,
}

impl Tracker {
    pub fn new(ledger: Arc<dyn LedgerStore>, ocr: Arc<dyn OcrClient>, rates: Arc<RateCache>) -> Self {
        Self { ledger, ocr, rates }
    }

    pub fn rates(&self) -> &RateCache {
        &self.rates
    }

    /// Full update workflow for one screenshot. No account is created when
    /// extraction fails; the ledger write commits as a single unit.
    pub async fn process_image(&self, image: &[u8], source: &str) -> Result<Snapshot> {
        let lines = self.ocr.detect_text(image).await?;
        if lines.iter().all(|line| line.trim().is_empty()) {
            return Err(TrackerError::NoTextDetected);
        }

        let candidates = extractor::extract(&lines);
        let Some(main) = extractor::select_main(&candidates).cloned() else {
            return Err(TrackerError::NoBalanceFound { lines });
        };

        tracing::info!(
            "Selected main balance {} {} from line {:?} ({} candidates)",
            main.value,
            main.currency,
            main.source_line,
            candidates.len()
        );

        let balance_usd = self.rates.convert(main.parsed, main.currency).await;
        let (account, transaction) = self
            .ledger
            .replace_balance(
                main.currency,
                main.parsed,
                balance_usd,
                source,
                &main.source_line,
            )
            .await?;

        let (total, total_change) = self.report_total().await?;

        tracing::info!(
            "Updated account id={} balance={} {} (${:.2}), total=${:.2}",
            account.id,
            account.balance,
            account.currency,
            account.balance_usd,
            total
        );

        Ok(Snapshot {
            account,
            main_balance: main,
            all_balances: candidates,
            text_lines: lines,
            change: transaction.change,
            total_balance_usd: total,
            total_change_usd: total_change,
        })
    }

    /// Manually set an account's balance, bypassing OCR.
    pub async fn set_balance(
        &self,
        amount: f64,
        currency: Currency,
        source: &str,
    ) -> Result<ManualUpdate> {
        let balance_usd = self.rates.convert(amount, currency).await;
        let (account, transaction) = self
            .ledger
            .replace_balance(currency, amount, balance_usd, source, "")
            .await?;
        let (total, _) = self.report_total().await?;
        Ok(ManualUpdate {
            account,
            transaction,
            total_balance_usd: total,
        })
    }

    pub async fn list_accounts(&self) -> Result<AccountsSummary> {
        let accounts = self.ledger.accounts().await?;
        let total = round_cents(self.ledger.total_usd().await?);
        Ok(AccountsSummary {
            accounts,
            total_balance_usd: total,
        })
    }

    pub async fn history(&self) -> Result<Vec<HistoryPoint>> {
        history::daily_totals(&*self.ledger, &self.rates).await
    }

    /// Recompute the aggregate total, store it as the last reported snapshot
    /// and return it together with the movement since the previous snapshot.
    async fn report_total(&self) -> Result<(f64, f64)> {
        let total = round_cents(self.ledger.total_usd().await?);
        let previous = self
            .ledger
            .get_info(TOTAL_BALANCE_KEY)
            .await?
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(0.0);
        self.ledger
            .put_info(TOTAL_BALANCE_KEY, &total.to_string())
            .await?;
        Ok((total, round_cents(total - previous)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JsonLedger;
    use crate::rates::RateProvider;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubOcr {
        lines: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl OcrClient for StubOcr {
        async fn detect_text(&self, _image: &[u8]) -> Result<Vec<String>> {
            match &self.lines {
                Some(lines) => Ok(lines.iter().map(|s| s.to_string()).collect()),
                None => Err(TrackerError::ProviderUnavailable("stub down".into())),
            }
        }
    }

    struct DeadRates;

    #[async_trait]
    impl RateProvider for DeadRates {
        async fn fetch_usd_base_rates(&self) -> Result<HashMap<String, f64>> {
            Err(TrackerError::ProviderUnavailable("stub down".into()))
        }
    }

    async fn tracker_with(lines: Option<Vec<&'static str>>) -> (tempfile::TempDir, Tracker) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonLedger::open(dir.path().join("ledger.json"))
            .await
            .unwrap();
        let tracker = Tracker::new(
            Arc::new(ledger),
            Arc::new(StubOcr { lines }),
            Arc::new(RateCache::new(Arc::new(DeadRates))),
        );
        (dir, tracker)
    }

    #[tokio::test]
    async fn test_no_balance_found_creates_no_account() {
        let (_dir, tracker) = tracker_with(Some(vec!["Настройки", "Профиль"])).await;
        let err = tracker.process_image(b"img", "web").await.unwrap_err();
        match err {
            TrackerError::NoBalanceFound { lines } => assert_eq!(lines.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tracker.list_accounts().await.unwrap().accounts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ocr_output_is_no_text_detected() {
        let (_dir, tracker) = tracker_with(Some(vec![])).await;
        let err = tracker.process_image(b"img", "web").await.unwrap_err();
        assert!(matches!(err, TrackerError::NoTextDetected));
    }

    #[tokio::test]
    async fn test_ocr_failure_surfaces_without_state_change() {
        let (_dir, tracker) = tracker_with(None).await;
        let err = tracker.process_image(b"img", "web").await.unwrap_err();
        assert!(matches!(err, TrackerError::ProviderUnavailable(_)));
        assert!(tracker.list_accounts().await.unwrap().accounts.is_empty());
    }

    #[tokio::test]
    async fn test_total_change_tracks_previous_snapshot() {
        let (_dir, tracker) = tracker_with(Some(vec!["100.00 $"])).await;
        let snapshot = tracker.process_image(b"img", "web").await.unwrap();
        assert_eq!(snapshot.total_balance_usd, 100.0);
        assert_eq!(snapshot.total_change_usd, 100.0);

        let snapshot = tracker.process_image(b"img", "web").await.unwrap();
        assert_eq!(snapshot.total_balance_usd, 100.0);
        assert_eq!(snapshot.total_change_usd, 0.0);
    }

    #[tokio::test]
    async fn test_manual_set_balance_uses_manual_source() {
        let (_dir, tracker) = tracker_with(Some(vec![])).await;
        let update = tracker
            .set_balance(250.0, Currency::EUR, "manual")
            .await
            .unwrap();
        assert_eq!(update.account.balance, 250.0);
        assert_eq!(update.transaction.source, "manual");
        // EUR converted with the fallback table.
        assert!((update.account.balance_usd - 270.0).abs() < 1e-9);
    }
}
