use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::currency::Currency;
use crate::error::{Result, TrackerError};

/// How long a table fetched from the provider stays valid, in minutes.
const REFRESH_TTL_MINUTES: i64 = 60;
/// Fallback tables expire sooner so the provider gets retried.
const FALLBACK_TTL_MINUTES: i64 = 30;

/// Source of USD-base exchange rates: currency code -> how many units of
/// that currency one USD buys.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_usd_base_rates(&self) -> Result<HashMap<String, f64>>;
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// Fetches USD-base rates over HTTP with a bounded timeout.
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TrackerError::ProviderUnavailable(err.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_usd_base_rates(&self) -> Result<HashMap<String, f64>> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| {
                tracing::error!("Error occurred in request to rates API: {:#?}", err);
                TrackerError::ProviderUnavailable(err.to_string())
            })?;

        let body = res.json::<RatesResponse>().await.map_err(|err| {
            tracing::error!("Error occurred while deserialising rates response: {:#?}", err);
            TrackerError::ProviderUnavailable(err.to_string())
        })?;

        Ok(body.rates)
    }
}

/// Approximate multipliers used when the provider cannot be reached.
fn fallback_rates() -> HashMap<String, f64> {
    HashMap::from([
        ("RUB".to_string(), 0.011),
        ("EUR".to_string(), 1.08),
        ("AED".to_string(), 0.27),
        ("IDR".to_string(), 0.000065),
        ("USD".to_string(), 1.0),
    ])
}

#[derive(Debug, Clone)]
struct RateTable {
    /// Currency code -> multiplier to USD.
    to_usd: HashMap<String, f64>,
    expires_at: DateTime<Utc>,
    from_fallback: bool,
}

impl RateTable {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Time-bounded cache of currency -> USD multipliers. Refreshes swap in a
/// fully built table, so concurrent readers never see a half-updated one.
pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    table: RwLock<Arc<RateTable>>,
}

impl RateCache {
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        // Start expired so the first conversion triggers a refresh.
        let table = RateTable {
            to_usd: fallback_rates(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            from_fallback: true,
        };
        Self {
            provider,
            table: RwLock::new(Arc::new(table)),
        }
    }

    async fn build_table(&self) -> RateTable {
        match self.provider.fetch_usd_base_rates().await {
            Ok(usd_base) => {
                // Provider gives USD -> X; invert to get X -> USD.
                let mut to_usd: HashMap<String, f64> = usd_base
                    .into_iter()
                    .filter(|(_, rate)| *rate > 0.0)
                    .map(|(code, rate)| (code.to_uppercase(), 1.0 / rate))
                    .collect();
                to_usd.insert("USD".to_string(), 1.0);
                RateTable {
                    to_usd,
                    expires_at: Utc::now() + chrono::Duration::minutes(REFRESH_TTL_MINUTES),
                    from_fallback: false,
                }
            }
            Err(err) => {
                tracing::warn!("Rates provider failed, using fallback table: {}", err);
                RateTable {
                    to_usd: fallback_rates(),
                    expires_at: Utc::now() + chrono::Duration::minutes(FALLBACK_TTL_MINUTES),
                    from_fallback: true,
                }
            }
        }
    }

    async fn current_table(&self) -> Arc<RateTable> {
        {
            let table = self.table.read().await;
            if table.is_valid() {
                return table.clone();
            }
        }
        let fresh = Arc::new(self.build_table().await);
        let mut table = self.table.write().await;
        *table = fresh.clone();
        fresh
    }

    /// Multiplier from `currency` to USD. Unknown codes fall back to 1.0,
    /// which is lossy; the warn log makes the condition visible.
    pub async fn usd_multiplier(&self, currency: Currency) -> f64 {
        if currency == Currency::USD {
            return 1.0;
        }
        let table = self.current_table().await;
        match table.to_usd.get(currency.code()) {
            Some(rate) => *rate,
            None => {
                tracing::warn!("No USD rate for currency={}, using 1.0", currency);
                1.0
            }
        }
    }

    pub async fn convert(&self, amount: f64, currency: Currency) -> f64 {
        amount * self.usd_multiplier(currency).await
    }

    /// Snapshot of the current multiplier table.
    pub async fn rates(&self) -> HashMap<String, f64> {
        self.current_table().await.to_usd.clone()
    }

    /// Whether the current table came from the fixed fallback.
    pub async fn is_fallback(&self) -> bool {
        self.table.read().await.from_fallback
    }

    /// Rebuild the table right now regardless of expiry. Returns false when
    /// the provider failed and the fallback table was installed instead.
    pub async fn force_refresh(&self) -> bool {
        let fresh = Arc::new(self.build_table().await);
        let ok = !fresh.from_fallback;
        let mut table = self.table.write().await;
        *table = fresh;
        ok
    }
}
