use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use balance_snap::AppState;
use balance_snap::args::parse_args;
use balance_snap::handlers::{
    add_balance, get_accounts, get_history, get_rates, health, process_image, refresh_rates,
};
use balance_snap::jobs::rate_refresh_task;
use balance_snap::ledger::{JsonLedger, LedgerStore, PgLedger};
use balance_snap::logging::setup_logging;
use balance_snap::ocr::GoogleVisionOcr;
use balance_snap::rates::{HttpRateProvider, RateCache};
use balance_snap::tracker::Tracker;

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir);

    let timeout = Duration::from_secs(args.http_timeout);

    let ledger: Arc<dyn LedgerStore> = match &args.database_url {
        Some(database_url) => {
            tracing::info!("Using PostgreSQL ledger");
            Arc::new(
                PgLedger::connect(database_url)
                    .await
                    .expect("Failed to connect to PostgreSQL"),
            )
        }
        None => {
            tracing::info!("Using JSON file ledger at {}", &args.data_file);
            Arc::new(
                JsonLedger::open(PathBuf::from(&args.data_file))
                    .await
                    .expect("Failed to open JSON ledger file"),
            )
        }
    };

    let ocr = GoogleVisionOcr::new(args.vision_endpoint, args.vision_api_key, timeout)
        .expect("Failed to build Vision client");
    let rates = RateCache::new(Arc::new(
        HttpRateProvider::new(args.rates_url, timeout).expect("Failed to build rates client"),
    ));

    let app_state = Arc::new(AppState {
        tracker: Tracker::new(ledger, Arc::new(ocr), Arc::new(rates)),
        rate_refresh_interval: args.rate_refresh_interval,
    });

    tracing::info!("Spawning background tasks...");
    tokio::spawn(rate_refresh_task(app_state.clone()));

    let app = Router::new()
        .route("/api/process-image", post(process_image))
        .route("/api/add-balance", post(add_balance))
        .route("/api/accounts", get(get_accounts))
        .route("/api/history", get(get_history))
        .route("/api/rates", get(get_rates))
        .route("/api/rates/refresh", post(refresh_rates))
        .route("/health", get(health))
        .with_state(app_state);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
