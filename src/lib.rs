pub mod args;
pub mod currency;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod handlers;
pub mod history;
pub mod jobs;
pub mod ledger;
pub mod logging;
pub mod ocr;
pub mod rates;
pub mod tracker;

use tracker::Tracker;

pub struct AppState {
    pub tracker: Tracker,
    pub rate_refresh_interval: u64,
}
