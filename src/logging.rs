use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    fmt::{
        self,
        format::{Format, Full},
        time::SystemTime,
    },
    prelude::*,
};

fn base_format() -> Format<Full, SystemTime> {
    fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_file(true)
        .with_target(true)
        .with_thread_names(true)
}

/// Stdout logging always; when `base_log_dir` is set, also daily-rolling
/// plain and JSON files under it.
pub fn setup_logging(base_log_dir: &str) {
    let stdout_layer =
        tracing_subscriber::fmt::layer().event_format(base_format().with_ansi(true));

    // Dependency chatter stays at INFO; our own modules log at DEBUG.
    let filter = Targets::new()
        .with_target("sqlx", Level::INFO)
        .with_target("hyper_util", Level::INFO)
        .with_target("reqwest", Level::INFO)
        .with_default(Level::DEBUG);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer);

    if base_log_dir.is_empty() {
        subscriber.init();
    } else {
        let plain_layer = tracing_subscriber::fmt::layer()
            .event_format(base_format())
            .with_writer(tracing_appender::rolling::daily(
                base_log_dir,
                "balance-snap.log",
            ));
        let json_layer = tracing_subscriber::fmt::layer()
            .event_format(base_format().json())
            .with_writer(tracing_appender::rolling::daily(
                format!("{}/structured", base_log_dir),
                "balance-snap.log",
            ));
        subscriber.with(plain_layer).with(json_layer).init();
    }
}
