use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber: human-readable console output plus a
/// daily-rotated JSON file under `logs/`.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "gigwire.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env().add_directive("gigwire=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The writer guard must outlive the process or buffered lines are lost.
    std::mem::forget(guard);
}
