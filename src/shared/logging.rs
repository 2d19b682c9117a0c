use std::path::Path;

use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize service logging: console always, plus a daily-rotated file
/// when the log directory is writable. Level is controlled via RUST_LOG.
pub fn init_service_logging(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (console_writer, console_guard) = non_blocking(std::io::stdout());

    if log_dir_writable(log_dir) {
        let _ = archive_previous_log(log_dir, service_name);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_ansi(true)
            .with_target(false);

        let (file_writer, file_guard) =
            non_blocking(rolling::daily(log_dir, format!("{service_name}.log")));
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();

        // Writer guards must outlive the process
        std::mem::forget(file_guard);
        std::mem::forget(console_guard);

        info!("Logging to {log_dir}/{service_name}.log");
    } else {
        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        std::mem::forget(console_guard);

        info!("Logging to console only (log directory not writable)");
    }

    Ok(())
}

fn log_dir_writable(log_dir: &str) -> bool {
    let probe = format!("{log_dir}/.write_probe");
    std::fs::create_dir_all(log_dir)
        .and_then(|_| std::fs::File::create(&probe))
        .map(|_| std::fs::remove_file(&probe))
        .is_ok()
}

/// Move the previous run's log aside so every start begins a fresh file.
fn archive_previous_log(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let current = format!("{log_dir}/{service_name}.log");
    if Path::new(&current).exists() {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        std::fs::rename(&current, format!("{log_dir}/{service_name}.{stamp}.log"))?;
    }
    Ok(())
}
