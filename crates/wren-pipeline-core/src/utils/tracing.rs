use chrono::Local;
use std::io;
use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

pub const LOG_DIR_ENV: &str = "WREN_PIPELINE_LOG_DIR";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing. Filtering comes from `RUST_LOG` (default `info`).
///
/// When `WREN_PIPELINE_LOG_DIR` is set, logs go to a timestamp-named file in
/// that directory; otherwise they go to stderr.
pub fn init_tracing() -> io::Result<()> {
    match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => init_file_tracing(Path::new(&dir)),
        _ => init_stderr_tracing(),
    }
}

fn init_file_tracing(log_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_name = format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"));
    let file_appender = rolling::never(log_dir, &file_name);

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_file(true)
                .with_line_number(true),
        )
        .with(env_filter());

    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

    tracing::debug!(
        target: "wren::utils::tracing",
        path = %log_dir.join(&file_name).display(),
        "Tracing initialized with file output. Filter configured via RUST_LOG env var."
    );
    Ok(())
}

fn init_stderr_tracing() -> io::Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::default()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
        .with(env_filter());

    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

    tracing::debug!(
        target: "wren::utils::tracing",
        "Tracing initialized with stderr output. Filter configured via RUST_LOG env var."
    );
    Ok(())
}
