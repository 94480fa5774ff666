//! Log setup. The terminal belongs to the UI, so events go to a file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "STRATUS_LOG";
pub const LOG_FILE_ENV: &str = "STRATUS_LOG_FILE";

/// Log file path with precedence: explicit, `STRATUS_LOG_FILE`, then `fallback`.
pub fn resolve_log_file_path(explicit: Option<PathBuf>, fallback: &Path) -> PathBuf {
    resolve_with(explicit, std::env::var(LOG_FILE_ENV).ok(), fallback)
}

fn resolve_with(explicit: Option<PathBuf>, env: Option<String>, fallback: &Path) -> PathBuf {
    if let Some(p) = explicit
        && !p.as_os_str().is_empty()
    {
        return p;
    }
    if let Some(p) = env
        && !p.is_empty()
    {
        return PathBuf::from(p);
    }
    fallback.to_path_buf()
}

/// Filter from `STRATUS_LOG`, else `default_level`.
pub fn build_env_filter(default_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level).with_context(|| format!("invalid log level {}", default_level))
}

/// Install the global subscriber writing to `path`. A second call is a no-op.
pub fn init(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = build_env_filter("info")?;
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
    Ok(())
}
