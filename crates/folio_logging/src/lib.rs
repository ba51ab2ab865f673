//! Shared logging utilities for FOLIO Enrich binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "folio_enrich=info,folio_pipeline=info,folio_match=info";
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by FOLIO Enrich binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a size-capped file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedRollingWriter::new(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// FOLIO Enrich home directory: ~/.folio_enrich (FOLIO_ENRICH_HOME overrides).
pub fn enrich_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FOLIO_ENRICH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".folio_enrich")
}

/// Logs directory: ~/.folio_enrich/logs
pub fn logs_dir() -> PathBuf {
    enrich_home().join("logs")
}

/// Jobs data directory: ~/.folio_enrich/jobs
pub fn jobs_dir() -> PathBuf {
    enrich_home().join("jobs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// File writer that rolls to `<app>.log.old` when the size cap is hit.
#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingState>>,
}

struct RollingState {
    path: PathBuf,
    file: File,
    written: u64,
}

impl SharedRollingWriter {
    fn new(dir: PathBuf, app_name: &str) -> Result<Self> {
        let path = dir.join(format!("{app_name}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingState {
                path,
                file,
                written,
            })),
        })
    }
}

impl RollingState {
    fn roll_if_needed(&mut self) -> io::Result<()> {
        if self.written < MAX_LOG_FILE_SIZE {
            return Ok(());
        }
        let old = self.path.with_extension("log.old");
        let _ = fs::rename(&self.path, &old);
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log writer poisoned"))?;
        state.roll_if_needed()?;
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log writer poisoned"))?;
        state.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_override() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FOLIO_ENRICH_HOME", dir.path());
        assert_eq!(enrich_home(), dir.path());
        assert!(jobs_dir().ends_with("jobs"));
        std::env::remove_var("FOLIO_ENRICH_HOME");
    }

    #[test]
    fn test_rolling_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SharedRollingWriter::new(dir.path().to_path_buf(), "test").unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();
        let content = fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(content, "hello\n");
    }
}
