//! Logging setup
//!
//! One global `tracing` subscriber is installed per process. Besides the
//! console and the optional master log file, it carries a [`JobLog`]
//! layer whose target file is switched by each stage, so every stage
//! writes its own `dolma_<stage>.log` next to its outputs.

use crate::config::LoggingConfig;
use crate::error::{PipelineError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Switchable per-stage log file.
///
/// Writes are dropped while no file is attached.
#[derive(Clone, Default)]
pub struct JobLog {
    target: Arc<Mutex<Option<File>>>,
}

impl JobLog {
    /// Create a detached job log
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.target.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start appending log lines to `path` until the guard is dropped
    pub fn attach(&self, path: &Path) -> Result<JobLogGuard<'_>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::io(path, e))?;

        *self.lock() = Some(file);
        Ok(JobLogGuard { log: self })
    }

    /// Stop writing to the current file
    pub fn detach(&self) {
        if let Some(mut file) = self.lock().take() {
            let _ = file.flush();
        }
    }
}

impl Write for JobLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for JobLog {
    type Writer = JobLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Detaches the job log on drop
pub struct JobLogGuard<'a> {
    log: &'a JobLog,
}

impl Drop for JobLogGuard<'_> {
    fn drop(&mut self) {
        self.log.detach();
    }
}

fn build_filter(cfg: &LoggingConfig, verbose: u8) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return Ok(EnvFilter::from_default_env());
    }

    let directive = match verbose {
        0 => cfg.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    EnvFilter::try_new(directive)
        .map_err(|e| PipelineError::LoggingError(format!("Invalid level '{}': {}", directive, e)))
}

/// Install the global subscriber and return the per-stage job log handle
pub fn init(cfg: &LoggingConfig, verbose: u8) -> Result<JobLog> {
    let filter = build_filter(cfg, verbose)?;
    let job_log = JobLog::new();

    let console = cfg.console.then(|| {
        if cfg.json {
            fmt::layer().json().with_writer(io::stderr).boxed()
        } else {
            fmt::layer().with_target(false).with_writer(io::stderr).boxed()
        }
    });

    let master = match &cfg.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| PipelineError::io(path, e))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)).boxed())
        }
        None => None,
    };

    let job = fmt::layer()
        .with_ansi(false)
        .with_writer(job_log.clone())
        .boxed();

    tracing_subscriber::registry()
        .with(console)
        .with(master)
        .with(job)
        .with(filter)
        .try_init()
        .map_err(|e| PipelineError::LoggingError(e.to_string()))?;

    Ok(job_log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_job_log_attach_and_detach() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/dolma_download.log");
        let log = JobLog::new();

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(log.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("before attach");
            {
                let _guard = log.attach(&path).unwrap();
                tracing::info!("inside stage");
            }
            tracing::info!("after detach");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("inside stage"));
        assert!(!contents.contains("before attach"));
        assert!(!contents.contains("after detach"));
    }

    #[test]
    fn test_detached_writes_are_dropped() {
        let mut log = JobLog::new();
        assert_eq!(log.write(b"nowhere").unwrap(), 7);
        log.flush().unwrap();
    }

    #[test]
    fn test_verbose_overrides_level() {
        let cfg = LoggingConfig {
            level: "not a [valid directive".to_string(),
            ..Default::default()
        };
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert!(build_filter(&cfg, 1).is_ok());
        }
    }
}
