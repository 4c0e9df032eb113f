//! Download stage: parallel shard downloads with retries
//!
//! Each URL is fetched by one worker of a dedicated rayon pool. Bodies
//! are streamed to a hidden `.part` file and renamed into place once
//! complete, so a non-empty destination always means a finished
//! download and is skipped on the next run.

use crate::config::ResolvedDownload;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::progress::ProgressReporter;
use rayon::prelude::*;
use reqwest::blocking::Client;
use reqwest::Url;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Base delay between attempts; attempt `n` waits `n` times this
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// HTTP client settings shared by every downloader.
///
/// `timeout` bounds connection setup and each individual read of the
/// body, so a stalled transfer fails instead of pinning a worker while
/// large shards that keep streaming are never cut off.
pub fn client_builder(timeout: Duration) -> reqwest::blocking::ClientBuilder {
    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(concat!("dolma-runner/", env!("CARGO_PKG_VERSION")))
}

/// Load URLs from a text file (one per line) or a comma-separated list
pub fn load_urls(source: &str) -> Result<Vec<String>> {
    let path = Path::new(source);
    if path.is_file() {
        let text = std::fs::read_to_string(path).with_path(path)?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect());
    }

    let urls: Vec<String> = source
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect();

    // A lone entry without a scheme is a URL file that does not exist
    if let [only] = urls.as_slice() {
        if !only.contains("://") {
            return Err(PipelineError::NotFound(PathBuf::from(only)));
        }
    }
    Ok(urls)
}

/// Last path segment of the URL, used as the local file name
pub fn safe_filename(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Result for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched in `attempts` tries
    Downloaded { bytes: u64, attempts: usize },
    /// Destination already present and non-empty
    Skipped,
    /// Every attempt failed
    Failed { attempts: usize, error: String },
}

/// Download stage result
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    /// Files fetched
    pub downloaded: u64,
    /// Files already present
    pub skipped: u64,
    /// (url, last error) for URLs that could not be fetched
    pub failures: Vec<(String, String)>,
    /// Bytes written
    pub bytes: u64,
    /// Output directory
    pub output_dir: PathBuf,
    /// Total duration
    pub duration: Duration,
}

impl DownloadSummary {
    /// Were all URLs downloaded or skipped?
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Download Summary ===");
        println!("Downloaded:      {}", self.downloaded);
        println!("Skipped:         {}", self.skipped);
        println!("Bytes:           {}", humansize::format_size(self.bytes, humansize::BINARY));
        println!("Duration:        {:.2?}", self.duration);
        println!("Saved in:        {}", self.output_dir.display());

        if !self.failures.is_empty() {
            println!("\nFailures: {}", self.failures.len());
            for (url, error) in &self.failures {
                println!("  {} - {}", url, error);
            }
        }
    }
}

/// Parallel shard downloader
pub struct Downloader {
    settings: ResolvedDownload,
    client: Client,
    workers: usize,
    retry_backoff: Duration,
    progress: ProgressReporter,
}

impl Downloader {
    /// Create a downloader using `workers` parallel transfers
    pub fn new(settings: ResolvedDownload, workers: usize) -> Result<Self> {
        let client = client_builder(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            client,
            workers: workers.max(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            progress: ProgressReporter::disabled(),
        })
    }

    /// Replace the HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Set the base delay between attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Attach a progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Download every URL; per-URL failures are collected, not returned
    pub fn execute(&self, urls: &[String]) -> Result<DownloadSummary> {
        let start = Instant::now();

        if urls.is_empty() {
            error!("No URLs found, check urls_file in the download config.");
            return Err(PipelineError::EmptyInput("no URLs to download".into()));
        }

        let out_dir = &self.settings.output_dir;
        std::fs::create_dir_all(out_dir).with_path(out_dir)?;

        info!("download start: {} files -> {}", urls.len(), out_dir.display());
        self.progress.set_total_items(urls.len() as u64);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("download-{}", i))
            .build()
            .map_err(|e| PipelineError::ThreadPoolError(e.to_string()))?;

        // Two URLs with the same file name would write the same destination
        let mut owners: HashMap<String, &str> = HashMap::new();
        let collisions: Vec<Option<String>> = urls
            .iter()
            .map(|url| {
                let name = safe_filename(url);
                if name.is_empty() {
                    return None;
                }
                match owners.get(&name) {
                    Some(first) => Some(format!("file name {} already used by {}", name, first)),
                    None => {
                        owners.insert(name, url.as_str());
                        None
                    }
                }
            })
            .collect();

        let outcomes: Vec<(String, DownloadOutcome)> = pool.install(|| {
            urls.par_iter()
                .zip(collisions.par_iter())
                .map(|(url, collision)| {
                    let outcome = match collision {
                        Some(reason) => {
                            error!("failed: {}: {}", url, reason);
                            DownloadOutcome::Failed {
                                attempts: 0,
                                error: reason.clone(),
                            }
                        }
                        None => self.download_one(url),
                    };
                    self.progress.increment_items(1);
                    (url.clone(), outcome)
                })
                .collect()
        });

        let mut summary = DownloadSummary {
            output_dir: out_dir.clone(),
            ..Default::default()
        };
        for (url, outcome) in outcomes {
            match outcome {
                DownloadOutcome::Downloaded { bytes, .. } => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                }
                DownloadOutcome::Skipped => summary.skipped += 1,
                DownloadOutcome::Failed { error, .. } => summary.failures.push((url, error)),
            }
        }
        summary.duration = start.elapsed();

        self.progress.finish("download complete");
        info!("download complete.");
        info!("files saved in: {}", out_dir.display());

        Ok(summary)
    }

    /// Fetch one URL with retries
    pub fn download_one(&self, url: &str) -> DownloadOutcome {
        let name = safe_filename(url);
        if name.is_empty() {
            error!("failed: {} has no file name", url);
            return DownloadOutcome::Failed {
                attempts: 0,
                error: "URL has no file name".to_string(),
            };
        }

        let dest = self.settings.output_dir.join(&name);
        if std::fs::metadata(&dest).map(|m| m.len() > 0).unwrap_or(false) {
            info!("skip existing: {}", name);
            return DownloadOutcome::Skipped;
        }

        let part = self.settings.output_dir.join(format!(".{}.part", name));
        let retry = self.settings.retry_limit.max(1);
        let mut last_error = String::new();
        let mut attempts = 0;

        for attempt in 1..=retry {
            attempts = attempt;
            match self.attempt(url, &name, &part, &dest, attempt, retry) {
                Ok(bytes) => {
                    info!("done: {}", name);
                    return DownloadOutcome::Downloaded {
                        bytes,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!("error {} (try {}): {}", name, attempt, e);
                    let _ = std::fs::remove_file(&part);
                    last_error = e.to_string();
                    if !e.is_recoverable() {
                        break;
                    }
                    if attempt < retry {
                        std::thread::sleep(self.retry_backoff * attempt as u32);
                    }
                }
            }
        }

        error!("failed: {}", name);
        DownloadOutcome::Failed {
            attempts,
            error: last_error,
        }
    }

    fn attempt(
        &self,
        url: &str,
        name: &str,
        part: &Path,
        dest: &Path,
        attempt: usize,
        retry: usize,
    ) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::download(url, format!("HTTP {}", status)));
        }

        let total = response.content_length().unwrap_or(0);
        let bar = self.progress.add_transfer(
            &format!("{} (try {}/{})", name, attempt, retry),
            total,
        );

        let chunk = self.settings.chunk_bytes.max(1);
        let file = File::create(part).with_path(part)?;
        let mut writer = BufWriter::with_capacity(chunk, file);
        let mut buf = vec![0u8; chunk];
        let mut written = 0u64;

        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| PipelineError::download(url, e.to_string()))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).with_path(part)?;
            written += n as u64;
            bar.inc(n as u64);
            self.progress.increment_bytes(n as u64);
        }

        writer.flush().with_path(part)?;
        drop(writer);
        bar.finish_and_clear();

        if total > 0 && written != total {
            return Err(PipelineError::download(
                url,
                format!("truncated body: {} of {} bytes", written, total),
            ));
        }

        std::fs::rename(part, dest).with_path(dest)?;
        Ok(written)
    }
}
