//! Stage orchestration
//!
//! A run computes one stamp and threads it through the stages: the
//! download stage writes into `{timestamp}`-named directories, the unzip
//! stage finds them again through `download_timestamp`, and the parse
//! stage through `unzip_timestamp`.

use super::{
    load_urls, resolve_workers, DownloadSummary, Downloader, ParseStage, ParseSummary, UnzipStage,
    UnzipSummary,
};
use crate::config::{
    stage_vars, stamp, DownloadConfig, ParseConfig, Stage, UnzipConfig, Vars,
    DEFAULT_DOWNLOAD_CONFIG, DEFAULT_PARSE_CONFIG, DEFAULT_UNZIP_CONFIG,
};
use crate::error::{PipelineError, Result};
use crate::logging::JobLog;
use crate::progress::ProgressReporter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Job log file name for a stage
pub fn stage_log_path(logs_dir: &Path, stage: &str) -> PathBuf {
    logs_dir.join(format!("dolma_{}.log", stage))
}

/// Shared knobs for running a single stage
#[derive(Clone, Default)]
pub struct StageContext {
    /// Per-stage log file switch
    pub job_log: JobLog,
    /// Show progress bars
    pub show_progress: bool,
}

impl StageContext {
    fn progress(&self, label: &str) -> ProgressReporter {
        if self.show_progress {
            ProgressReporter::new(label)
        } else {
            ProgressReporter::disabled()
        }
    }
}

/// Load, resolve and run the download stage
pub fn run_download(config: &Path, vars: &Vars, ctx: &StageContext) -> Result<DownloadSummary> {
    let settings = DownloadConfig::load(config)?.resolve(vars);
    let _log = ctx.job_log.attach(&stage_log_path(&settings.logs_dir, "download"))?;

    info!("download stage: config {}", config.display());
    let urls = load_urls(&settings.urls)?;
    let workers = resolve_workers(settings.workers);

    Downloader::new(settings, workers)?
        .with_progress(ctx.progress("download"))
        .execute(&urls)
}

/// Load, resolve and run the unzip stage
pub fn run_unzip(config: &Path, vars: &Vars, ctx: &StageContext) -> Result<UnzipSummary> {
    let settings = UnzipConfig::load(config)?.resolve(vars);
    let _log = ctx.job_log.attach(&stage_log_path(&settings.logs_dir, "unzip"))?;

    info!("unzip stage: config {}", config.display());
    let workers = resolve_workers(settings.workers);

    UnzipStage::new(settings, workers)
        .with_progress(ctx.progress("unzip"))
        .execute()
}

/// Load, resolve and run the parse stage
pub fn run_parse(config: &Path, vars: &Vars, ctx: &StageContext) -> Result<ParseSummary> {
    let settings = ParseConfig::load(config)?.resolve(vars);
    let _log = ctx.job_log.attach(&stage_log_path(&settings.logs_dir, "parse"))?;

    info!("parse stage: config {}", config.display());
    ParseStage::new(settings)
        .with_progress(ctx.progress("parse"))
        .execute()
}

/// Config file for each stage
#[derive(Debug, Clone)]
pub struct StageConfigs {
    pub download: PathBuf,
    pub unzip: PathBuf,
    pub parse: PathBuf,
}

impl Default for StageConfigs {
    fn default() -> Self {
        Self {
            download: PathBuf::from(DEFAULT_DOWNLOAD_CONFIG),
            unzip: PathBuf::from(DEFAULT_UNZIP_CONFIG),
            parse: PathBuf::from(DEFAULT_PARSE_CONFIG),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Run stamp shared by all stages
    pub stamp: String,
    pub download: Option<DownloadSummary>,
    pub unzip: Option<UnzipSummary>,
    pub parse: Option<ParseSummary>,
    /// Total duration
    pub duration: Duration,
}

impl RunReport {
    /// Print every stage summary
    pub fn print_summary(&self) {
        if let Some(s) = &self.download {
            s.print_summary();
        }
        if let Some(s) = &self.unzip {
            s.print_summary();
        }
        if let Some(s) = &self.parse {
            s.print_summary();
        }
        println!("\nRun {} finished in {:.2?}", self.stamp, self.duration);
    }
}

/// Runs the selected stages in order, aborting on the first failure
pub struct PipelineRunner {
    configs: StageConfigs,
    ctx: StageContext,
    stamp: Option<String>,
}

impl PipelineRunner {
    /// Create a runner
    pub fn new(configs: StageConfigs, ctx: StageContext) -> Self {
        Self {
            configs,
            ctx,
            stamp: None,
        }
    }

    /// Use a fixed run stamp instead of the current time
    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = Some(stamp.into());
        self
    }

    /// Run `stage`
    pub fn run(&self, stage: Stage) -> Result<RunReport> {
        let start = Instant::now();
        let run_stamp = self.stamp.clone().unwrap_or_else(stamp);
        info!("pipeline start: stage={} stamp={}", stage.as_arg(), run_stamp);

        let mut report = RunReport {
            stamp: run_stamp.clone(),
            ..Default::default()
        };

        if stage.includes_download() {
            let vars = stage_vars(&run_stamp, &Vars::new());
            let summary = run_download(&self.configs.download, &vars, &self.ctx)
                .map_err(|e| Self::failed(e, "download"))?;
            report.download = Some(summary);
        }

        if stage.includes_unzip() {
            let overrides = Vars::from([(
                "download_timestamp".to_string(),
                format!("{}_download", run_stamp),
            )]);
            let vars = stage_vars(&run_stamp, &overrides);
            let summary = run_unzip(&self.configs.unzip, &vars, &self.ctx)
                .map_err(|e| Self::failed(e, "unzip"))?;
            report.unzip = Some(summary);
        }

        if stage.includes_parse() {
            let overrides = Vars::from([(
                "unzip_timestamp".to_string(),
                format!("{}_unzip", run_stamp),
            )]);
            let vars = stage_vars(&run_stamp, &overrides);
            let summary = run_parse(&self.configs.parse, &vars, &self.ctx)
                .map_err(|e| Self::failed(e, "parse"))?;
            report.parse = Some(summary);
        }

        report.duration = start.elapsed();
        info!("pipeline complete in {:.2?}", report.duration);
        Ok(report)
    }

    fn failed(e: PipelineError, stage: &str) -> PipelineError {
        error!("{} stage failed: {}", stage, e);
        e.in_stage(stage)
    }
}
