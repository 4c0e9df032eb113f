//! Command-line settings for the Dolma runner
//!
//! Defines all CLI arguments, subcommands, and value parsers.

use super::stages::{
    DEFAULT_DOWNLOAD_CONFIG, DEFAULT_LOGGING_CONFIG, DEFAULT_PARSE_CONFIG, DEFAULT_UNZIP_CONFIG,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// dolma-runner - Dolma corpus preparation pipeline for HPC clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "dolma-runner")]
#[command(author = "Dolma Runner Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download, decompress and filter Dolma shards")]
#[command(long_about = r#"
dolma-runner prepares Dolma-style JSONL corpora on HPC clusters.

Stages:
  download  - fetch shard URLs in parallel with retries
  unzip     - decompress .gz / .zst shards in parallel
  parse     - extract blog posts from JSONL into one CSV

Examples:
  dolma-runner --stage both                       # download, then unzip
  dolma-runner run --stage all                    # download, unzip, parse
  dolma-runner unzip --config configs/unzip_config.yaml \
      --vars download_timestamp=20251007_120654_download
  dolma-runner job-script                         # print the sbatch script
  dolma-runner submit --cpus 16 --mem 32G         # submit to Slurm
"#)]
pub struct CliArgs {
    /// Logging configuration file
    #[arg(long, global = true, default_value = DEFAULT_LOGGING_CONFIG, value_name = "PATH")]
    pub logging: PathBuf,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (no progress bars)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Stages to run when no subcommand is given
    #[arg(long, value_enum, default_value = "both")]
    pub stage: Stage,

    /// Download stage config
    #[arg(long = "download-cfg", alias = "download_cfg", default_value = DEFAULT_DOWNLOAD_CONFIG)]
    pub download_cfg: PathBuf,

    /// Unzip stage config
    #[arg(long = "unzip-cfg", alias = "unzip_cfg", default_value = DEFAULT_UNZIP_CONFIG)]
    pub unzip_cfg: PathBuf,

    /// Parse stage config
    #[arg(long = "parse-cfg", alias = "parse_cfg", default_value = DEFAULT_PARSE_CONFIG)]
    pub parse_cfg: PathBuf,

    /// Subcommand (the pipeline runs when omitted)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl CliArgs {
    /// The command to execute, with a bare invocation mapped to `run`
    pub fn resolved_command(&self) -> Commands {
        match &self.command {
            Some(cmd) => cmd.clone(),
            None => Commands::Run {
                stage: self.stage,
                download_cfg: self.download_cfg.clone(),
                unzip_cfg: self.unzip_cfg.clone(),
                parse_cfg: self.parse_cfg.clone(),
            },
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one or more pipeline stages in order
    #[command(name = "run")]
    Run {
        /// Stages to run
        #[arg(long, value_enum, default_value = "both")]
        stage: Stage,
        /// Download stage config
        #[arg(long = "download-cfg", alias = "download_cfg", default_value = DEFAULT_DOWNLOAD_CONFIG)]
        download_cfg: PathBuf,
        /// Unzip stage config
        #[arg(long = "unzip-cfg", alias = "unzip_cfg", default_value = DEFAULT_UNZIP_CONFIG)]
        unzip_cfg: PathBuf,
        /// Parse stage config
        #[arg(long = "parse-cfg", alias = "parse_cfg", default_value = DEFAULT_PARSE_CONFIG)]
        parse_cfg: PathBuf,
    },

    /// Download shards listed in the config
    #[command(name = "download")]
    Download {
        /// Path to download_config.yaml
        #[arg(long, default_value = DEFAULT_DOWNLOAD_CONFIG)]
        config: PathBuf,
        /// Template overrides (key=value)
        #[arg(long, num_args = 0.., value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Decompress downloaded shards
    #[command(name = "unzip")]
    Unzip {
        /// Path to unzip_config.yaml
        #[arg(long, default_value = DEFAULT_UNZIP_CONFIG)]
        config: PathBuf,
        /// Template overrides, e.g. download_timestamp=20251007_120654_download
        #[arg(long, num_args = 0.., value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Extract blog posts from JSONL shards into a CSV
    #[command(name = "parse")]
    Parse {
        /// Path to parse_config.yaml
        #[arg(long, default_value = DEFAULT_PARSE_CONFIG)]
        config: PathBuf,
        /// Template overrides, e.g. unzip_timestamp=20251007_141230_unzip
        #[arg(long, num_args = 0.., value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Print the Slurm batch script for a pipeline job
    #[command(name = "job-script")]
    JobScript {
        #[command(flatten)]
        job: JobArgs,
        /// Write the script here instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Submit a pipeline job with sbatch
    #[command(name = "submit")]
    Submit {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Show the state of a submitted job
    #[command(name = "job-status")]
    JobStatus {
        /// Scheduler job ID
        job_id: String,
    },

    /// Cancel a submitted job
    #[command(name = "job-cancel")]
    JobCancel {
        /// Scheduler job ID
        job_id: String,
    },

    /// Show the batch allocation this process runs in
    #[command(name = "job-info")]
    JobInfo,
}

/// Resource and environment overrides for the batch job template
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Job name
    #[arg(long, default_value = "dolma_pipeline")]
    pub job_name: String,
    /// Number of nodes
    #[arg(long)]
    pub nodes: Option<u32>,
    /// Tasks per node
    #[arg(long)]
    pub ntasks_per_node: Option<u32>,
    /// CPUs per task
    #[arg(long, default_value = "8")]
    pub cpus: u32,
    /// Memory per node (e.g. 16G, 512M)
    #[arg(long, default_value = "16G")]
    pub mem: String,
    /// Wall-clock limit (HH:MM:SS, D-HH:MM:SS or 12h)
    #[arg(long, default_value = "12:00:00")]
    pub time: String,
    /// Output log path (%x = job name, %j = job ID)
    #[arg(long, default_value = "logs/%x_%j.out")]
    pub log_path: String,
    /// Partition/queue
    #[arg(long)]
    pub partition: Option<String>,
    /// Account/project
    #[arg(long)]
    pub account: Option<String>,
    /// Environment module to load (failure is ignored)
    #[arg(long, default_value = "rust")]
    pub module: String,
    /// Environment setup script sourced before the run
    #[arg(long, default_value = "scripts/setup_env.sh")]
    pub setup_script: PathBuf,
    /// Stage passed to the runner
    #[arg(long, value_enum, default_value = "both")]
    pub stage: Stage,
}

/// Pipeline stage selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Fetch shards
    Download,
    /// Decompress shards
    Unzip,
    /// Download, then unzip
    #[default]
    Both,
    /// Extract blog posts
    Parse,
    /// Download, unzip, then parse
    All,
}

impl Stage {
    /// Does this selection include the download stage?
    pub fn includes_download(&self) -> bool {
        matches!(self, Self::Download | Self::Both | Self::All)
    }

    /// Does this selection include the unzip stage?
    pub fn includes_unzip(&self) -> bool {
        matches!(self, Self::Unzip | Self::Both | Self::All)
    }

    /// Does this selection include the parse stage?
    pub fn includes_parse(&self) -> bool {
        matches!(self, Self::Parse | Self::All)
    }

    /// Value as accepted by `--stage`
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Unzip => "unzip",
            Self::Both => "both",
            Self::Parse => "parse",
            Self::All => "all",
        }
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if !num.is_finite() || num <= 0.0 {
        return Err(format!("Size must be positive: {}", size));
    }

    Ok((num * multiplier as f64) as u64)
}

/// Parse a wall-clock limit into seconds.
///
/// Accepts the Slurm forms `HH:MM:SS`, `MM:SS` and `D-HH:MM:SS`, or a
/// humantime duration such as `12h` or `90min`.
pub fn parse_time_limit(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if !s.contains(':') {
        return humantime::parse_duration(s)
            .map(|d| d.as_secs())
            .map_err(|e| format!("Invalid time limit '{}': {}", s, e));
    }

    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (
            d.parse::<u64>()
                .map_err(|_| format!("Invalid day count in '{}'", s))?,
            rest,
        ),
        None => (0, s),
    };

    let fields = clock
        .split(':')
        .map(|p| p.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("Invalid time limit '{}'", s))?;

    let (h, m, sec) = match fields.as_slice() {
        [h, m, sec] => (*h, *m, *sec),
        [m, sec] => (0, *m, *sec),
        _ => return Err(format!("Invalid time limit '{}'", s)),
    };

    Ok(days * 86400 + h * 3600 + m * 60 + sec)
}
