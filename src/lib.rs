//! # dolma-runner - Dolma corpus preparation for HPC clusters
//!
//! dolma-runner downloads Dolma-style JSONL shards, decompresses them and
//! extracts blog posts into a CSV, and it is meant to run as a Slurm batch
//! job. Every stage reads its own YAML config whose paths are templates
//! filled with a per-run stamp.
//!
//! ## Features
//!
//! - **Parallel Downloads**: rayon worker pool with retries and resumable skips
//! - **Streaming Decompression**: multi-member gzip and long-window zstd
//! - **Blog Extraction**: URL heuristics over JSONL documents, CSV output
//! - **Per-stage Job Logs**: one log file per stage next to its outputs
//! - **Slurm Integration**: job script generation, submission and status
//!
//! ## Quick Start
//!
//! ```no_run
//! use dolma_runner::config::Stage;
//! use dolma_runner::pipeline::{PipelineRunner, StageConfigs, StageContext};
//!
//! let report = PipelineRunner::new(StageConfigs::default(), StageContext::default())
//!     .run(Stage::Both)
//!     .unwrap();
//! report.print_summary();
//! ```
//!
//! ## Batch Jobs
//!
//! ```no_run
//! use dolma_runner::system::{JobConfig, JobScheduler};
//!
//! let scheduler = JobScheduler::new();
//! println!("{}", scheduler.generate_slurm_script(&JobConfig::default()));
//! let job_id = scheduler.submit(&JobConfig::default()).unwrap();
//! println!("Submitted {}", job_id);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod system;

// Re-export commonly used types
pub use config::{CliArgs, Stage};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineRunner, RunReport};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use dolma_runner::prelude::*;
    //! ```

    pub use crate::config::{fill_vars, parse_vars, stamp, Stage, Vars};
    pub use crate::error::{PipelineError, Result};
    pub use crate::fs::{Codec, Decompressor};
    pub use crate::pipeline::{
        is_blog_url, Downloader, ParseStage, PipelineRunner, StageConfigs, StageContext, UnzipStage,
    };
    pub use crate::progress::ProgressReporter;
    pub use crate::system::{JobConfig, JobInfo, JobScheduler};
}
