//! Pipeline stages and the runner that chains them
//!
//! Stages run in-process, one after another. Each stage parallelizes
//! its per-file work on its own rayon pool.

pub mod blog;
mod download;
mod parse;
mod runner;
mod unzip;

pub use blog::{extract_record, is_blog_url, BlogRecord, Rejection, BLOG_DOMAINS, CSV_HEADER};
pub use download::*;
pub use parse::*;
pub use runner::*;
pub use unzip::*;

use crate::system::JobInfo;

/// Worker count for a stage: the configured value, else the CPUs of the
/// Slurm allocation, else every CPU on the machine.
pub fn resolve_workers(configured: Option<usize>) -> usize {
    configured
        .filter(|&n| n > 0)
        .or_else(|| JobInfo::collect().total_cpus().map(|n| n as usize))
        .unwrap_or_else(num_cpus::get)
        .max(1)
}
