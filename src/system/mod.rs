//! Batch scheduler integration

pub mod hpc;

pub use hpc::{JobConfig, JobInfo, JobScheduler, JobStatus};
