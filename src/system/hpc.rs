//! Slurm integration
//!
//! Generates and submits the batch job that runs the pipeline, queries
//! job state, and reads the allocation a running job was given so the
//! stages can size their worker pools from it.

use crate::config::{parse_size, parse_time_limit, JobArgs};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Binary invoked by the generated job script
pub const RUNNER_BIN: &str = "dolma-runner";

/// Allocation of the Slurm job this process runs in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub job_id: Option<String>,
    /// Job name
    pub job_name: Option<String>,
    /// Number of nodes allocated
    pub num_nodes: Option<u32>,
    /// Number of tasks
    pub num_tasks: Option<u32>,
    /// CPUs per task
    pub cpus_per_task: Option<u32>,
    /// CPUs on this node
    pub cpus_on_node: Option<u32>,
    /// Memory per node (bytes)
    pub memory: Option<u64>,
    /// Time limit (seconds)
    pub time_limit: Option<u64>,
    /// Submission directory
    pub work_dir: Option<PathBuf>,
    /// Expanded node list
    pub node_list: Vec<String>,
}

impl JobInfo {
    /// Collect job information from the `SLURM_*` environment
    pub fn collect() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Collect job information through an arbitrary variable lookup
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str| get(key).and_then(|s| s.trim().parse::<u32>().ok());

        Self {
            job_id: get("SLURM_JOB_ID"),
            job_name: get("SLURM_JOB_NAME"),
            num_nodes: num("SLURM_NNODES"),
            num_tasks: num("SLURM_NTASKS"),
            cpus_per_task: num("SLURM_CPUS_PER_TASK"),
            cpus_on_node: num("SLURM_CPUS_ON_NODE"),
            memory: get("SLURM_MEM_PER_NODE").and_then(|s| parse_memory(&s)),
            time_limit: get("SLURM_TIMELIMIT").and_then(|s| parse_time_limit(&s).ok()),
            work_dir: get("SLURM_SUBMIT_DIR").map(PathBuf::from),
            node_list: get("SLURM_JOB_NODELIST")
                .or_else(|| get("SLURM_NODELIST"))
                .map(|s| expand_node_list(&s))
                .unwrap_or_default(),
        }
    }

    /// CPUs available to this job, if running under Slurm
    pub fn total_cpus(&self) -> Option<u32> {
        match (self.num_tasks, self.cpus_per_task) {
            (Some(tasks), Some(cpus)) => Some(tasks * cpus),
            (None, Some(cpus)) => Some(cpus),
            _ => self.cpus_on_node,
        }
    }
}

/// Batch job template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name
    pub name: String,
    /// Number of nodes; left to the scheduler when unset
    pub nodes: Option<u32>,
    /// Tasks per node; left to the scheduler when unset
    pub ntasks_per_node: Option<u32>,
    /// CPUs per task
    pub cpus_per_task: u32,
    /// Memory per node (bytes)
    pub memory: u64,
    /// Time limit (seconds)
    pub time_limit: u64,
    /// Output log path; `%x` is the job name, `%j` the job ID
    pub output: String,
    /// Separate error log path
    pub error: Option<String>,
    /// Partition/queue
    pub partition: Option<String>,
    /// Account/project
    pub account: Option<String>,
    /// Environment module loaded before the run
    pub module: String,
    /// Script sourced before the run
    pub setup_script: PathBuf,
    /// Arguments passed to the runner
    pub runner_args: Vec<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: "dolma_pipeline".to_string(),
            nodes: None,
            ntasks_per_node: None,
            cpus_per_task: 8,
            memory: 16 * 1024 * 1024 * 1024, // 16GB
            time_limit: 12 * 3600,           // 12 hours
            output: "logs/%x_%j.out".to_string(),
            error: None,
            partition: None,
            account: None,
            module: "rust".to_string(),
            setup_script: PathBuf::from("scripts/setup_env.sh"),
            runner_args: vec!["--stage".into(), "both".into()],
        }
    }
}

impl JobConfig {
    /// Build the template from command-line overrides
    pub fn from_args(args: &JobArgs) -> Result<Self> {
        let memory = parse_size(&args.mem).map_err(PipelineError::config)?;
        let time_limit = parse_time_limit(&args.time).map_err(PipelineError::config)?;
        if args.cpus == 0 {
            return Err(PipelineError::config("--cpus must be at least 1"));
        }
        if args.nodes == Some(0) || args.ntasks_per_node == Some(0) {
            return Err(PipelineError::config("--nodes and --ntasks-per-node must be at least 1"));
        }

        Ok(Self {
            name: args.job_name.clone(),
            nodes: args.nodes,
            ntasks_per_node: args.ntasks_per_node,
            cpus_per_task: args.cpus,
            memory,
            time_limit,
            output: args.log_path.clone(),
            partition: args.partition.clone(),
            account: args.account.clone(),
            module: args.module.clone(),
            setup_script: args.setup_script.clone(),
            runner_args: vec!["--stage".into(), args.stage.as_arg().into()],
            ..Self::default()
        })
    }

    /// Directory the scheduler writes the job log into
    pub fn log_dir(&self) -> Option<PathBuf> {
        PathBuf::from(&self.output)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }
}

/// Job state as reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobStatus {
    /// Map a Slurm state name (`RUNNING`, `CANCELLED by 42`, ...)
    pub fn from_slurm(state: &str) -> Self {
        let state = state.split_whitespace().next().unwrap_or("").to_uppercase();
        match state.trim_end_matches('+') {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "SUSPENDED" => JobStatus::Pending,
            "RUNNING" | "COMPLETING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" => JobStatus::Failed,
            "CANCELLED" | "PREEMPTED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Slurm command-line interface
#[derive(Debug, Default)]
pub struct JobScheduler;

impl JobScheduler {
    /// Create a new job scheduler interface
    pub fn new() -> Self {
        Self
    }

    /// Is `sbatch` on the PATH?
    pub fn available() -> bool {
        which("sbatch").is_some()
    }

    /// Render the batch script for `config`
    pub fn generate_slurm_script(&self, config: &JobConfig) -> String {
        let mut script = String::from("#!/bin/bash\n");

        script.push_str(&format!("#SBATCH --job-name={}\n", config.name));
        if let Some(nodes) = config.nodes {
            script.push_str(&format!("#SBATCH --nodes={}\n", nodes));
        }
        if let Some(tasks) = config.ntasks_per_node {
            script.push_str(&format!("#SBATCH --ntasks-per-node={}\n", tasks));
        }
        script.push_str(&format!("#SBATCH --cpus-per-task={}\n", config.cpus_per_task));
        script.push_str(&format!("#SBATCH --mem={}\n", format_slurm_memory(config.memory)));
        script.push_str(&format!("#SBATCH --time={}\n", format_slurm_time(config.time_limit)));
        script.push_str(&format!("#SBATCH --output={}\n", config.output));

        if let Some(ref error) = config.error {
            script.push_str(&format!("#SBATCH --error={}\n", error));
        }
        if let Some(ref partition) = config.partition {
            script.push_str(&format!("#SBATCH --partition={}\n", partition));
        }
        if let Some(ref account) = config.account {
            script.push_str(&format!("#SBATCH --account={}\n", account));
        }

        script.push_str("\n# Environment\n");
        script.push_str(&format!("module load {} || true\n", config.module));
        script.push_str(&format!("source {}\n", config.setup_script.display()));

        script.push_str("\n# Run pipeline\n");
        script.push_str(&format!("{} {}\n", RUNNER_BIN, config.runner_args.join(" ")));

        script
    }

    /// Submit the job and return its ID
    pub fn submit(&self, config: &JobConfig) -> Result<String> {
        let script = self.generate_slurm_script(config);

        // Slurm does not create the output directory
        if let Some(dir) = config.log_dir() {
            std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }

        let mut child = Command::new("sbatch")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::SchedulerError(format!("cannot run sbatch: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| PipelineError::SchedulerError(format!("writing job script: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PipelineError::SchedulerError(e.to_string()))?;

        if !output.status.success() {
            return Err(PipelineError::SchedulerError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_submitted_id(&stdout).ok_or_else(|| {
            PipelineError::SchedulerError(format!("unexpected sbatch output: {}", stdout.trim()))
        })
    }

    /// Cancel a job
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let output = Command::new("scancel")
            .arg(job_id)
            .output()
            .map_err(|e| PipelineError::SchedulerError(format!("cannot run scancel: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PipelineError::SchedulerError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Get job status, falling back to accounting once the job left the queue
    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        let queued = Command::new("squeue")
            .args(["-j", job_id, "-h", "-o", "%T"])
            .output()
            .map_err(|e| PipelineError::SchedulerError(format!("cannot run squeue: {}", e)))?;

        if queued.status.success() {
            let state = String::from_utf8_lossy(&queued.stdout);
            if !state.trim().is_empty() {
                return Ok(JobStatus::from_slurm(state.trim()));
            }
        }

        let output = Command::new("sacct")
            .args(["-j", job_id, "-n", "-X", "-o", "State"])
            .output()
            .map_err(|e| PipelineError::SchedulerError(format!("cannot run sacct: {}", e)))?;

        if !output.status.success() {
            return Ok(JobStatus::Unknown);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(JobStatus::from_slurm)
            .unwrap_or(JobStatus::Unknown))
    }
}

// Helper functions

fn which(cmd: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(cmd);
            if full_path.is_file() {
                Some(full_path)
            } else {
                None
            }
        })
    })
}

/// Parse "Submitted batch job 12345"
fn parse_submitted_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Slurm memory values default to megabytes
fn parse_memory(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num_str, mult) = if let Some(n) = s.strip_suffix('T') {
        (n, 1024 * 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else {
        (s.as_str(), 1024 * 1024u64)
    };

    num_str.parse::<u64>().ok().map(|n| n * mult)
}

fn format_slurm_memory(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;

    if bytes >= GB && bytes % GB == 0 {
        format!("{}G", bytes / GB)
    } else {
        format!("{}M", bytes.div_ceil(MB).max(1))
    }
}

fn format_slurm_time(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Split on commas that are not inside brackets
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

/// Expand `node[01-03,07],gpu1` into individual host names
fn expand_node_list(nodelist: &str) -> Vec<String> {
    let mut nodes = Vec::new();

    for item in split_top_level(nodelist) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let (Some(open), Some(close)) = (item.find('['), item.rfind(']')) else {
            nodes.push(item.to_string());
            continue;
        };
        let prefix = &item[..open];
        let suffix = &item[close + 1..];

        for range in item[open + 1..close].split(',') {
            match range.split_once('-') {
                Some((start, end)) => {
                    if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                        let width = start.len();
                        for i in s..=e {
                            nodes.push(format!("{}{:0width$}{}", prefix, i, suffix, width = width));
                        }
                    }
                }
                None => nodes.push(format!("{}{}{}", prefix, range, suffix)),
            }
        }
    }

    nodes
}
