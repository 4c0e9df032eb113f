//! dolma-runner CLI - Dolma corpus preparation pipeline
//!
//! Runs the download, unzip and parse stages, and manages the Slurm job
//! that wraps them.

use clap::Parser;
use dolma_runner::config::{parse_vars, stage_vars, stamp, CliArgs, Commands, JobArgs, LoggingConfig};
use dolma_runner::error::Result;
use dolma_runner::logging;
use dolma_runner::pipeline::{run_download, run_parse, run_unzip, PipelineRunner, StageConfigs, StageContext};
use dolma_runner::system::{JobConfig, JobInfo, JobScheduler};
use std::path::Path;
use tracing::{info, warn};

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    // Initialize logging
    let logging_cfg = LoggingConfig::load_or_default(&args.logging)?;
    let job_log = logging::init(&logging_cfg, args.verbose)?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let job = JobInfo::collect();
    match &job.job_id {
        Some(id) => info!(
            "dolma-runner {} on {} (Slurm job {}, {} CPUs)",
            dolma_runner::VERSION,
            host,
            id,
            job.total_cpus().map(|n| n.to_string()).unwrap_or_else(|| "?".into())
        ),
        None => info!("dolma-runner {} on {}", dolma_runner::VERSION, host),
    }

    let ctx = StageContext {
        job_log,
        show_progress: !args.quiet,
    };

    handle_command(&args, &ctx)
}

fn handle_command(args: &CliArgs, ctx: &StageContext) -> Result<()> {
    match args.resolved_command() {
        Commands::Run {
            stage,
            download_cfg,
            unzip_cfg,
            parse_cfg,
        } => {
            let configs = StageConfigs {
                download: download_cfg,
                unzip: unzip_cfg,
                parse: parse_cfg,
            };
            let report = PipelineRunner::new(configs, ctx.clone()).run(stage)?;
            if !args.quiet {
                report.print_summary();
            }
            Ok(())
        }
        Commands::Download { config, vars } => cmd_download(&config, &vars, ctx, args.quiet),
        Commands::Unzip { config, vars } => cmd_unzip(&config, &vars, ctx, args.quiet),
        Commands::Parse { config, vars } => cmd_parse(&config, &vars, ctx, args.quiet),
        Commands::JobScript { job, output } => cmd_job_script(&job, output.as_deref()),
        Commands::Submit { job } => cmd_submit(&job),
        Commands::JobStatus { job_id } => cmd_job_status(&job_id),
        Commands::JobCancel { job_id } => cmd_job_cancel(&job_id),
        Commands::JobInfo => cmd_job_info(),
    }
}

fn cmd_download(config: &Path, vars: &[String], ctx: &StageContext, quiet: bool) -> Result<()> {
    let vars = stage_vars(&stamp(), &parse_vars(vars)?);
    let summary = run_download(config, &vars, ctx)?;
    if !quiet {
        summary.print_summary();
    }
    if !summary.is_success() {
        warn!("{} downloads failed", summary.failures.len());
    }
    Ok(())
}

fn cmd_unzip(config: &Path, vars: &[String], ctx: &StageContext, quiet: bool) -> Result<()> {
    let vars = stage_vars(&stamp(), &parse_vars(vars)?);
    let summary = run_unzip(config, &vars, ctx)?;
    if !quiet {
        summary.print_summary();
    }
    if !summary.is_success() {
        warn!("{} shards failed to decompress", summary.failures.len());
    }
    Ok(())
}

fn cmd_parse(config: &Path, vars: &[String], ctx: &StageContext, quiet: bool) -> Result<()> {
    let vars = stage_vars(&stamp(), &parse_vars(vars)?);
    let summary = run_parse(config, &vars, ctx)?;
    if !quiet {
        summary.print_summary();
    }
    Ok(())
}

fn cmd_job_script(job: &JobArgs, output: Option<&Path>) -> Result<()> {
    let config = JobConfig::from_args(job)?;
    let script = JobScheduler::new().generate_slurm_script(&config);

    match output {
        Some(path) => {
            std::fs::write(path, script)
                .map_err(|e| dolma_runner::PipelineError::io(path, e))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", script),
    }
    Ok(())
}

fn cmd_submit(job: &JobArgs) -> Result<()> {
    let config = JobConfig::from_args(job)?;
    if !JobScheduler::available() {
        return Err(dolma_runner::PipelineError::SchedulerError(
            "sbatch not found in PATH".to_string(),
        ));
    }

    let job_id = JobScheduler::new().submit(&config)?;
    info!("submitted job {} ({})", job_id, config.name);
    println!("Submitted batch job {}", job_id);
    Ok(())
}

fn cmd_job_status(job_id: &str) -> Result<()> {
    let status = JobScheduler::new().status(job_id)?;
    println!("Job {}: {}", job_id, status);
    Ok(())
}

fn cmd_job_cancel(job_id: &str) -> Result<()> {
    JobScheduler::new().cancel(job_id)?;
    println!("Cancelled job {}", job_id);
    Ok(())
}

fn cmd_job_info() -> Result<()> {
    let info = JobInfo::collect();

    println!("=== Batch Allocation ===");
    let Some(job_id) = &info.job_id else {
        println!("Not running inside a Slurm job.");
        println!("CPUs (local):    {}", num_cpus::get());
        return Ok(());
    };

    println!("Job ID:          {}", job_id);
    if let Some(name) = &info.job_name {
        println!("Job name:        {}", name);
    }
    if let Some(cpus) = info.total_cpus() {
        println!("CPUs:            {}", cpus);
    }
    if let Some(mem) = info.memory {
        println!("Memory:          {}", humansize::format_size(mem, humansize::BINARY));
    }
    if let Some(limit) = info.time_limit {
        println!(
            "Time limit:      {}",
            humantime::format_duration(std::time::Duration::from_secs(limit))
        );
    }
    if !info.node_list.is_empty() {
        println!("Nodes:           {}", info.node_list.join(", "));
    }
    if let Some(dir) = &info.work_dir {
        println!("Submit dir:      {}", dir.display());
    }
    Ok(())
}
