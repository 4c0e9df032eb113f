//! Unzip stage: decompress downloaded shards into JSONL

use crate::config::ResolvedUnzip;
use crate::error::{PipelineError, Result};
use crate::fs::{list_shards, plan_shard, Decompressor, InputFile, ShardPlan, SkipReason};
use crate::progress::ProgressReporter;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result for one shard
#[derive(Debug, Clone, PartialEq)]
pub enum ShardOutcome {
    /// Written to `dest`
    Decompressed { dest: PathBuf, bytes: u64 },
    /// Left alone
    Skipped(SkipReason),
    /// Decompression failed
    Failed(String),
}

/// Unzip stage result
#[derive(Debug, Clone, Default)]
pub struct UnzipSummary {
    /// Shards found in the input directory
    pub shards: usize,
    /// Shards decompressed
    pub decompressed: u64,
    /// Shards skipped
    pub skipped: u64,
    /// (shard, error) for shards that failed
    pub failures: Vec<(PathBuf, String)>,
    /// Compressed bytes read
    pub bytes_in: u64,
    /// Decompressed bytes written
    pub bytes_out: u64,
    /// Total duration
    pub duration: Duration,
}

impl UnzipSummary {
    /// Were all shards decompressed or skipped?
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Unzip Summary ===");
        println!("Shards:          {}", self.shards);
        println!("Decompressed:    {}", self.decompressed);
        println!("Skipped:         {}", self.skipped);
        println!(
            "Bytes:           {} -> {}",
            humansize::format_size(self.bytes_in, humansize::BINARY),
            humansize::format_size(self.bytes_out, humansize::BINARY)
        );
        println!("Duration:        {:.2?}", self.duration);

        if !self.failures.is_empty() {
            println!("\nFailures: {}", self.failures.len());
            for (path, error) in &self.failures {
                println!("  {} - {}", path.display(), error);
            }
        }
    }
}

/// Parallel shard decompression stage
pub struct UnzipStage {
    settings: ResolvedUnzip,
    workers: usize,
    decompressor: Decompressor,
    progress: ProgressReporter,
}

impl UnzipStage {
    /// Create the stage using `workers` threads
    pub fn new(settings: ResolvedUnzip, workers: usize) -> Self {
        Self {
            settings,
            workers: workers.max(1),
            decompressor: Decompressor::new(),
            progress: ProgressReporter::disabled(),
        }
    }

    /// Attach a progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Run the stage.
    ///
    /// A missing input directory or one without shards is logged and
    /// yields an empty summary.
    pub fn execute(&self) -> Result<UnzipSummary> {
        let start = Instant::now();
        let s = &self.settings;

        let shards = match list_shards(&s.input_dir) {
            Ok(shards) if !shards.is_empty() => shards,
            Ok(_) => {
                error!("No .zst or .gz files found in {}", s.input_dir.display());
                return Ok(UnzipSummary::default());
            }
            Err(PipelineError::NotFound(p)) => {
                error!("Input directory not found: {}", p.display());
                return Ok(UnzipSummary::default());
            }
            Err(e) => return Err(e),
        };

        std::fs::create_dir_all(&s.output_dir)
            .map_err(|e| PipelineError::io(&s.output_dir, e))?;

        info!(
            "Found {} compressed files. Using {} workers.",
            shards.len(),
            self.workers
        );
        self.progress.set_total_items(shards.len() as u64);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("unzip-{}", i))
            .build()
            .map_err(|e| PipelineError::ThreadPoolError(e.to_string()))?;

        let outcomes: Vec<(&InputFile, ShardOutcome)> = pool.install(|| {
            shards
                .par_iter()
                .map(|shard| {
                    let outcome = self.unzip_one(shard);
                    self.progress.increment_items(1);
                    (shard, outcome)
                })
                .collect()
        });

        let mut summary = UnzipSummary {
            shards: shards.len(),
            ..Default::default()
        };
        for (shard, outcome) in outcomes {
            match outcome {
                ShardOutcome::Decompressed { bytes, .. } => {
                    summary.decompressed += 1;
                    summary.bytes_in += shard.size;
                    summary.bytes_out += bytes;
                }
                ShardOutcome::Skipped(_) => summary.skipped += 1,
                ShardOutcome::Failed(error) => summary.failures.push((shard.path.clone(), error)),
            }
        }
        summary.duration = start.elapsed();

        self.progress.finish("unzip complete");
        info!("All files processed.");

        Ok(summary)
    }

    /// Decompress one shard according to its plan
    pub fn unzip_one(&self, shard: &InputFile) -> ShardOutcome {
        let name = shard
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (codec, dest) = match plan_shard(&shard.path, &self.settings.output_dir) {
            ShardPlan::Decompress { codec, dest } => (codec, dest),
            ShardPlan::Skip(reason) => {
                match &reason {
                    SkipReason::DestinationExists(dest) => {
                        info!("Skipping {}: {} already exists", name, dest.display())
                    }
                    SkipReason::AlreadyDecompressed => {
                        info!("Skipping {}: already decompressed", name)
                    }
                    SkipReason::UnknownExtension => debug!("Skipping {}: unknown extension", name),
                }
                return ShardOutcome::Skipped(reason);
            }
        };

        info!("Decompressing {}", name);
        self.progress.set_status(&name);

        match self.decompressor.decompress_file(codec, &shard.path, &dest) {
            Ok(stats) => {
                self.progress.increment_bytes(stats.decompressed_size);
                info!(
                    "Finished: {} -> {} ({:.1}x, {}/s)",
                    name,
                    dest.display(),
                    stats.ratio,
                    humansize::format_size(stats.speed as u64, humansize::BINARY)
                );

                if self.settings.delete_compressed {
                    match std::fs::remove_file(&shard.path) {
                        Ok(()) => info!("Deleted compressed file: {}", name),
                        Err(e) => warn!("Could not delete {}: {}", shard.path.display(), e),
                    }
                }

                ShardOutcome::Decompressed {
                    dest,
                    bytes: stats.decompressed_size,
                }
            }
            Err(e) => {
                error!("Failed to decompress {}: {}", name, e);
                ShardOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    const DOCS: &[u8] = b"{\"id\":\"1\",\"text\":\"a\"}\n{\"id\":\"2\",\"text\":\"b\"}\n";

    fn settings(dir: &TempDir, delete_compressed: bool) -> ResolvedUnzip {
        ResolvedUnzip {
            input_dir: dir.path().join("raw"),
            output_dir: dir.path().join("jsonl"),
            logs_dir: dir.path().join("logs"),
            workers: Some(2),
            delete_compressed,
        }
    }

    fn write_shards(raw: &Path) {
        std::fs::create_dir_all(raw).unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(DOCS).unwrap();
        std::fs::write(raw.join("cc-0000.json.gz"), enc.finish().unwrap()).unwrap();
        std::fs::write(raw.join("c4-0001.jsonl.zst"), zstd::encode_all(DOCS, 3).unwrap()).unwrap();
        std::fs::write(raw.join("broken.json.gz"), b"garbage").unwrap();
        std::fs::write(raw.join("README.md"), b"ignored").unwrap();
    }

    #[test]
    fn test_unzip_stage_gz_and_zst() {
        let dir = TempDir::new().unwrap();
        write_shards(&dir.path().join("raw"));

        let summary = UnzipStage::new(settings(&dir, false), 2).execute().unwrap();
        assert_eq!(summary.shards, 3);
        assert_eq!(summary.decompressed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].0.ends_with("broken.json.gz"));

        let out = dir.path().join("jsonl");
        assert_eq!(std::fs::read(out.join("cc-0000.json.jsonl")).unwrap(), DOCS);
        assert_eq!(std::fs::read(out.join("c4-0001.json.jsonl")).unwrap(), DOCS);
        assert!(!out.join("broken.json.jsonl").exists());
        assert!(dir.path().join("raw/cc-0000.json.gz").exists());

        // Second run skips everything already written
        let again = UnzipStage::new(settings(&dir, false), 1).execute().unwrap();
        assert_eq!(again.decompressed, 0);
        assert_eq!(again.skipped, 2);
    }

    #[test]
    fn test_delete_compressed() {
        let dir = TempDir::new().unwrap();
        write_shards(&dir.path().join("raw"));

        UnzipStage::new(settings(&dir, true), 2).execute().unwrap();
        assert!(!dir.path().join("raw/cc-0000.json.gz").exists());
        assert!(!dir.path().join("raw/c4-0001.jsonl.zst").exists());
        // Failed shards are kept
        assert!(dir.path().join("raw/broken.json.gz").exists());
    }

    #[test]
    fn test_missing_input_dir_is_empty_summary() {
        let dir = TempDir::new().unwrap();
        let summary = UnzipStage::new(settings(&dir, false), 1).execute().unwrap();
        assert_eq!(summary.shards, 0);
        assert!(!dir.path().join("jsonl").exists());
    }
}
