//! Per-stage YAML configuration files
//!
//! Each pipeline stage reads its own YAML file. Path fields are templates
//! resolved with [`fill_vars`] against the run stamp and `--vars`
//! overrides before use.

use super::template::{fill_vars, sanitize_path, Vars};
use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the download stage config
pub const DEFAULT_DOWNLOAD_CONFIG: &str = "configs/download_config.yaml";
/// Default location of the unzip stage config
pub const DEFAULT_UNZIP_CONFIG: &str = "configs/unzip_config.yaml";
/// Default location of the parse stage config
pub const DEFAULT_PARSE_CONFIG: &str = "configs/parse_config.yaml";
/// Default location of the logging config
pub const DEFAULT_LOGGING_CONFIG: &str = "configs/logging_config.yaml";

/// Read and deserialize a YAML file
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::NotFound(path.to_path_buf())
        } else {
            PipelineError::io(path, e)
        }
    })?;

    serde_yaml::from_str(&text).map_err(|e| PipelineError::InvalidConfig {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn resolve(template: &str, vars: &Vars) -> PathBuf {
    PathBuf::from(sanitize_path(&fill_vars(template, vars)))
}

fn default_workers() -> Option<usize> {
    None
}

fn default_retry_limit() -> usize {
    5
}

fn default_chunk_mb() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

/// `download_config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    /// Text file with one URL per line, or a comma-separated URL list
    pub urls_file: String,
    /// Output directory template
    pub output_dir: String,
    /// Log directory template
    pub logs_dir: String,
    /// Parallel downloads (unset = allocation CPUs)
    #[serde(default = "default_workers")]
    pub workers: Option<usize>,
    /// Attempts per URL
    #[serde(default = "default_retry_limit")]
    pub retry_limit: usize,
    /// Streaming chunk size in MiB
    #[serde(default = "default_chunk_mb")]
    pub chunk_mb: usize,
    /// Connect and per-read timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Download settings with all templates resolved
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub urls: String,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub workers: Option<usize>,
    pub retry_limit: usize,
    pub chunk_bytes: usize,
    pub timeout_secs: u64,
}

impl DownloadConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self = load_yaml(path)?;
        if cfg.retry_limit == 0 {
            return Err(PipelineError::config("retry_limit must be at least 1"));
        }
        if cfg.chunk_mb == 0 {
            return Err(PipelineError::config("chunk_mb must be at least 1"));
        }
        Ok(cfg)
    }

    /// Resolve path templates against `vars`
    pub fn resolve(&self, vars: &Vars) -> ResolvedDownload {
        ResolvedDownload {
            urls: fill_vars(&self.urls_file, vars),
            output_dir: resolve(&self.output_dir, vars),
            logs_dir: resolve(&self.logs_dir, vars),
            workers: self.workers,
            retry_limit: self.retry_limit,
            chunk_bytes: self.chunk_mb * 1024 * 1024,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// `unzip_config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnzipConfig {
    /// Directory holding compressed shards
    pub input_dir: String,
    /// Directory for decompressed JSONL
    pub output_dir: String,
    /// Log directory template
    pub logs_dir: String,
    /// Parallel decompressions (unset = allocation CPUs)
    #[serde(default = "default_workers")]
    pub workers: Option<usize>,
    /// Remove each shard after it was decompressed
    #[serde(default)]
    pub delete_compressed: bool,
}

/// Unzip settings with all templates resolved
#[derive(Debug, Clone)]
pub struct ResolvedUnzip {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub workers: Option<usize>,
    pub delete_compressed: bool,
}

impl UnzipConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        load_yaml(path)
    }

    /// Resolve path templates against `vars`
    pub fn resolve(&self, vars: &Vars) -> ResolvedUnzip {
        ResolvedUnzip {
            input_dir: resolve(&self.input_dir, vars),
            output_dir: resolve(&self.output_dir, vars),
            logs_dir: resolve(&self.logs_dir, vars),
            workers: self.workers,
            delete_compressed: self.delete_compressed,
        }
    }
}

/// `parse_config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParseConfig {
    /// A JSONL file, or a directory searched recursively for `*.jsonl`
    pub input_jsonl: String,
    /// Merged CSV output
    pub output_csv: String,
    /// Log directory template
    pub logs_dir: String,
    /// Documents with fewer characters are dropped
    #[serde(default)]
    pub min_text_length: usize,
    /// Output encoding (only UTF-8 is supported)
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

/// Parse settings with all templates resolved
#[derive(Debug, Clone)]
pub struct ResolvedParse {
    pub input: PathBuf,
    pub output_csv: PathBuf,
    pub logs_dir: PathBuf,
    pub min_text_length: usize,
}

impl ParseConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self = load_yaml(path)?;
        let enc = cfg.encoding.to_ascii_lowercase().replace('_', "-");
        if enc != "utf-8" && enc != "utf8" {
            return Err(PipelineError::config(format!(
                "Unsupported output encoding '{}', only utf-8 is supported",
                cfg.encoding
            )));
        }
        Ok(cfg)
    }

    /// Resolve path templates against `vars`
    pub fn resolve(&self, vars: &Vars) -> ResolvedParse {
        ResolvedParse {
            input: resolve(&self.input_jsonl, vars),
            output_csv: resolve(&self.output_csv, vars),
            logs_dir: resolve(&self.logs_dir, vars),
            min_text_length: self.min_text_length,
        }
    }
}

/// `logging_config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `dolma_runner=debug,reqwest=warn`
    #[serde(default = "default_level")]
    pub level: String,
    /// Log to stderr
    #[serde(default = "default_true")]
    pub console: bool,
    /// Emit JSON lines instead of text on stderr
    #[serde(default)]
    pub json: bool,
    /// Master log file shared by every run
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            console: true,
            json: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Load from a YAML file, falling back to defaults when it is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match load_yaml(path) {
            Ok(cfg) => Ok(cfg),
            Err(PipelineError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_download_config_defaults_and_resolve() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "download.yaml",
            "urls_file: configs/urls.txt\n\
             output_dir: data/raw/{timestamp}_download\n\
             logs_dir: logs/{timestamp}_download\n",
        );

        let cfg = DownloadConfig::load(&path).unwrap();
        assert_eq!(cfg.retry_limit, 5);
        assert_eq!(cfg.chunk_mb, 1);
        assert_eq!(cfg.workers, None);

        let mut vars = Vars::new();
        vars.insert("timestamp".into(), "20251007_120654".into());
        let resolved = cfg.resolve(&vars);
        assert_eq!(resolved.output_dir, PathBuf::from("data/raw/20251007_120654_download"));
        assert_eq!(resolved.chunk_bytes, 1024 * 1024);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "unzip.yaml",
            "input_dir: a\noutput_dir: b\nlogs_dir: c\nworkerz: 3\n",
        );
        match UnzipConfig::load(&path) {
            Err(PipelineError::InvalidConfig { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_is_not_found() {
        let err = UnzipConfig::load(Path::new("/nonexistent/unzip.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_parse_config_encoding() {
        let dir = TempDir::new().unwrap();
        let ok = write(
            &dir,
            "ok.yaml",
            "input_jsonl: in\noutput_csv: out.csv\nlogs_dir: logs\nencoding: UTF8\n",
        );
        assert!(ParseConfig::load(&ok).is_ok());

        let bad = write(
            &dir,
            "bad.yaml",
            "input_jsonl: in\noutput_csv: out.csv\nlogs_dir: logs\nencoding: latin-1\n",
        );
        assert!(matches!(
            ParseConfig::load(&bad),
            Err(PipelineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_logging_config_fallback() {
        let cfg = LoggingConfig::load_or_default(Path::new("/nonexistent/logging.yaml")).unwrap();
        assert_eq!(cfg.level, "info");
        assert!(cfg.console);
        assert!(cfg.file.is_none());
    }
}
