//! Parse stage: merge blog posts from JSONL shards into one CSV

use super::blog::{extract_record, Rejection, CSV_HEADER};
use crate::config::ResolvedParse;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::fs::{find_jsonl, InputFile};
use crate::progress::ProgressReporter;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counts for one JSONL file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    /// Lines read
    pub lines: u64,
    /// Rows written
    pub kept: u64,
    /// Lines that were not valid JSON or UTF-8
    pub malformed: u64,
}

impl std::ops::AddAssign for FileCounts {
    fn add_assign(&mut self, other: Self) {
        self.lines += other.lines;
        self.kept += other.kept;
        self.malformed += other.malformed;
    }
}

/// Parse stage result
#[derive(Debug, Clone, Default)]
pub struct ParseSummary {
    /// JSONL files read
    pub files: usize,
    /// Totals across all files
    pub counts: FileCounts,
    /// CSV written (None when there was no input)
    pub output: Option<std::path::PathBuf>,
    /// Total duration
    pub duration: Duration,
}

impl ParseSummary {
    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Parse Summary ===");
        println!("Files:           {}", self.files);
        println!("Lines:           {}", self.counts.lines);
        println!("Blogs kept:      {}", self.counts.kept);
        println!("Malformed lines: {}", self.counts.malformed);
        if let Some(out) = &self.output {
            println!("Output CSV:      {}", out.display());
        }
        println!("Duration:        {:.2?}", self.duration);
    }
}

/// Stream one JSONL file into the CSV writer
pub fn parse_jsonl_into<W: Write>(
    input: &Path,
    writer: &mut csv::Writer<W>,
    min_text_length: usize,
) -> Result<FileCounts> {
    let file = File::open(input).with_path(input)?;
    let mut reader = BufReader::new(file);
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut counts = FileCounts::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).with_path(input)?;
        if n == 0 {
            break;
        }
        counts.lines += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("{}: failed line {}: {}", name, counts.lines, e);
                counts.malformed += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let doc: serde_json::Value = match serde_json::from_str(line) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("{}: failed line {}: {}", name, counts.lines, e);
                counts.malformed += 1;
                continue;
            }
        };

        match extract_record(&doc, min_text_length) {
            Ok(record) => {
                writer.serialize(&record)?;
                counts.kept += 1;
            }
            Err(Rejection::NotAnObject) => {
                warn!("{}: failed line {}: not a JSON object", name, counts.lines);
                counts.malformed += 1;
            }
            Err(Rejection::MissingField | Rejection::TooShort | Rejection::NotBlog) => {}
        }
    }

    info!(
        "{}: processed {} lines, kept {} blogs.",
        name, counts.lines, counts.kept
    );
    Ok(counts)
}

/// Open the CSV writer and emit the header row
pub fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    let file = File::create(path).with_path(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(file);
    writer.write_record(CSV_HEADER)?;
    Ok(writer)
}

/// Blog extraction stage
pub struct ParseStage {
    settings: ResolvedParse,
    progress: ProgressReporter,
}

impl ParseStage {
    /// Create the stage from resolved settings
    pub fn new(settings: ResolvedParse) -> Self {
        Self {
            settings,
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
    /// Missing input or an empty directory is logged and yields a summary
    /// without output.
    pub fn execute(&self) -> Result<ParseSummary> {
        let start = Instant::now();
        let s = &self.settings;

        let files: Vec<InputFile> = match find_jsonl(&s.input) {
            Ok(files) if !files.is_empty() => files,
            Ok(_) => {
                error!("No JSONL files found in {}", s.input.display());
                return Ok(ParseSummary::default());
            }
            Err(PipelineError::NotFound(p)) => {
                error!("Input path not found: {}", p.display());
                return Ok(ParseSummary::default());
            }
            Err(e) => return Err(e),
        };

        if let Some(parent) = s.output_csv.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        info!("Found {} JSONL files to parse.", files.len());
        self.progress.set_total_items(files.len() as u64);

        let mut writer = csv_writer(&s.output_csv)?;
        let mut totals = FileCounts::default();

        for input in &files {
            self.progress.set_status(&input.path.display().to_string());
            debug!("parsing {}", input.path.display());
            totals += parse_jsonl_into(&input.path, &mut writer, s.min_text_length)?;
            self.progress.increment_bytes(input.size);
            self.progress.increment_items(1);
        }

        writer.flush().with_path(&s.output_csv)?;
        self.progress.finish("parse complete");

        info!("Blog parsing complete.");
        info!("Total lines: {}, kept blogs: {}", totals.lines, totals.kept);
        info!("Output CSV: {}", s.output_csv.display());

        Ok(ParseSummary {
            files: files.len(),
            counts: totals,
            output: Some(s.output_csv.clone()),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(dir: &TempDir, input: &Path, min: usize) -> ResolvedParse {
        ResolvedParse {
            input: input.to_path_buf(),
            output_csv: dir.path().join("out/blogs.csv"),
            logs_dir: dir.path().join("logs"),
            min_text_length: min,
        }
    }

    const SHARD: &str = concat!(
        r#"{"id":"a","text":"A real post,\nwith \"quotes\"","source":"cc","metadata":{"url":"https://blog.example.com/p"}}"#,
        "\n",
        r#"{"id":"b","text":"news item","metadata":{"url":"https://news.example.com/x"}}"#,
        "\n",
        "{not json\n",
        "\n",
        "[1,2]\n",
        r#"{"id":"c","text":"tiny","metadata":{"url":"https://x.substack.com/p/1"}}"#,
        "\n",
    );

    #[test]
    fn test_parse_stage_writes_csv() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("shards");
        std::fs::create_dir_all(input.join("nested")).unwrap();
        std::fs::write(input.join("nested/0000.json.jsonl"), SHARD).unwrap();

        let summary = ParseStage::new(settings(&dir, &input, 5)).execute().unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.counts.lines, 6);
        assert_eq!(summary.counts.kept, 1);
        assert_eq!(summary.counts.malformed, 2);

        let csv = std::fs::read_to_string(dir.path().join("out/blogs.csv")).unwrap();
        assert_eq!(
            csv,
            "id,url,created,added,source,text\r\n\
             a,https://blog.example.com/p,,,cc,\"A real post, with \"\"quotes\"\"\"\r\n"
        );
    }

    #[test]
    fn test_parse_stage_header_only_when_nothing_kept() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("one.jsonl");
        std::fs::write(&input, SHARD).unwrap();

        let summary = ParseStage::new(settings(&dir, &input, 10_000)).execute().unwrap();
        assert_eq!(summary.counts.kept, 0);

        let csv = std::fs::read_to_string(dir.path().join("out/blogs.csv")).unwrap();
        assert_eq!(csv, "id,url,created,added,source,text\r\n");
    }

    #[test]
    fn test_parse_stage_missing_input() {
        let dir = TempDir::new().unwrap();
        let summary = ParseStage::new(settings(&dir, &dir.path().join("absent"), 0))
            .execute()
            .unwrap();
        assert!(summary.output.is_none());
        assert!(!dir.path().join("out/blogs.csv").exists());
    }
}
