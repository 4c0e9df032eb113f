//! Shard decompression
//!
//! Dolma shards ship as gzip or zstd compressed JSONL. Both are
//! decompressed as streams; large zstd windows (up to 2 GiB) are
//! allowed because some shards are produced with `--long`.

use crate::error::{IoResultExt, PipelineError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Default I/O buffer size (1 MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest zstd window accepted, as a power of two
pub const ZSTD_WINDOW_LOG_MAX: u32 = 31;

/// Compression format of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// `.gz`
    Gzip,
    /// `.zst`
    Zstd,
}

impl Codec {
    /// Detect codec from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Some(Self::Gzip),
            Some("zst") => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Wrap a reader in the matching decoder
    pub fn decoder<'a, R: Read + 'a>(&self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        match self {
            Self::Gzip => Ok(Box::new(MultiGzDecoder::new(reader))),
            Self::Zstd => {
                let mut decoder = zstd::stream::read::Decoder::new(reader)?;
                decoder.window_log_max(ZSTD_WINDOW_LOG_MAX)?;
                Ok(Box::new(decoder))
            }
        }
    }
}

/// Why a shard was not decompressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not `.gz` or `.zst`
    UnknownExtension,
    /// Name already ends in `.json.jsonl`
    AlreadyDecompressed,
    /// Destination file exists
    DestinationExists(PathBuf),
}

/// What to do with one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardPlan {
    /// Leave it alone
    Skip(SkipReason),
    /// Decompress into `dest`
    Decompress { codec: Codec, dest: PathBuf },
}

/// Decompressed file name for a shard name.
///
/// `*.jsonl.zst`, `*.jsonl.gz`, `*.json.zst` and `*.json.gz` all map to
/// `*.json.jsonl`; anything else keeps its stem and gains `.jsonl`.
pub fn output_name(file_name: &str) -> String {
    const MAPPED: [&str; 4] = [".jsonl.zst", ".jsonl.gz", ".json.zst", ".json.gz"];

    for suffix in MAPPED {
        if let Some(base) = file_name.strip_suffix(suffix) {
            return format!("{}.json.jsonl", base);
        }
    }

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    format!("{}.jsonl", stem)
}

/// Decide how `source` should be handled when writing into `out_dir`
pub fn plan_shard(source: &Path, out_dir: &Path) -> ShardPlan {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name.ends_with(".json.jsonl") {
        return ShardPlan::Skip(SkipReason::AlreadyDecompressed);
    }

    let Some(codec) = Codec::from_path(source) else {
        return ShardPlan::Skip(SkipReason::UnknownExtension);
    };

    let dest = out_dir.join(output_name(&name));
    if dest.exists() {
        return ShardPlan::Skip(SkipReason::DestinationExists(dest));
    }

    ShardPlan::Decompress { codec, dest }
}

/// Decompression statistics
#[derive(Debug, Clone, Default)]
pub struct DecompressStats {
    /// Compressed size on disk
    pub compressed_size: u64,
    /// Decompressed size written
    pub decompressed_size: u64,
    /// Expansion ratio (decompressed / compressed)
    pub ratio: f64,
    /// Output speed in bytes/second
    pub speed: f64,
}

/// Streaming shard decompressor
#[derive(Debug, Clone)]
pub struct Decompressor {
    buffer_size: usize,
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor {
    /// Create a decompressor with the default buffer size
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Create with custom buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    /// Decompress `source` into `dest`.
    ///
    /// Output is staged in a hidden `.part` sibling and renamed into place,
    /// so `dest` only ever exists complete.
    pub fn decompress_file(&self, codec: Codec, source: &Path, dest: &Path) -> Result<DecompressStats> {
        let start = Instant::now();

        let src_file = File::open(source).with_path(source)?;
        let compressed_size = src_file.metadata().with_path(source)?.len();
        let reader = BufReader::with_capacity(self.buffer_size, src_file);
        let mut decoder = codec
            .decoder(reader)
            .map_err(|e| PipelineError::decompression(source, e.to_string()))?;

        let staging = staging_path(dest);
        let result = (|| -> Result<u64> {
            let dst_file = File::create(&staging).with_path(&staging)?;
            let mut writer = BufWriter::with_capacity(self.buffer_size, dst_file);
            let written = io::copy(&mut decoder, &mut writer)
                .map_err(|e| PipelineError::decompression(source, e.to_string()))?;
            writer.flush().with_path(&staging)?;
            std::fs::rename(&staging, dest).with_path(dest)?;
            Ok(written)
        })();

        let written = match result {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                return Err(e);
            }
        };

        let secs = start.elapsed().as_secs_f64();
        Ok(DecompressStats {
            compressed_size,
            decompressed_size: written,
            ratio: if compressed_size > 0 {
                written as f64 / compressed_size as f64
            } else {
                0.0
            },
            speed: if secs > 0.0 { written as f64 / secs } else { 0.0 },
        })
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.part", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    const SAMPLE: &[u8] = b"{\"id\":\"1\",\"text\":\"hello\"}\n{\"id\":\"2\",\"text\":\"world\"}\n";

    fn write_gz(path: &Path, data: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn test_output_name_mapping() {
        assert_eq!(output_name("cc_en_head-0000.json.gz"), "cc_en_head-0000.json.jsonl");
        assert_eq!(output_name("c4-0001.jsonl.zst"), "c4-0001.json.jsonl");
        assert_eq!(output_name("books-0002.jsonl.gz"), "books-0002.json.jsonl");
        assert_eq!(output_name("wiki-0003.json.zst"), "wiki-0003.json.jsonl");
        assert_eq!(output_name("plain.gz"), "plain.jsonl");
    }

    #[test]
    fn test_plan_shard() {
        let dir = TempDir::new().unwrap();
        let out = dir.path();

        assert_eq!(
            plan_shard(Path::new("/in/readme.txt"), out),
            ShardPlan::Skip(SkipReason::UnknownExtension)
        );
        assert_eq!(
            plan_shard(Path::new("/in/done.json.jsonl"), out),
            ShardPlan::Skip(SkipReason::AlreadyDecompressed)
        );

        match plan_shard(Path::new("/in/a.json.gz"), out) {
            ShardPlan::Decompress { codec, dest } => {
                assert_eq!(codec, Codec::Gzip);
                assert_eq!(dest, out.join("a.json.jsonl"));
            }
            other => panic!("unexpected plan {:?}", other),
        }

        std::fs::write(out.join("b.json.jsonl"), b"x").unwrap();
        assert_eq!(
            plan_shard(Path::new("/in/b.jsonl.zst"), out),
            ShardPlan::Skip(SkipReason::DestinationExists(out.join("b.json.jsonl")))
        );
    }

    #[test]
    fn test_gzip_multi_member() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("multi.json.gz");

        // Two concatenated gzip members
        let mut bytes = Vec::new();
        for part in [&SAMPLE[..27], &SAMPLE[27..]] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
            enc.write_all(part).unwrap();
            bytes.extend(enc.finish().unwrap());
        }
        std::fs::write(&src, bytes).unwrap();

        let dest = dir.path().join("multi.json.jsonl");
        let stats = Decompressor::new()
            .decompress_file(Codec::Gzip, &src, &dest)
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), SAMPLE);
        assert_eq!(stats.decompressed_size, SAMPLE.len() as u64);
    }

    #[test]
    fn test_zstd_decompress() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("shard.jsonl.zst");
        std::fs::write(&src, zstd::encode_all(SAMPLE, 3).unwrap()).unwrap();

        let dest = dir.path().join("shard.json.jsonl");
        Decompressor::with_buffer_size(4096)
            .decompress_file(Codec::Zstd, &src, &dest)
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), SAMPLE);
    }

    #[test]
    fn test_corrupt_input_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("broken.json.gz");
        std::fs::write(&src, b"definitely not gzip").unwrap();

        let dest = dir.path().join("broken.json.jsonl");
        let err = Decompressor::new()
            .decompress_file(Codec::Gzip, &src, &dest)
            .unwrap_err();

        assert!(matches!(err, PipelineError::DecompressionError { .. }));
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn test_plan_for_written_shard() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("x.jsonl.gz");
        write_gz(&src, SAMPLE);
        assert_eq!(plan_shard(&src, dir.path()), ShardPlan::Decompress {
            codec: Codec::Gzip,
            dest: dir.path().join("x.json.jsonl"),
        });
    }
}
