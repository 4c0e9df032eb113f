//! Input discovery for the unzip and parse stages

use crate::error::{PipelineError, Result};
use crate::fs::Codec;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A discovered input file
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Absolute or config-relative path
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Compressed shards directly inside `dir` (not recursive), sorted by name
pub fn list_shards(dir: &Path) -> Result<Vec<InputFile>> {
    if !dir.is_dir() {
        return Err(PipelineError::NotFound(dir.to_path_buf()));
    }

    let mut shards: Vec<InputFile> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| Codec::from_path(entry.path()).is_some())
        .map(|entry| InputFile {
            size: entry.metadata().map(|m| m.len()).unwrap_or(0),
            path: entry.into_path(),
        })
        .collect();

    shards.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(shards)
}

/// JSONL inputs: `path` itself if it is a file, else every `*.jsonl`
/// below it, sorted.
pub fn find_jsonl(path: &Path) -> Result<Vec<InputFile>> {
    if path.is_file() {
        let size = std::fs::metadata(path)
            .map(|m| m.len())
            .unwrap_or(0);
        return Ok(vec![InputFile {
            path: path.to_path_buf(),
            size,
        }]);
    }

    if !path.is_dir() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }

    let mut files: Vec<InputFile> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == "jsonl"))
        .map(|entry| InputFile {
            size: entry.metadata().map(|m| m.len()).unwrap_or(0),
            path: entry.into_path(),
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_shards_is_flat_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json.gz"), b"x").unwrap();
        std::fs::write(dir.path().join("a.jsonl.zst"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.json.gz"), b"x").unwrap();

        let shards = list_shards(dir.path()).unwrap();
        let names: Vec<_> = shards
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl.zst", "b.json.gz"]);
    }

    #[test]
    fn test_list_shards_missing_dir() {
        assert!(matches!(
            list_shards(Path::new("/nonexistent/shards")),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_jsonl_recursive_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
        std::fs::write(dir.path().join("x/y/2.json.jsonl"), b"{}").unwrap();
        std::fs::write(dir.path().join("1.json.jsonl"), b"{}").unwrap();
        std::fs::write(dir.path().join("skip.json"), b"{}").unwrap();

        let files = find_jsonl(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("1.json.jsonl"));
        assert!(files[1].path.ends_with("x/y/2.json.jsonl"));
    }

    #[test]
    fn test_find_jsonl_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("one.txt");
        std::fs::write(&file, b"{}\n").unwrap();
        let files = find_jsonl(&file).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 3);
    }
}
