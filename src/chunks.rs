use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

const CHUNK_PREFIX: &str = "data_";
const CHUNK_SUFFIX: &str = ".bin";

static CHUNK_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data_(\d+)\.bin$").unwrap());

/// A chunk file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFile {
    pub index: u64,
    pub path: PathBuf,
}

pub fn chunk_file_name(index: u64) -> String {
    format!("{}{}{}", CHUNK_PREFIX, index, CHUNK_SUFFIX)
}

fn parse_index(name: &str) -> Option<u64> {
    CHUNK_NAME_RE.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Regular file names in `dir`. Entries that are not valid UTF-8 are ignored.
pub(crate) fn file_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io_at("list", dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io_at("list", dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| PipelineError::io_at("stat", &entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Next free chunk index: one past the highest index present, or 0.
///
/// Scan-then-write is not atomic. One partitioner per directory is assumed;
/// [`write_chunk`] refuses to overwrite if that assumption is broken.
pub fn allocate_next_index(dir: &Path) -> Result<u64> {
    let next = file_names(dir)?
        .iter()
        .filter_map(|name| parse_index(name))
        .max()
        .map_or(0, |max| max + 1);
    Ok(next)
}

/// Write `bytes` as chunk `index`. The file appears fully written or not at all,
/// and an existing chunk with the same index is never replaced.
pub fn write_chunk(dir: &Path, index: u64, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(chunk_file_name(index));

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::io_at("create temp file in", dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PipelineError::io_at("write", &path, e))?;

    match tmp.persist_noclobber(&path) {
        Ok(_) => Ok(path),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            Err(PipelineError::DuplicateChunk(index))
        }
        Err(e) => Err(PipelineError::io_at("write", &path, e.error)),
    }
}

/// Encode `urls` and store them under the next free index.
pub fn save_chunk(dir: &Path, urls: &[String]) -> Result<u64> {
    let bytes = serde_json::to_vec(urls).map_err(|e| PipelineError::json("chunk payload", e))?;
    let index = allocate_next_index(dir)?;
    let path = write_chunk(dir, index, &bytes)?;
    info!("Chunk {} written to {}", index, path.display());
    Ok(index)
}

/// All chunk files in `dir`, ordered by index.
pub fn list_chunks(dir: &Path) -> Result<Vec<ChunkFile>> {
    let mut chunks = Vec::new();
    for name in file_names(dir)? {
        if !(name.starts_with(CHUNK_PREFIX) && name.ends_with(CHUNK_SUFFIX)) {
            continue;
        }
        match parse_index(&name) {
            Some(index) => chunks.push(ChunkFile {
                index,
                path: dir.join(&name),
            }),
            None => warn!("Skipping {}: no numeric chunk index in name", name),
        }
    }
    chunks.sort_by_key(|c| c.index);
    Ok(chunks)
}

pub fn read_chunk(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| PipelineError::io_at("read", path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::json(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(allocate_next_index(dir.path()).unwrap(), 0);
    }

    #[test]
    fn next_index_follows_the_highest() {
        let dir = tempfile::tempdir().unwrap();
        for i in [0, 2, 5] {
            fs::write(dir.path().join(chunk_file_name(i)), b"[]").unwrap();
        }
        fs::write(dir.path().join("data_9.bin.bak"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(allocate_next_index(dir.path()).unwrap(), 6);
    }

    #[test]
    fn save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec!["https://www.amazon.com/s?k=a".to_string()];
        assert_eq!(save_chunk(dir.path(), &urls).unwrap(), 0);
        assert_eq!(save_chunk(dir.path(), &urls).unwrap(), 1);

        let chunks = list_chunks(dir.path()).unwrap();
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(read_chunk(&chunks[0].path).unwrap(), urls);

        let raw = fs::read_to_string(dir.path().join("data_0.bin")).unwrap();
        assert_eq!(raw, r#"["https://www.amazon.com/s?k=a"]"#);
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_chunk(dir.path(), 3, b"[\"a\"]").unwrap();
        let err = write_chunk(dir.path(), 3, b"[\"b\"]").unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateChunk(3)));
        assert_eq!(fs::read(dir.path().join("data_3.bin")).unwrap(), b"[\"a\"]");
        // no temp file left behind
        assert_eq!(file_names(dir.path()).unwrap(), vec!["data_3.bin".to_string()]);
    }

    #[test]
    fn listing_orders_numerically_and_skips_odd_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["data_10.bin", "data_2.bin", "data_x.bin", "other.bin"] {
            fs::write(dir.path().join(name), b"[]").unwrap();
        }
        let idx: Vec<u64> = list_chunks(dir.path()).unwrap().iter().map(|c| c.index).collect();
        assert_eq!(idx, vec![2, 10]);
    }

    #[test]
    fn missing_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(matches!(allocate_next_index(&gone), Err(PipelineError::Io { .. })));
    }
}
