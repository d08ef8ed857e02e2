use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::chunks::file_names;
use crate::error::{PipelineError, Result};
use crate::model::ChunkResult;

pub const OUTPUT_FILE: &str = "cheapest_item.json";

pub fn result_file_name(chunk_index: u64) -> String {
    format!("chunk_{}_results.json", chunk_index)
}

/// Pretty-print `value` to `path`, replacing any previous file atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| PipelineError::json(path.display().to_string(), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::io_at("create temp file in", dir, e))?;
    tmp.write_all(&body)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PipelineError::io_at("write", path, e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io_at("write", path, e.error))?;
    Ok(())
}

/// Store the result for one chunk. Re-running a chunk replaces its previous result.
pub fn write_chunk_result(dir: &Path, result: &ChunkResult) -> Result<PathBuf> {
    let path = dir.join(result_file_name(result.chunk_index));
    write_json(&path, result)?;
    Ok(path)
}

/// Candidate result documents: every regular, non-hidden file, sorted by name.
pub fn list_result_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(file_names(dir)?
        .into_iter()
        .filter(|name| !name.starts_with('.'))
        .map(|name| dir.join(name))
        .collect())
}

/// Raw bytes of a result file. Decoding, UTF-8 included, is left to the caller.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| PipelineError::io_at("read", path, e))
}
