use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::chunks;
use crate::config::PartitionerParams;
use crate::error::{PipelineError, Result};

/// Counts reported after a partitioner run.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub urls_seen: usize,
    pub urls_valid: usize,
    pub chunks: Vec<u64>,
}

/// Collect, filter and batch URLs, writing one chunk per batch into `chunks_dir`.
pub fn run(source_dir: &Path, chunks_dir: &Path, params: &PartitionerParams) -> Result<PartitionReport> {
    info!("Partitioner started");

    let all_urls = match &params.urls {
        Some(urls) => {
            info!("Using URLs from parameters: {} URLs", urls.len());
            urls.clone()
        }
        None => collect_from_source(source_dir)?,
    };
    info!("Total URLs to process: {}", all_urls.len());

    let valid = filter_allowed(&all_urls, &params.allowed_domains);
    info!("Valid URLs after domain filter: {}", valid.len());

    let mut written = Vec::new();
    for batch in valid.chunks(params.chunk_size) {
        written.push(chunks::save_chunk(chunks_dir, batch)?);
    }
    info!("Created {} chunks", written.len());

    Ok(PartitionReport {
        urls_seen: all_urls.len(),
        urls_valid: valid.len(),
        chunks: written,
    })
}

/// URLs from every file in `dir`, in file-name order.
pub fn collect_from_source(dir: &Path) -> Result<Vec<String>> {
    let names = chunks::file_names(dir)?;
    info!("Found {} source files", names.len());

    let mut urls = Vec::new();
    for name in names {
        let path = dir.join(&name);
        let bytes = fs::read(&path).map_err(|e| PipelineError::io_at("read", &path, e))?;
        match String::from_utf8(bytes) {
            Ok(content) => urls.extend(urls_from_document(&name, &content)),
            Err(_) => warn!("Skipping {}: not UTF-8 text", name),
        }
    }
    Ok(urls)
}

/// A JSON array of URLs, a JSON object with a `urls` array, or plain text with
/// one URL per line.
pub fn urls_from_document(name: &str, content: &str) -> Vec<String> {
    let value: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => {
            return content
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with("http"))
                .map(str::to_string)
                .collect()
        }
    };

    let entries: &[Value] = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("urls") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|v| match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                warn!("Skipping non-string URL entry in {}: {}", name, v);
                None
            }
        })
        .collect()
}

/// Trimmed URLs containing at least one allow-listed marker, in input order.
pub fn filter_allowed(urls: &[String], markers: &[String]) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty() && markers.iter().any(|m| u.contains(m.as_str())))
        .map(str::to_string)
        .collect()
}
