use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["amazon.com", "amzn.to"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionerParams {
    /// Explicit URL list; when absent the source directory is scanned.
    pub urls: Option<Vec<String>>,
    pub chunk_size: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for PartitionerParams {
    fn default() -> Self {
        PartitionerParams {
            urls: None,
            chunk_size: 1,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperParams {
    pub headless: bool,
    /// Navigation timeout, milliseconds.
    pub timeout: u64,
    /// Pause between URLs, seconds.
    pub delay_between_requests: f64,
    /// Wait after navigation for client-side rendering, milliseconds.
    pub settle_ms: u64,
    /// Containers examined per page.
    pub max_items: usize,
    /// Replaces the built-in title patterns when set.
    pub title_patterns: Option<Vec<String>>,
}

impl Default for ScraperParams {
    fn default() -> Self {
        ScraperParams {
            headless: true,
            timeout: 30_000,
            delay_between_requests: 2.0,
            settle_ms: 3_000,
            max_items: 10,
            title_patterns: None,
        }
    }
}

impl ScraperParams {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_between_requests.max(0.0))
    }
}

/// The assembler takes no options; the type exists so its parameter string is still validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssemblerParams {}

/// Build stage parameters from a JSON string, with `<PREFIX>_<FIELD>` environment
/// variables layered on top.
fn load<T: DeserializeOwned>(raw: &str, env_prefix: &str) -> Result<T> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    Config::builder()
        .add_source(File::from_str(raw, FileFormat::Json))
        .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
        .build()?
        .try_deserialize()
        .map_err(PipelineError::from)
}

impl PartitionerParams {
    pub fn load(raw: &str) -> Result<Self> {
        let params: Self = load(raw, "PARTITIONER")?;
        if params.chunk_size == 0 {
            return Err(PipelineError::Config("chunk_size must be at least 1".into()));
        }
        Ok(params)
    }
}

impl ScraperParams {
    pub fn load(raw: &str) -> Result<Self> {
        let params: Self = load(raw, "SCRAPER")?;
        let delay = params.delay_between_requests;
        if !delay.is_finite() || Duration::try_from_secs_f64(delay.max(0.0)).is_err() {
            return Err(PipelineError::Config(format!(
                "delay_between_requests must be a finite number of seconds, got {}",
                delay
            )));
        }
        Ok(params)
    }
}

impl AssemblerParams {
    pub fn load(raw: &str) -> Result<Self> {
        load(raw, "ASSEMBLER")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// Fail unless `dir` is an existing directory, writable when `access` asks for it.
pub fn require_dir(role: &str, dir: &Path, access: Access) -> Result<()> {
    if !dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "{} directory '{}' does not exist or is not a directory",
            role,
            dir.display()
        )));
    }
    if let Err(e) = std::fs::read_dir(dir) {
        return Err(PipelineError::Config(format!(
            "{} directory '{}' is not readable: {}",
            role,
            dir.display(),
            e
        )));
    }
    if access == Access::Write {
        tempfile::tempfile_in(dir).map_err(|e| {
            PipelineError::Config(format!(
                "{} directory '{}' is not writable: {}",
                role,
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_object() {
        let p = PartitionerParams::load("{}").unwrap();
        assert_eq!(p.chunk_size, 1);
        assert!(p.urls.is_none());
        assert_eq!(p.allowed_domains, vec!["amazon.com", "amzn.to"]);

        let s = ScraperParams::load("").unwrap();
        assert!(s.headless);
        assert_eq!(s.timeout, 30_000);
        assert_eq!(s.request_delay(), Duration::from_secs(2));
        assert_eq!(s.max_items, 10);
    }

    #[test]
    fn explicit_values() {
        let p = PartitionerParams::load(r#"{"urls":["https://amzn.to/a"],"chunk_size":3}"#).unwrap();
        assert_eq!(p.urls.as_deref(), Some(&["https://amzn.to/a".to_string()][..]));
        assert_eq!(p.chunk_size, 3);

        let s = ScraperParams::load(
            r#"{"headless":false,"timeout":5000,"delay_between_requests":0.5,"max_items":5}"#,
        )
        .unwrap();
        assert!(!s.headless);
        assert_eq!(s.navigation_timeout(), Duration::from_millis(5000));
        assert_eq!(s.request_delay(), Duration::from_millis(500));
        assert_eq!(s.max_items, 5);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(PartitionerParams::load("{not json"), Err(PipelineError::Config(_))));
        assert!(matches!(
            PartitionerParams::load(r#"{"chunk_size":0}"#),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            ScraperParams::load(r#"{"delay_between_requests":1e20}"#),
            Err(PipelineError::Config(_))
        ));
        let negative = ScraperParams::load(r#"{"delay_between_requests":-3}"#).unwrap();
        assert_eq!(negative.request_delay(), Duration::ZERO);
    }

    #[test]
    fn directory_checks() {
        let dir = tempfile::tempdir().unwrap();
        require_dir("Chunks", dir.path(), Access::Write).unwrap();

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(require_dir("Source", &file, Access::Read).is_err());
        assert!(require_dir("Source", &dir.path().join("missing"), Access::Read).is_err());
    }
}
