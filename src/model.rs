use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder for a title or price display that could not be extracted.
pub const UNKNOWN: &str = "Unknown";

/// Older result documents stored "no price" as this number instead of null.
pub const LEGACY_PRICE_SENTINEL: f64 = 999_999.0;

/// A numeric price, or the absence of one. Serialized as a number or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Price {
    Known(f64),
    #[default]
    Unknown,
}

impl Price {
    pub fn value(self) -> Option<f64> {
        match self {
            Price::Known(v) => Some(v),
            Price::Unknown => None,
        }
    }
}

impl From<Option<f64>> for Price {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(v) if v.is_finite() && v >= 0.0 && v != LEGACY_PRICE_SENTINEL => Price::Known(v),
            _ => Price::Unknown,
        }
    }
}

impl From<Price> for Option<f64> {
    fn from(p: Price) -> Self {
        p.value()
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// One product pulled off a search page, or one failed URL when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    #[serde(default)]
    pub url: String,
    #[serde(default = "unknown")]
    pub title: String,
    #[serde(rename = "price", alias = "price_display", default = "unknown")]
    pub price_display: String,
    #[serde(default)]
    pub price_numeric: Price,
    /// Alternate numeric field some producers write instead of `price_numeric`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_value: Option<f64>,
    #[serde(rename = "buyers", alias = "purchase_count", default)]
    pub purchase_count: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScrapedItem {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        ScrapedItem {
            url: url.to_string(),
            title: unknown(),
            price_display: unknown(),
            price_numeric: Price::Unknown,
            price_value: None,
            purchase_count: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result document written by the extractor for one chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkResult {
    #[serde(rename = "chunk_number", deserialize_with = "chunk_index_from_any")]
    pub chunk_index: u64,
    pub urls_processed: usize,
    pub scraped_items: Vec<ScrapedItem>,
    pub success_count: usize,
    pub error_count: usize,
    /// Containers found but discarded because title or price was missing.
    pub dropped_count: usize,
    /// URLs where neither container selector matched anything.
    pub empty_urls: usize,
}

impl ChunkResult {
    pub fn new(chunk_index: u64, urls_processed: usize, items: Vec<ScrapedItem>) -> Self {
        let error_count = items.iter().filter(|i| i.is_error()).count();
        ChunkResult {
            chunk_index,
            urls_processed,
            success_count: items.len() - error_count,
            error_count,
            scraped_items: items,
            dropped_count: 0,
            empty_urls: 0,
        }
    }
}

// Older producers wrote the chunk number as a string ("3").
fn chunk_index_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Num(n) => Ok(n),
        Repr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Flattened view of the winner for quick reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    pub price: String,
    pub price_value: f64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyers: Option<u64>,
}

impl Summary {
    pub fn empty() -> Self {
        Summary {
            title: "No items found".to_string(),
            price: "N/A".to_string(),
            price_value: 0.0,
            url: String::new(),
            buyers: None,
        }
    }

    pub fn of(item: &ScrapedItem, price: f64) -> Self {
        Summary {
            title: item.title.clone(),
            price: item.price_display.clone(),
            price_value: price,
            url: item.url.clone(),
            buyers: Some(item.purchase_count),
        }
    }
}

/// Final document written by the assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub total_items_analyzed: usize,
    pub cheapest_item: Option<ScrapedItem>,
    /// Winning price, or 0 when there is no winner.
    pub min_price: f64,
    pub summary: Summary,
    #[serde(default)]
    pub errored_items: usize,
    #[serde(default)]
    pub result_files: usize,
    #[serde(default)]
    pub skipped_files: usize,
    pub generated_at: DateTime<Utc>,
}
