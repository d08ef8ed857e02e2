use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::AssemblerParams;
use crate::error::Result;
use crate::extract::price::parse_amount;
use crate::model::{AggregateResult, ChunkResult, Price, ScrapedItem, Summary};
use crate::results::{self, OUTPUT_FILE};

/// Numeric price of an item: `price_numeric`, then `price_value`, then a dollar
/// amount parsed from the display string. Each candidate passes the same
/// validity check as a stored price. `None` means it can never win.
pub fn resolve_price(item: &ScrapedItem) -> Option<f64> {
    item.price_numeric
        .value()
        .or_else(|| Price::from(item.price_value).value())
        .or_else(|| Price::from(parse_amount(&item.price_display)).value())
}

/// Cheapest non-errored item and its price. Ties go to the earliest item.
pub fn find_cheapest(items: &[ScrapedItem]) -> Option<(&ScrapedItem, f64)> {
    let mut best: Option<(&ScrapedItem, f64)> = None;
    for item in items.iter().filter(|i| !i.is_error()) {
        let Some(price) = resolve_price(item) else {
            continue;
        };
        if best.map_or(true, |(_, min)| price < min) {
            best = Some((item, price));
        }
    }
    best
}

pub fn aggregate(items: &[ScrapedItem]) -> AggregateResult {
    let errored_items = items.iter().filter(|i| i.is_error()).count();
    let (cheapest_item, min_price, summary) = match find_cheapest(items) {
        Some((item, price)) => (Some(item.clone()), price, Summary::of(item, price)),
        None => (None, 0.0, Summary::empty()),
    };

    AggregateResult {
        total_items_analyzed: items.len(),
        cheapest_item,
        min_price,
        summary,
        errored_items,
        result_files: 0,
        skipped_files: 0,
        generated_at: Utc::now(),
    }
}

#[cfg(feature = "rayon")]
fn parse_all(docs: &[(PathBuf, Vec<u8>)]) -> Vec<std::result::Result<ChunkResult, serde_json::Error>> {
    docs.par_iter().map(|(_, raw)| serde_json::from_slice(raw)).collect()
}

#[cfg(not(feature = "rayon"))]
fn parse_all(docs: &[(PathBuf, Vec<u8>)]) -> Vec<std::result::Result<ChunkResult, serde_json::Error>> {
    docs.iter().map(|(_, raw)| serde_json::from_slice(raw)).collect()
}

/// Read every chunk result in `results_dir` and write the cheapest item to
/// `output_dir`. Unparseable files are logged and left out.
pub fn run(results_dir: &Path, output_dir: &Path, _params: &AssemblerParams) -> Result<AggregateResult> {
    info!("Assembler started");

    let files = results::list_result_files(results_dir)?;
    info!("Found {} result files to process", files.len());

    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let raw = results::read_bytes(&path)?;
        docs.push((path, raw));
    }

    let mut all_items = Vec::new();
    let mut skipped_files = 0;
    for ((path, _), parsed) in docs.iter().zip(parse_all(&docs)) {
        match parsed {
            Ok(chunk) => all_items.extend(chunk.scraped_items),
            Err(e) => {
                error!("Error parsing result file {}: {}", path.display(), e);
                skipped_files += 1;
            }
        }
    }
    info!("Total items collected: {}", all_items.len());

    let mut result = aggregate(&all_items);
    result.result_files = docs.len();
    result.skipped_files = skipped_files;

    let output_path = output_dir.join(OUTPUT_FILE);
    results::write_json(&output_path, &result)?;

    match &result.cheapest_item {
        Some(item) => info!("Winner: '{}' at ${}", item.title, result.min_price),
        None => info!("No items found"),
    }
    Ok(result)
}
