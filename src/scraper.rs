use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::browser::{PageRenderer, RenderedPage};
use crate::chunks;
use crate::config::ScraperParams;
use crate::error::{PipelineError, Result};
use crate::extract::{extract_item, ExtractRules};
use crate::model::{ChunkResult, ScrapedItem};
use crate::results;

pub const PRIMARY_SELECTOR: &str = r#"[data-component-type="s-search-result"]"#;
pub const FALLBACK_SELECTOR: &str = ".s-result-item";
pub const PRICE_SELECTOR: &str = ".a-price .a-offscreen";

/// Scrape stats returned after completion.
#[derive(Debug, Default, PartialEq)]
pub struct ScrapeStats {
    pub chunks: usize,
    pub skipped_chunks: usize,
    pub urls: usize,
    pub items: usize,
    pub errors: usize,
    pub dropped: usize,
}

/// What one URL produced.
#[derive(Debug, Default)]
struct UrlOutcome {
    items: Vec<ScrapedItem>,
    dropped: usize,
    empty: bool,
}

/// Sleeps before every request except the first of the run.
struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.started = true;
    }
}

/// Process every chunk in `chunks_dir`, writing one result document per chunk.
///
/// URLs are fetched one at a time with `delay_between_requests` between them.
pub async fn scrape_chunks(
    renderer: &dyn PageRenderer,
    chunks_dir: &Path,
    results_dir: &Path,
    params: &ScraperParams,
    rules: &ExtractRules,
) -> Result<ScrapeStats> {
    let files = chunks::list_chunks(chunks_dir)?;
    let mut stats = ScrapeStats::default();
    if files.is_empty() {
        warn!("No chunk files found in {}", chunks_dir.display());
        return Ok(stats);
    }
    info!("Processing {} chunk files", files.len());

    let mut work = Vec::with_capacity(files.len());
    for file in files {
        match chunks::read_chunk(&file.path) {
            Ok(urls) => work.push((file.index, urls)),
            Err(e @ PipelineError::Json { .. }) => {
                warn!("Skipping chunk {}: {}", file.index, e);
                stats.skipped_chunks += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let total_urls: usize = work.iter().map(|(_, urls)| urls.len()).sum();
    let pb = ProgressBar::new(total_urls as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut pacer = Pacer {
        delay: params.request_delay(),
        started: false,
    };

    for (index, urls) in work {
        info!("Processing chunk {} with {} URLs", index, urls.len());
        let result = scrape_chunk(renderer, index, &urls, params, rules, &mut pacer, &pb).await;
        results::write_chunk_result(results_dir, &result)?;
        info!(
            "Chunk {}: {} success, {} errors, {} dropped",
            index, result.success_count, result.error_count, result.dropped_count
        );

        stats.chunks += 1;
        stats.urls += result.urls_processed;
        stats.items += result.success_count;
        stats.errors += result.error_count;
        stats.dropped += result.dropped_count;
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} URLs in {} chunks ({} items, {} errors, {} dropped)",
        stats.urls, stats.chunks, stats.items, stats.errors, stats.dropped
    );
    Ok(stats)
}

async fn scrape_chunk(
    renderer: &dyn PageRenderer,
    index: u64,
    urls: &[String],
    params: &ScraperParams,
    rules: &ExtractRules,
    pacer: &mut Pacer,
    pb: &ProgressBar,
) -> ChunkResult {
    let mut items = Vec::new();
    let mut dropped = 0;
    let mut empty = 0;

    for url in urls {
        pacer.wait().await;
        info!("Scraping: {}", url);
        match scrape_url(renderer, url, params, rules).await {
            Ok(outcome) => {
                items.extend(outcome.items);
                dropped += outcome.dropped;
                empty += usize::from(outcome.empty);
            }
            Err(e) => {
                warn!("Error scraping {}: {}", url, e);
                items.push(ScrapedItem::failed(url, e.to_string()));
            }
        }
        pb.inc(1);
    }

    let mut result = ChunkResult::new(index, urls.len(), items);
    result.dropped_count = dropped;
    result.empty_urls = empty;
    result
}

async fn scrape_url(
    renderer: &dyn PageRenderer,
    url: &str,
    params: &ScraperParams,
    rules: &ExtractRules,
) -> Result<UrlOutcome> {
    let page = renderer.open(url, params.navigation_timeout()).await?;
    let outcome = read_page(page.as_ref(), url, params, rules).await;
    page.close().await;
    outcome
}

async fn read_page(
    page: &dyn RenderedPage,
    url: &str,
    params: &ScraperParams,
    rules: &ExtractRules,
) -> Result<UrlOutcome> {
    // search results render client-side
    let settle = params.settle_delay();
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    let mut selector = PRIMARY_SELECTOR;
    let mut found = page.count(selector).await?;
    if found == 0 {
        selector = FALLBACK_SELECTOR;
        found = page.count(selector).await?;
    }
    if found == 0 {
        warn!("No products found on page: {}", url);
        return Ok(UrlOutcome {
            empty: true,
            ..Default::default()
        });
    }
    info!("Found {} products on search page", found);

    let containers = page.containers(selector, PRICE_SELECTOR, params.max_items).await?;
    let mut outcome = UrlOutcome::default();
    for container in &containers {
        match extract_item(url, container, rules) {
            Some(item) => outcome.items.push(item),
            None => outcome.dropped += 1,
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::browser::mock::MockRenderer;
    use crate::browser::Container;
    use crate::model::Price;

    const DOT: &str = "https://www.amazon.com/s?k=echo+dot";
    const KINDLE: &str = "https://www.amazon.com/s?k=kindle";
    const BROKEN: &str = "https://www.amazon.com/s?k=broken";
    const BLANK: &str = "https://www.amazon.com/s?k=nothing";

    fn params() -> ScraperParams {
        ScraperParams {
            delay_between_requests: 0.0,
            settle_ms: 0,
            max_items: 5,
            ..Default::default()
        }
    }

    fn product(title: &str, price: &str) -> Container {
        Container {
            text: format!("{} 4.5 out of 5 stars 1,024 ratings", title),
            price_text: Some(price.to_string()),
        }
    }

    fn read_result(dir: &Path, index: u64) -> ChunkResult {
        let raw = fs::read_to_string(dir.join(results::result_file_name(index))).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn one_bad_url_does_not_sink_the_chunk() {
        let chunks_dir = tempfile::tempdir().unwrap();
        let results_dir = tempfile::tempdir().unwrap();
        chunks::save_chunk(
            chunks_dir.path(),
            &[DOT.to_string(), BROKEN.to_string(), KINDLE.to_string(), BLANK.to_string()],
        )
        .unwrap();

        let renderer = MockRenderer::default()
            .page(
                DOT,
                PRIMARY_SELECTOR,
                vec![
                    product("Echo Dot (5th Gen)", "$49.99"),
                    Container {
                        text: "Echo Dot stand".into(),
                        price_text: None,
                    },
                ],
            )
            .failing(BROKEN, "net::ERR_CONNECTION_RESET")
            .page(KINDLE, FALLBACK_SELECTOR, vec![product("Kindle Scribe", "$339.99")]);

        let rules = ExtractRules::new(None).unwrap();
        let stats = scrape_chunks(&renderer, chunks_dir.path(), results_dir.path(), &params(), &rules)
            .await
            .unwrap();

        assert_eq!(renderer.opened(), vec![DOT, BROKEN, KINDLE, BLANK]);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.items, 2);
        assert_eq!(stats.errors, 1);

        let result = read_result(results_dir.path(), 0);
        assert_eq!(result.urls_processed, 4);
        assert_eq!(result.scraped_items.len(), 3);
        assert_eq!(result.success_count + result.error_count, result.scraped_items.len());
        assert_eq!(result.dropped_count, 1);
        assert_eq!(result.empty_urls, 1);

        let failed = &result.scraped_items[1];
        assert_eq!(failed.url, BROKEN);
        assert!(failed.error.as_deref().unwrap().contains("ERR_CONNECTION_RESET"));
        assert_eq!(failed.price_numeric, Price::Unknown);

        let kindle = &result.scraped_items[2];
        assert_eq!(kindle.title, "Kindle Scribe");
        assert_eq!(kindle.price_numeric, Price::Known(339.99));
        assert_eq!(kindle.purchase_count, 1024);
    }

    #[tokio::test]
    async fn container_count_is_capped() {
        let chunks_dir = tempfile::tempdir().unwrap();
        let results_dir = tempfile::tempdir().unwrap();
        chunks::save_chunk(chunks_dir.path(), &[DOT.to_string()]).unwrap();

        let many = (0..8).map(|i| product(&format!("Echo Pop {}", i), "$39.99")).collect();
        let renderer = MockRenderer::default().page(DOT, PRIMARY_SELECTOR, many);

        let rules = ExtractRules::new(None).unwrap();
        scrape_chunks(&renderer, chunks_dir.path(), results_dir.path(), &params(), &rules)
            .await
            .unwrap();

        assert_eq!(read_result(results_dir.path(), 0).scraped_items.len(), 5);
    }

    #[tokio::test]
    async fn undecodable_chunk_is_skipped() {
        let chunks_dir = tempfile::tempdir().unwrap();
        let results_dir = tempfile::tempdir().unwrap();
        fs::write(chunks_dir.path().join("data_0.bin"), b"not json").unwrap();
        chunks::save_chunk(chunks_dir.path(), &[KINDLE.to_string()]).unwrap();

        let renderer = MockRenderer::default();
        let rules = ExtractRules::new(None).unwrap();
        let stats = scrape_chunks(&renderer, chunks_dir.path(), results_dir.path(), &params(), &rules)
            .await
            .unwrap();

        assert_eq!(stats.skipped_chunks, 1);
        assert_eq!(stats.chunks, 1);
        assert!(!results_dir.path().join("chunk_0_results.json").exists());
        assert_eq!(read_result(results_dir.path(), 1).empty_urls, 1);
    }

    #[tokio::test]
    async fn no_chunks_is_not_an_error() {
        let chunks_dir = tempfile::tempdir().unwrap();
        let results_dir = tempfile::tempdir().unwrap();
        let rules = ExtractRules::new(None).unwrap();
        let stats = scrape_chunks(&MockRenderer::default(), chunks_dir.path(), results_dir.path(), &params(), &rules)
            .await
            .unwrap();
        assert_eq!(stats, ScrapeStats::default());
    }
}
