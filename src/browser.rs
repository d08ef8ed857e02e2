use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Text captured from one product container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Container {
    /// Full text content of the container element.
    pub text: String,
    /// Text of the container's first price element, if it has one.
    #[serde(default)]
    pub price_text: Option<String>,
}

/// Something that can load a URL into a queryable page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Open `url` in a fresh page. Fails if navigation does not finish within `timeout`.
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn RenderedPage>>;
}

#[async_trait]
pub trait RenderedPage: Send + Sync {
    async fn count(&self, selector: &str) -> Result<usize>;

    /// The first `limit` elements matching `selector`, each with the text of its
    /// first `detail` descendant.
    async fn containers(&self, selector: &str, detail: &str, limit: usize) -> Result<Vec<Container>>;

    async fn close(self: Box<Self>);
}

fn cdp_err(e: CdpError) -> PipelineError {
    PipelineError::Browser(e.to_string())
}

/// Chromium driven over CDP. One browser process per stage run, one tab per URL.
pub struct ChromeRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeRenderer {
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1280, 1024)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", USER_AGENT));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(PipelineError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_err)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        info!("Chromium launched (headless={})", headless);
        Ok(ChromeRenderer { browser, handler })
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn RenderedPage>> {
        let page = self.browser.new_page("about:blank").await.map_err(cdp_err)?;

        let nav = tokio::time::timeout(timeout, page.goto(url))
            .await
            .map(|r| r.map(|_| ()));
        let err = match nav {
            Ok(Ok(())) => return Ok(Box::new(ChromePage { page })),
            Ok(Err(e)) => PipelineError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            },
            Err(_) => PipelineError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
        };

        if let Err(e) = page.close().await {
            debug!("Closing failed page: {}", e);
        }
        Err(err)
    }
}

struct ChromePage {
    page: Page,
}

async fn text_content(el: &Element) -> std::result::Result<Option<String>, CdpError> {
    let ret = el
        .call_js_fn("function() { return this.textContent; }", false)
        .await?;
    Ok(ret.result.value.and_then(|v| v.as_str().map(str::to_string)))
}

#[async_trait]
impl RenderedPage for ChromePage {
    async fn count(&self, selector: &str) -> Result<usize> {
        let found = self.page.find_elements(selector).await.map_err(cdp_err)?;
        Ok(found.len())
    }

    async fn containers(&self, selector: &str, detail: &str, limit: usize) -> Result<Vec<Container>> {
        let elements = self.page.find_elements(selector).await.map_err(cdp_err)?;

        let mut out = Vec::with_capacity(limit.min(elements.len()));
        for el in elements.iter().take(limit) {
            // A container that cannot be read becomes an empty one; the quality
            // filter drops it later.
            let text = match text_content(el).await {
                Ok(t) => t.unwrap_or_default(),
                Err(e) => {
                    debug!("Container text unavailable: {}", e);
                    String::new()
                }
            };
            let price_text = match el.find_elements(detail).await {
                Ok(found) => match found.first() {
                    Some(p) => text_content(p).await.ok().flatten(),
                    None => None,
                },
                Err(_) => None,
            };
            out.push(Container { text, price_text });
        }
        Ok(out)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            debug!("Page close failed: {}", e);
        }
    }
}
