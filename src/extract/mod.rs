pub mod buyers;
pub mod price;
pub mod title;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::browser::Container;
use crate::error::{PipelineError, Result};
use crate::model::{ScrapedItem, UNKNOWN};

/// Brand-anchored title patterns, tried in order.
pub const DEFAULT_TITLE_PATTERNS: &[&str] = &[
    r"(Echo [^,]+(?:, [^,]+)*)",
    r"(Kindle [^,]+(?:, [^,]+)*)",
    r"(Fire [^,]+(?:, [^,]+)*)",
    r"(Amazon [^,]+(?:, [^,]+)*)",
];

pub const DEFAULT_BUYER_PATTERNS: &[&str] = &[
    r"(?i)(\d+(?:,\d+)*)\s+bought",
    r"(?i)(\d+(?:,\d+)*)\s+purchased",
    r"(?i)(\d+(?:,\d+)*)\s+ratings?",
    r"(?i)(\d+(?:,\d+)*)\s+reviews?",
];

static RATING_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+\.\d+\s+out\s+of\s+\d+.*").unwrap());
static BULK_BUYERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)K\+?\s+bought").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// One entry in an ordered fallback chain. The first capture group is the value.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub re: Regex,
}

impl Rule {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|source| PipelineError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Rule {
            pattern: pattern.to_string(),
            re,
        })
    }

    /// First capture group of the first match, or the whole match when the
    /// pattern has no group.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let caps = self.re.captures(text)?;
        caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Rule>> {
    patterns.iter().map(|p| Rule::new(p)).collect()
}

/// Pattern tables driving per-container extraction.
#[derive(Debug, Clone)]
pub struct ExtractRules {
    pub titles: Vec<Rule>,
    pub buyers: Vec<Rule>,
    rating_suffix: Regex,
    bulk_buyers: Regex,
}

impl ExtractRules {
    /// Built-in tables, with the title chain swapped out when `title_patterns` is given.
    pub fn new(title_patterns: Option<&[String]>) -> Result<Self> {
        let titles = match title_patterns {
            Some(custom) => custom.iter().map(|p| Rule::new(p)).collect::<Result<Vec<_>>>()?,
            None => compile(DEFAULT_TITLE_PATTERNS)?,
        };
        if titles.is_empty() {
            return Err(PipelineError::Config("title_patterns must not be empty".into()));
        }
        Ok(ExtractRules {
            titles,
            buyers: compile(DEFAULT_BUYER_PATTERNS)?,
            rating_suffix: RATING_SUFFIX_RE.clone(),
            bulk_buyers: BULK_BUYERS_RE.clone(),
        })
    }
}

/// Collapse runs of whitespace (text content of a container spans many nodes).
pub fn flatten(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Build an item from one product container. `None` when title or price is missing.
pub fn extract_item(url: &str, container: &Container, rules: &ExtractRules) -> Option<ScrapedItem> {
    let text = flatten(&container.text);

    let title = title::extract(&text, &rules.titles, &rules.rating_suffix);
    let (price_display, price_numeric) = price::extract(container.price_text.as_deref());
    let purchase_count = buyers::extract(&text, &rules.bulk_buyers, &rules.buyers);

    let title = match title {
        Some(t) if price_display != UNKNOWN => t,
        _ => {
            debug!("Dropping container on {}: title or price missing", url);
            return None;
        }
    };

    Some(ScrapedItem {
        url: url.to_string(),
        title,
        price_display,
        price_numeric,
        price_value: None,
        purchase_count,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Price;

    fn fixture(name: &str) -> Vec<Container> {
        let raw = std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn rules() -> ExtractRules {
        ExtractRules::new(None).unwrap()
    }

    #[test]
    fn echo_search_page() {
        let containers = fixture("echo_search");
        let items: Vec<_> = containers
            .iter()
            .filter_map(|c| extract_item("https://www.amazon.com/s?k=echo+dot", c, &rules()))
            .collect();

        // sponsored banner has no price, accessory matches no brand pattern
        assert_eq!(items.len(), 3);

        let dot = &items[0];
        assert_eq!(dot.title, "Echo Dot (5th Gen, 2022 release), Smart speaker with Alexa, Charcoal");
        assert_eq!(dot.price_display, "$49.99");
        assert_eq!(dot.price_numeric, Price::Known(49.99));
        assert_eq!(dot.purchase_count, 10_000);

        let kindle = &items[1];
        assert!(kindle.title.starts_with("Kindle Paperwhite"));
        assert_eq!(kindle.purchase_count, 31_234);

        let fire = &items[2];
        assert!(fire.title.starts_with("Fire TV Stick"));
        assert_eq!(fire.price_numeric, Price::Known(1299.0));
        assert_eq!(fire.purchase_count, 0);
    }

    #[test]
    fn missing_price_drops_item() {
        let c = Container {
            text: "Echo Pop 4.5 out of 5 stars".into(),
            price_text: None,
        };
        assert!(extract_item("u", &c, &rules()).is_none());
    }

    #[test]
    fn missing_title_drops_item() {
        let c = Container {
            text: "USB-C cable 3ft 500 bought in past month".into(),
            price_text: Some("$7.99".into()),
        };
        assert!(extract_item("u", &c, &rules()).is_none());
    }

    #[test]
    fn custom_title_patterns_replace_builtins() {
        let custom = vec![r"(Ring [^,]+)".to_string()];
        let rules = ExtractRules::new(Some(custom.as_slice())).unwrap();
        let ring = Container {
            text: "Ring Video Doorbell 4.4 out of 5 stars".into(),
            price_text: Some("$99.99".into()),
        };
        let echo = Container {
            text: "Echo Dot".into(),
            price_text: Some("$22.99".into()),
        };
        assert_eq!(extract_item("u", &ring, &rules).unwrap().title, "Ring Video Doorbell");
        assert!(extract_item("u", &echo, &rules).is_none());
    }

    #[test]
    fn bad_pattern_is_reported() {
        let custom = vec!["(unclosed".to_string()];
        assert!(matches!(
            ExtractRules::new(Some(custom.as_slice())),
            Err(PipelineError::Pattern { .. })
        ));
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            ExtractRules::new(Some(empty.as_slice())),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn flatten_collapses_whitespace() {
        assert_eq!(flatten("  Echo\n\n  Dot \t (5th Gen) "), "Echo Dot (5th Gen)");
    }
}
