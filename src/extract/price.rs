use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Price, UNKNOWN};

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{2})?)").unwrap());

/// Dollar amount in `s` ("$1,299.00" -> 1299.0).
pub fn parse_amount(s: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(s)?;
    caps[1].replace(',', "").parse().ok()
}

/// Display text and numeric value from a container's price element.
pub fn extract(price_text: Option<&str>) -> (String, Price) {
    match price_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(display) => (display.to_string(), Price::from(parse_amount(display))),
        None => (UNKNOWN.to_string(), Price::Unknown),
    }
}
