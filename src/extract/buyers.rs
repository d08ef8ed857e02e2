use regex::Regex;

use super::Rule;

/// Purchase count: "<N>K+ bought" first, then the ordered count patterns,
/// stopping at the first one that yields a positive number.
pub fn extract(text: &str, bulk: &Regex, rules: &[Rule]) -> u64 {
    if let Some(caps) = bulk.captures(text) {
        if let Some(n) = caps[1].parse::<u64>().ok().and_then(|n| n.checked_mul(1000)) {
            return n;
        }
    }

    rules
        .iter()
        .filter_map(|rule| rule.capture(text))
        .filter_map(|raw| raw.replace(',', "").parse::<u64>().ok())
        .find(|&n| n > 0)
        .unwrap_or(0)
}
