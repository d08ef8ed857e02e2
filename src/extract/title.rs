use regex::Regex;
use tracing::debug;

use super::Rule;

/// First brand pattern that matches, with any trailing star-rating text cut off.
pub fn extract(text: &str, rules: &[Rule], rating_suffix: &Regex) -> Option<String> {
    rules.iter().find_map(|rule| {
        let raw = rule.capture(text)?.trim();
        let cleaned = rating_suffix.replace(raw, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }
        debug!("Title matched by {}", rule.pattern);
        Some(cleaned.to_string())
    })
}
