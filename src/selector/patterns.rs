//! Detection of framework-generated identifiers and class names.
//!
//! Values matched here are never used in a locator, however unique they are
//! at capture time: they change between builds or page loads.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SelectorConfig;

static GENERATED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^ember\d*$").unwrap(),                                    // ember650, ember
        Regex::new(r"^ember-").unwrap(),                                       // ember-view
        Regex::new(r"^:[a-zA-Z0-9]+:$").unwrap(),                              // React useId, :r1:
        Regex::new(r"^(__)?react").unwrap(),                                   // react-select-2-input
        Regex::new(r"^(ng-|_ngcontent-|_nghost-|cdk-)").unwrap(),              // angular
        Regex::new(r"^(v-|data-v-)[0-9a-f]{6,}").unwrap(),                     // vue scoped
        Regex::new(r"^svelte-[0-9a-z]+$").unwrap(),                            // svelte
        Regex::new(r"^(sc-|css-|jss\d|emotion-|makeStyles-)").unwrap(),        // styled / emotion / jss
        Regex::new(r"^Mui[A-Z][A-Za-z]*-").unwrap(),                           // MUI
        Regex::new(r"^(router|redux|mobx|vuex|radix|headlessui)-").unwrap(),   // routing / state
        Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap(), // UUID
        Regex::new(r"[-_]\d{2,}$").unwrap(),                                   // item-42
        Regex::new(r"[A-Za-z]\d{4,}$").unwrap(),                               // btn12345
        Regex::new(r"_\d{10,}").unwrap(),                                      // timestamp suffix
    ]
});

static HASHED_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").unwrap());

/// Decides whether an id or class name was generated by a framework.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    hashed_token_min_len: usize,
    hashed_token_require_digit: bool,
}

impl NoiseFilter {
    pub fn new(config: &SelectorConfig) -> Self {
        Self {
            hashed_token_min_len: config.hashed_token_min_len,
            hashed_token_require_digit: config.hashed_token_require_digit,
        }
    }

    pub fn is_generated(
        &self,
        value: &str,
    ) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return true;
        }
        if GENERATED_PATTERNS.iter().any(|re| re.is_match(value)) {
            return true;
        }
        self.is_hashed(value)
    }

    /// Lowercase alphanumeric tokens long enough to look like a content hash.
    fn is_hashed(
        &self,
        value: &str,
    ) -> bool {
        if value.len() < self.hashed_token_min_len || !HASHED_TOKEN.is_match(value) {
            return false;
        }
        let has_digit = value.chars().any(|c| c.is_ascii_digit());
        let has_alpha = value.chars().any(|c| c.is_ascii_alphabetic());
        if self.hashed_token_require_digit { has_digit && has_alpha } else { true }
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(&SelectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_ids_are_generated() {
        let filter = NoiseFilter::default();
        for value in [
            "ember650",
            ":r1:",
            "react-select-3-input",
            "_ngcontent-c12",
            "svelte-1x2y3z",
            "sc-bdfBwQ",
            "css-1hwfws3",
            "MuiButton-root",
            "9b2c1f4e-3d2a-4c5b-8e9f-0a1b2c3d4e5f",
            "row-42",
            "a1b2c3d4",
        ] {
            assert!(filter.is_generated(value), "{value}");
        }
    }

    #[test]
    fn test_stable_names_are_kept() {
        let filter = NoiseFilter::default();
        for value in ["submit", "login-form", "primary", "nav-item", "search_box", "container"] {
            assert!(!filter.is_generated(value), "{value}");
        }
    }

    #[test]
    fn test_hashed_token_without_digit_requirement() {
        let config = SelectorConfig {
            hashed_token_require_digit: false,
            ..Default::default()
        };
        let filter = NoiseFilter::new(&config);
        assert!(filter.is_generated("container"));
        assert!(!filter.is_generated("card"));
    }
}
