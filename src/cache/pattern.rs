//! Key patterns for bulk invalidation.

use regex::Regex;

/// Selects which keys `invalidate` removes.
///
/// A `Substring` pattern matches any key containing the text anywhere, not
/// only at the start.
#[derive(Debug, Clone)]
pub enum InvalidationPattern {
    /// Key contains this text.
    Substring(String),
    /// Key matches this expression.
    Regex(Regex),
}

impl InvalidationPattern {
    /// Whether `key` should be invalidated.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            InvalidationPattern::Substring(needle) => key.contains(needle.as_str()),
            InvalidationPattern::Regex(re) => re.is_match(key),
        }
    }
}

impl From<&str> for InvalidationPattern {
    fn from(s: &str) -> Self {
        InvalidationPattern::Substring(s.to_string())
    }
}

impl From<String> for InvalidationPattern {
    fn from(s: String) -> Self {
        InvalidationPattern::Substring(s)
    }
}

impl From<Regex> for InvalidationPattern {
    fn from(re: Regex) -> Self {
        InvalidationPattern::Regex(re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_matches_anywhere() {
        let p = InvalidationPattern::from("student:");
        assert!(p.matches("student:42"));
        assert!(p.matches("risk:student:42"));
        assert!(!p.matches("asset:42"));
    }

    #[test]
    fn test_substring_is_literal() {
        // regex metacharacters have no special meaning in substring mode
        let p = InvalidationPattern::from("a.b");
        assert!(p.matches("xa.by"));
        assert!(!p.matches("axb"));
    }

    #[test]
    fn test_regex_matches() {
        let p = InvalidationPattern::from(Regex::new(r"^asset:\d+$").unwrap());
        assert!(p.matches("asset:17"));
        assert!(!p.matches("asset:17:forecast"));
        assert!(!p.matches("old-asset:17"));
    }

    #[test]
    fn test_empty_substring_matches_everything() {
        let p = InvalidationPattern::from(String::new());
        assert!(p.matches(""));
        assert!(p.matches("anything"));
    }
}
