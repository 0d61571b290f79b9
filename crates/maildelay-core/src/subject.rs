//! Subject line normalization.

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use crate::{Error, Result};

/// Strips reply and forward prefixes from subject lines.
#[derive(Debug, Clone)]
pub struct SubjectNormalizer {
    pattern: Regex,
}

impl SubjectNormalizer {
    /// Prefix patterns used when none are configured.
    pub const DEFAULT_PREFIXES: &'static [&'static str] = &[
        r"^\s*re\s*:",
        r"^\s*fwd?\s*:",
        r"^\s*aw\s*:",
        r"^\s*wg\s*:",
    ];

    /// Build a normalizer from prefix patterns, matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if there are no patterns, a pattern does not
    /// compile, or a pattern can match the empty string.
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Result<Self> {
        if prefixes.is_empty() {
            return Err(Error::Config("no subject prefixes configured".into()));
        }

        for prefix in prefixes {
            let prefix = prefix.as_ref();
            let single = Regex::new(prefix)
                .map_err(|e| Error::Config(format!("subject prefix '{prefix}': {e}")))?;
            if single.is_match("") {
                return Err(Error::Config(format!(
                    "subject prefix '{prefix}' matches the empty string"
                )));
            }
        }

        let alternation = prefixes
            .iter()
            .map(|prefix| format!("(?:{})", prefix.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self { pattern })
    }

    /// Remove prefixes until the subject no longer changes.
    ///
    /// Whitespace around the result is trimmed after each pass that removed
    /// a prefix. A subject without any prefix is returned untouched.
    #[must_use]
    pub fn clean(&self, subject: &str) -> String {
        let mut current = subject.to_string();

        // Every productive pass shortens the string.
        for _ in 0..=subject.len() {
            let stripped = match self.pattern.replace_all(&current, "") {
                Cow::Borrowed(_) => break,
                Cow::Owned(stripped) => stripped,
            };
            let stripped = stripped.trim();
            if stripped == current {
                break;
            }
            current = stripped.to_string();
        }

        current
    }
}

impl Default for SubjectNormalizer {
    #[allow(clippy::expect_used)] // built-in patterns are known to be valid
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIXES).expect("default subject prefixes are valid")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_nested_prefixes() {
        let normalizer = SubjectNormalizer::new(&["Re:", "Fwd:"]).unwrap();
        assert_eq!(normalizer.clean("Re: Re: Fwd: Hello"), "Hello");
    }

    #[test]
    fn test_fixed_point_unchanged() {
        let normalizer = SubjectNormalizer::new(&["Re:", "Fwd:"]).unwrap();
        assert_eq!(normalizer.clean("Hello"), "Hello");
        assert_eq!(normalizer.clean(""), "");
    }

    #[test]
    fn test_whitespace_kept_without_prefix() {
        let normalizer = SubjectNormalizer::new(&["Re:", "Fwd:"]).unwrap();
        assert_eq!(normalizer.clean("  Hello "), "  Hello ");
        assert_eq!(normalizer.clean("  Re:  Hello "), "Hello");
    }

    #[test]
    fn test_case_insensitive() {
        let normalizer = SubjectNormalizer::new(&["Re:", "Fwd:"]).unwrap();
        assert_eq!(normalizer.clean("RE: fwd: FWD: Lunch"), "Lunch");
    }

    #[test]
    fn test_default_prefixes() {
        let normalizer = SubjectNormalizer::default();
        assert_eq!(normalizer.clean("Re: AW: Fw: WG : Meeting notes"), "Meeting notes");
        // Anchored defaults leave inner occurrences alone.
        assert_eq!(normalizer.clean("Quarterly Re: numbers"), "Quarterly Re: numbers");
    }

    #[test]
    fn test_rejects_empty_match() {
        assert!(SubjectNormalizer::new(&["(Re:)?"]).is_err());
        assert!(SubjectNormalizer::new(&["^"]).is_err());
        assert!(SubjectNormalizer::new::<&str>(&[]).is_err());
    }

    #[test]
    fn test_rejects_invalid_pattern() {
        assert!(matches!(
            SubjectNormalizer::new(&["Re:("]),
            Err(Error::Config(_))
        ));
    }
}
