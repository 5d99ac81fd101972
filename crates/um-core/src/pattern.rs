//! Site Pattern Compiler
//!
//! A site pattern is a space-separated list of glob fragments. Each fragment
//! is either `*` (any http/https page) or a hostname template such as
//! `example.com`, `*.example.org` or `news.example.net/articles`, where `*`
//! stands for exactly one hostname label or path segment.
//!
//! Fragments compile to anchored, case-insensitive regular expressions.
//! Shape errors are reported at compile time, never at match time.

use regex::{Regex, RegexBuilder};

use crate::url::{extract_scheme, www_variant};

/// Placeholder substituted for `*` when checking that a fragment forms a
/// valid hostname.
const WILDCARD_LABEL: &str = "wildcard";

/// A fragment could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid URL pattern: {fragment}")]
pub struct InvalidPatternError {
    pub fragment: String,
}

impl InvalidPatternError {
    fn new(fragment: &str) -> Self {
        Self {
            fragment: fragment.to_string(),
        }
    }
}

/// A compiled site pattern.
#[derive(Debug, Clone)]
pub struct SitePattern {
    raw: String,
    matchers: Vec<Regex>,
}

impl SitePattern {
    /// Compile a raw pattern string into one matcher per fragment.
    pub fn compile(pattern: &str) -> Result<Self, InvalidPatternError> {
        let matchers = pattern
            .split_whitespace()
            .map(compile_fragment)
            .collect::<Result<Vec<_>, _>>()?;

        if matchers.is_empty() {
            return Err(InvalidPatternError::new(pattern));
        }

        Ok(Self {
            raw: pattern.to_string(),
            matchers,
        })
    }

    /// The pattern as authored.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of fragments in the pattern.
    pub fn fragment_count(&self) -> usize {
        self.matchers.len()
    }

    /// Check whether a page URL matches any fragment.
    ///
    /// Authors write bare hostnames while pages may or may not carry a
    /// `www.` prefix, so the URL is tried as given and with the prefix
    /// toggled.
    pub fn matches(&self, url: &str) -> bool {
        if extract_scheme(url).is_none() {
            return false;
        }
        if self.matches_exact(url) {
            return true;
        }
        match www_variant(url) {
            Some(variant) => self.matches_exact(&variant),
            None => false,
        }
    }

    fn matches_exact(&self, url: &str) -> bool {
        self.matchers.iter().any(|re| re.is_match(url))
    }
}

fn compile_fragment(fragment: &str) -> Result<Regex, InvalidPatternError> {
    let source = if fragment == "*" {
        String::from("^https?://.+")
    } else {
        if !fragment.contains('.') {
            return Err(InvalidPatternError::new(fragment));
        }
        validate_host_shape(fragment)?;

        let body = regex::escape(fragment).replace(r"\*", "[^./]+");
        format!(r"^https?://{body}\b")
    };

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|_| InvalidPatternError::new(fragment))
}

fn validate_host_shape(fragment: &str) -> Result<(), InvalidPatternError> {
    let probe = format!("https://{}", fragment.replace('*', WILDCARD_LABEL));
    let parsed = url::Url::parse(&probe).map_err(|_| InvalidPatternError::new(fragment))?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(InvalidPatternError::new(fragment)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wildcard_matches_any_http_url() {
        let pattern = SitePattern::compile("*").expect("wildcard compiles");
        assert!(pattern.matches("https://example.com"));
        assert!(pattern.matches("http://a.b/c?d"));
        assert!(!pattern.matches("ftp://example.com"));
        assert!(!pattern.matches("chrome://extensions"));
    }

    #[test]
    fn fragment_without_dot_is_rejected() {
        let err = SitePattern::compile("localhost").unwrap_err();
        assert_eq!(err.fragment, "localhost");
        assert_eq!(err.to_string(), "Invalid URL pattern: localhost");
    }

    #[test]
    fn bad_fragment_is_named_in_multi_fragment_pattern() {
        let err = SitePattern::compile("example.com exa<mple.org").unwrap_err();
        assert_eq!(err.fragment, "exa<mple.org");
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(SitePattern::compile("").is_err());
        assert!(SitePattern::compile("   ").is_err());
    }

    #[test]
    fn matching_ignores_www_prefix() {
        let pattern = SitePattern::compile("example.com").unwrap();
        assert!(pattern.matches("https://example.com/x"));
        assert!(pattern.matches("https://www.example.com/x"));
        assert!(!pattern.matches("https://notexample.com"));
        assert!(!pattern.matches("https://example.org"));
    }

    #[test]
    fn www_pattern_matches_bare_host() {
        let pattern = SitePattern::compile("www.example.com").unwrap();
        assert!(pattern.matches("https://example.com/"));
        assert!(pattern.matches("https://www.example.com/"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let pattern = SitePattern::compile("Example.COM").unwrap();
        assert!(pattern.matches("HTTPS://EXAMPLE.com/Path"));
    }

    #[test]
    fn dots_are_literal() {
        let pattern = SitePattern::compile("example.com").unwrap();
        assert!(!pattern.matches("https://exampleXcom"));
    }

    #[test]
    fn star_matches_a_single_label() {
        let pattern = SitePattern::compile("*.example.com").unwrap();
        assert!(pattern.matches("https://news.example.com/story"));
        assert!(!pattern.matches("https://a.b.example.com/story"));
        assert!(!pattern.matches("https://news.example.net/story"));
    }

    #[test]
    fn any_fragment_may_match() {
        let pattern = SitePattern::compile("example.com example.org").unwrap();
        assert_eq!(pattern.fragment_count(), 2);
        assert!(pattern.matches("https://example.org/"));
        assert!(pattern.matches("http://www.example.com/"));
        assert!(!pattern.matches("https://example.net/"));
    }

    #[test]
    fn path_fragments_are_anchored_at_scheme() {
        let pattern = SitePattern::compile("example.com/news").unwrap();
        assert!(pattern.matches("https://example.com/news/today"));
        assert!(!pattern.matches("https://example.com/sports"));
    }

    proptest! {
        #[test]
        fn wildcard_accepts_every_http_url(
            secure in any::<bool>(),
            host in "[a-z][a-z0-9-]{0,10}(\\.[a-z]{2,6}){1,3}",
            path in "(/[a-z0-9]{0,8}){0,3}",
        ) {
            let pattern = SitePattern::compile("*").unwrap();
            let scheme = if secure { "https" } else { "http" };
            let url = format!("{scheme}://{host}{path}");
            prop_assert!(pattern.matches(&url));
        }

        #[test]
        fn dotless_fragments_never_compile(fragment in "[a-z0-9*-]{1,16}") {
            prop_assume!(fragment != "*");
            prop_assert!(SitePattern::compile(&fragment).is_err());
        }

        #[test]
        fn bare_and_www_hosts_match_alike(
            label in "[a-z][a-z0-9]{0,10}",
            tld in "[a-z]{2,6}",
            path in "(/[a-z0-9]{1,8}){0,3}",
        ) {
            let host = format!("{label}.{tld}");
            let pattern = SitePattern::compile(&host).unwrap();
            let bare = format!("https://{host}{path}");
            let www = format!("https://www.{host}{path}");
            prop_assert!(pattern.matches(&bare));
            prop_assert!(pattern.matches(&www));
        }
    }
}
