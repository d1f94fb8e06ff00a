//! Matcher kinds and their compiled form.
//!
//! Rules are authored with a [`MatcherKind`] plus a string option map. At
//! rule construction the pair is compiled once into a [`Matcher`], which
//! carries exactly the data its predicate needs (regexes compiled, rule-side
//! JSON parsed). Evaluation lives in [`crate::matching`].

use crate::compare::FlatMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate kind deciding whether a rule applies to an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatcherKind {
    ForHost,
    ForUrl,
    ForUrlsMatchingRegex,
    ExactQueryString,
    IncludingHeaders,
    ExactBody,
    BodyIncluding,
    ExactJsonBody,
    JsonBodyIncluding,
}

impl MatcherKind {
    pub const ALL: [MatcherKind; 9] = [
        MatcherKind::ForHost,
        MatcherKind::ForUrl,
        MatcherKind::ForUrlsMatchingRegex,
        MatcherKind::ExactQueryString,
        MatcherKind::IncludingHeaders,
        MatcherKind::ExactBody,
        MatcherKind::BodyIncluding,
        MatcherKind::ExactJsonBody,
        MatcherKind::JsonBodyIncluding,
    ];

    /// Canonical option key. `IncludingHeaders` has none: every entry is
    /// a header pair.
    pub fn option_key(self) -> Option<&'static str> {
        match self {
            MatcherKind::ForHost => Some("host"),
            MatcherKind::ForUrl => Some("url"),
            MatcherKind::ForUrlsMatchingRegex => Some("regexPattern"),
            MatcherKind::ExactQueryString => Some("query"),
            MatcherKind::IncludingHeaders => None,
            MatcherKind::ExactBody => Some("exactBody"),
            MatcherKind::BodyIncluding => Some("partBody"),
            MatcherKind::ExactJsonBody => Some("exactJsonBody"),
            MatcherKind::JsonBodyIncluding => Some("partJsonBody"),
        }
    }

    /// Whether evaluation requires the request body.
    pub fn needs_body(self) -> bool {
        matches!(
            self,
            MatcherKind::ExactBody
                | MatcherKind::BodyIncluding
                | MatcherKind::ExactJsonBody
                | MatcherKind::JsonBodyIncluding
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            MatcherKind::ForHost => "forHost",
            MatcherKind::ForUrl => "forUrl",
            MatcherKind::ForUrlsMatchingRegex => "forUrlsMatchingRegex",
            MatcherKind::ExactQueryString => "exactQueryString",
            MatcherKind::IncludingHeaders => "includingHeaders",
            MatcherKind::ExactBody => "exactBody",
            MatcherKind::BodyIncluding => "bodyIncluding",
            MatcherKind::ExactJsonBody => "exactJsonBody",
            MatcherKind::JsonBodyIncluding => "jsonBodyIncluding",
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A URL pattern compiled at rule construction.
///
/// A pattern that fails to compile is kept (for reporting) and never
/// matches.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl UrlPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source).map_err(|e| e.to_string());
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.compiled.as_ref().err().map(String::as_str)
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Rule-side JSON body, parsed once as a flat string map.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPattern {
    source: String,
    parsed: Option<FlatMap>,
}

impl JsonPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = FlatMap::from_json_text(&source);
        Self { source, parsed }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parsed(&self) -> Option<&FlatMap> {
        self.parsed.as_ref()
    }
}

/// Compiled matcher: one variant per [`MatcherKind`], each carrying only
/// its own data.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Host(String),
    Url(String),
    UrlRegex(UrlPattern),
    QueryString(String),
    Headers(FlatMap),
    ExactBody(String),
    BodyIncluding(String),
    ExactJson(JsonPattern),
    JsonIncluding(JsonPattern),
}

impl Matcher {
    pub fn host(host: impl Into<String>) -> Self {
        Matcher::Host(host.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Matcher::Url(url.into())
    }

    pub fn url_regex(pattern: impl Into<String>) -> Self {
        Matcher::UrlRegex(UrlPattern::new(pattern))
    }

    pub fn query(value: impl Into<String>) -> Self {
        Matcher::QueryString(value.into())
    }

    pub fn headers(headers: FlatMap) -> Self {
        Matcher::Headers(headers)
    }

    pub fn exact_body(body: impl Into<String>) -> Self {
        Matcher::ExactBody(body.into())
    }

    pub fn body_including(part: impl Into<String>) -> Self {
        Matcher::BodyIncluding(part.into())
    }

    pub fn exact_json(json: impl Into<String>) -> Self {
        Matcher::ExactJson(JsonPattern::new(json))
    }

    pub fn json_including(json: impl Into<String>) -> Self {
        Matcher::JsonIncluding(JsonPattern::new(json))
    }

    /// Compile an authored (kind, options) pair. Returns `None` when the
    /// canonical option is missing.
    pub fn compile(kind: MatcherKind, options: &FlatMap) -> Option<Matcher> {
        let value = match kind.option_key() {
            Some(key) => options.get(key)?,
            None => return Some(Matcher::Headers(options.clone())),
        };
        Some(match kind {
            MatcherKind::ForHost => Matcher::host(value),
            MatcherKind::ForUrl => Matcher::url(value),
            MatcherKind::ForUrlsMatchingRegex => Matcher::url_regex(value),
            MatcherKind::ExactQueryString => Matcher::query(value),
            MatcherKind::ExactBody => Matcher::exact_body(value),
            MatcherKind::BodyIncluding => Matcher::body_including(value),
            MatcherKind::ExactJsonBody => Matcher::exact_json(value),
            MatcherKind::JsonBodyIncluding => Matcher::json_including(value),
            MatcherKind::IncludingHeaders => Matcher::Headers(options.clone()),
        })
    }

    pub fn kind(&self) -> MatcherKind {
        match self {
            Matcher::Host(_) => MatcherKind::ForHost,
            Matcher::Url(_) => MatcherKind::ForUrl,
            Matcher::UrlRegex(_) => MatcherKind::ForUrlsMatchingRegex,
            Matcher::QueryString(_) => MatcherKind::ExactQueryString,
            Matcher::Headers(_) => MatcherKind::IncludingHeaders,
            Matcher::ExactBody(_) => MatcherKind::ExactBody,
            Matcher::BodyIncluding(_) => MatcherKind::BodyIncluding,
            Matcher::ExactJson(_) => MatcherKind::ExactJsonBody,
            Matcher::JsonIncluding(_) => MatcherKind::JsonBodyIncluding,
        }
    }

    /// The authored option map this matcher corresponds to.
    pub fn to_options(&self) -> FlatMap {
        let value = match self {
            Matcher::Headers(headers) => return headers.clone(),
            Matcher::Host(v)
            | Matcher::Url(v)
            | Matcher::QueryString(v)
            | Matcher::ExactBody(v)
            | Matcher::BodyIncluding(v) => v.as_str(),
            Matcher::UrlRegex(p) => p.source(),
            Matcher::ExactJson(p) | Matcher::JsonIncluding(p) => p.source(),
        };
        let mut options = FlatMap::new();
        if let Some(key) = self.kind().option_key() {
            options.insert(key, value);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_uses_canonical_key() {
        let options = FlatMap::from([("host", "example.com")]);
        assert_eq!(
            Matcher::compile(MatcherKind::ForHost, &options),
            Some(Matcher::host("example.com"))
        );
        assert_eq!(Matcher::compile(MatcherKind::ForUrl, &options), None);
    }

    #[test]
    fn test_headers_take_whole_map() {
        let options = FlatMap::from([("X-A", "1"), ("X-B", "2")]);
        assert_eq!(
            Matcher::compile(MatcherKind::IncludingHeaders, &options),
            Some(Matcher::headers(options.clone()))
        );
        assert_eq!(
            Matcher::compile(MatcherKind::IncludingHeaders, &FlatMap::new()),
            Some(Matcher::headers(FlatMap::new()))
        );
    }

    #[test]
    fn test_bad_regex_is_retained() {
        let matcher = Matcher::url_regex("([unclosed");
        match &matcher {
            Matcher::UrlRegex(p) => {
                assert!(p.regex().is_none());
                assert!(p.error().is_some());
            }
            other => panic!("unexpected matcher {other:?}"),
        }
        assert_eq!(matcher.to_options().get("regexPattern"), Some("([unclosed"));
    }

    #[test]
    fn test_to_options_round_trips_through_compile() {
        for matcher in [
            Matcher::host("a"),
            Matcher::url("http://a/"),
            Matcher::url_regex("^http"),
            Matcher::query("x"),
            Matcher::exact_body("b"),
            Matcher::body_including("c"),
            Matcher::exact_json(r#"{"a":"1"}"#),
            Matcher::json_including(r#"{"a":"1"}"#),
        ] {
            let options = matcher.to_options();
            assert_eq!(options.len(), 1);
            assert_eq!(Matcher::compile(matcher.kind(), &options), Some(matcher));
        }
    }

    #[test]
    fn test_body_kinds() {
        let body_kinds: Vec<_> = MatcherKind::ALL
            .iter()
            .filter(|k| k.needs_body())
            .collect();
        assert_eq!(body_kinds.len(), 4);
    }
}
