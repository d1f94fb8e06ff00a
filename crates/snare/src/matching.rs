//! Matcher evaluation.
//!
//! Head-based predicates are synchronous. The four body predicates need
//! the request body, which [`evaluate`] fetches from the exchange only
//! when the matcher asks for it. No predicate panics or errors: malformed
//! input (bad regex, unparsable JSON, invalid header name) evaluates to
//! `false`.

use crate::compare::FlatMap;
use crate::exchange::{Exchange, RequestHead};
use crate::rule::{JsonPattern, Matcher};
use hyper::header::HeaderName;

impl Matcher {
    pub fn needs_body(&self) -> bool {
        self.kind().needs_body()
    }

    /// Evaluate against a request head and, for body matchers, its body.
    ///
    /// Body matchers given no body evaluate to `false`.
    pub fn matches(&self, head: &RequestHead, body: Option<&str>) -> bool {
        match self {
            Matcher::Host(host) => *host == head.host,
            Matcher::Url(url) => *url == head.url,
            Matcher::UrlRegex(pattern) => match pattern.regex() {
                Some(regex) => regex.find(&head.url).is_some_and(|m| m.as_str() == head.url),
                None => false,
            },
            Matcher::QueryString(expected) => {
                query_q_value(&head.url).is_some_and(|value| value == expected)
            }
            Matcher::Headers(expected) => headers_include(head, expected),
            Matcher::ExactBody(expected) => body.is_some_and(|b| b == expected),
            Matcher::BodyIncluding(part) => {
                !part.is_empty() && body.is_some_and(|b| b.contains(part.as_str()))
            }
            Matcher::ExactJson(pattern) => {
                json_compare(pattern, body, |rule, live| rule.positional_eq(live))
            }
            Matcher::JsonIncluding(pattern) => {
                json_compare(pattern, body, |rule, live| rule.is_subset_of(live))
            }
        }
    }
}

/// Evaluate a matcher against a live exchange, fetching the request body
/// only when needed. A body that cannot be read evaluates to `false`.
pub async fn evaluate(matcher: &Matcher, exchange: &mut dyn Exchange) -> bool {
    if !matcher.needs_body() {
        return matcher.matches(exchange.request(), None);
    }
    match exchange.request_body_text().await {
        Some(body) => matcher.matches(exchange.request(), Some(&body)),
        None => false,
    }
}

/// Value of the `q` parameter in a URL with exactly one `?`.
///
/// The query portion is split on the literal `q=`; the value is the
/// second segment up to the next `&`. Note `seq=1` also yields `1`.
pub fn query_q_value(url: &str) -> Option<&str> {
    let mut halves = url.split('?');
    let (_, query) = (halves.next()?, halves.next()?);
    if halves.next().is_some() {
        return None;
    }
    let mut parts = query.split("q=");
    parts.next()?;
    let value = parts.next()?;
    Some(value.split('&').next().unwrap_or(value))
}

fn headers_include(head: &RequestHead, expected: &FlatMap) -> bool {
    expected.iter().all(|(name, value)| {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return false;
        };
        head.headers
            .get(&name)
            .is_some_and(|live| live.as_bytes() == value.as_bytes())
    })
}

fn json_compare(
    pattern: &JsonPattern,
    body: Option<&str>,
    compare: impl Fn(&FlatMap, &FlatMap) -> bool,
) -> bool {
    let Some(rule_map) = pattern.parsed() else {
        return false;
    };
    let Some(live_map) = body.and_then(FlatMap::from_json_text) else {
        return false;
    };
    compare(rule_map, &live_map)
}
