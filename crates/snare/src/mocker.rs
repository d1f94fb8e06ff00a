//! Action executor.
//!
//! [`Mocker::apply`] evaluates a rule's matcher against a live exchange and,
//! when it holds, performs the rule's action on the exchange in place.
//! Actions never fail: an action whose payload could not be resolved is a
//! logged no-op, and a URL override that does not parse is rolled back.

use crate::compare::replace_first;
use crate::exchange::{authority_host, Exchange, RequestHead, TunnelExchange};
use crate::matching;
use crate::metrics;
use crate::response::FixedResponse;
use crate::rule::{Action, Matcher, Phase, Rule};
use crate::transformer::{RequestPatch, ResponsePatch};
use async_trait::async_trait;
use hyper::header::{HeaderValue, HOST};
use hyper::Uri;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which side of an exchange a pause action hands to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Request,
    Response,
    Both,
}

/// Interactive editing capability a substrate may provide.
///
/// Called for the three pause actions. The engine itself never mutates
/// the exchange for them.
#[async_trait]
pub trait EditHook: Send + Sync {
    async fn pause(&self, target: EditTarget, phase: Phase, exchange: &mut dyn Exchange);
}

/// Result of applying one rule to one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The rule is invalid and was not evaluated.
    Skipped,
    NotMatched,
    Applied,
    /// The matcher held but the action payload was unresolved.
    Unresolved,
}

/// Applies matched rules to exchanges.
#[derive(Clone, Default)]
pub struct Mocker {
    edit_hook: Option<Arc<dyn EditHook>>,
}

impl Mocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edit_hook(mut self, hook: Arc<dyn EditHook>) -> Self {
        self.edit_hook = Some(hook);
        self
    }

    /// Evaluate `rule` against `exchange` and apply its action on a match.
    pub async fn apply(&self, rule: &Rule, exchange: &mut dyn Exchange, phase: Phase) -> Outcome {
        if !rule.is_valid() {
            return Outcome::Skipped;
        }
        let Some(matcher) = rule.matcher() else {
            return Outcome::NotMatched;
        };
        record_broken_matcher(matcher);

        if !matching::evaluate(matcher, exchange).await {
            debug!(rule = %rule.label(), %phase, "Rule did not match");
            return Outcome::NotMatched;
        }

        let Some(action) = rule.action() else {
            warn!(
                rule = %rule.label(),
                error = ?rule.payload_error(),
                "Rule matched but its action payload is unusable, skipping"
            );
            metrics::record_degraded("missing_payload");
            return Outcome::Unresolved;
        };

        info!(
            rule = %rule.label(),
            action = %rule.action_kind(),
            %phase,
            url = %exchange.request().url,
            "Applying rule"
        );
        self.execute(action, exchange, phase).await;
        metrics::record_applied(rule.action_kind().name(), phase.as_str());
        Outcome::Applied
    }

    /// Evaluate `rule` at CONNECT time. Only head-based matchers can hold
    /// here, and only `BlockConnectionToHost` has an effect.
    pub fn apply_tunnel(&self, rule: &Rule, tunnel: &mut dyn TunnelExchange) -> Outcome {
        if !rule.is_valid() {
            return Outcome::Skipped;
        }
        let Some(matcher) = rule.matcher() else {
            return Outcome::NotMatched;
        };
        if !matcher.matches(tunnel.request(), None) {
            return Outcome::NotMatched;
        }
        match rule.action() {
            Some(Action::BlockConnectionToHost) => {
                info!(rule = %rule.label(), host = %tunnel.request().host, "Blocking tunnel");
                tunnel.block();
                metrics::record_applied(rule.action_kind().name(), Phase::Tunnel.as_str());
                Outcome::Applied
            }
            Some(other) => {
                debug!(action = %other.kind(), "Action has no tunnel-phase effect");
                Outcome::Applied
            }
            None => Outcome::Unresolved,
        }
    }

    async fn execute(&self, action: &Action, exchange: &mut dyn Exchange, phase: Phase) {
        match action {
            Action::Pass => {}
            Action::PauseRequestEdit => self.pause(EditTarget::Request, phase, exchange).await,
            Action::PauseResponseEdit => self.pause(EditTarget::Response, phase, exchange).await,
            Action::PauseBothEdit => self.pause(EditTarget::Both, phase, exchange).await,
            Action::ReturnFixedResponse(response) => return_fixed_response(response, exchange),
            Action::ForwardToHost(host) => rewrite_host(exchange.request_mut(), host),
            Action::AutoTransform(transformer) => match phase {
                Phase::Request => transform_request(&transformer.request, exchange),
                Phase::Response => transform_response(&transformer.response, exchange),
                Phase::Tunnel => {}
            },
            Action::Timeout => {
                let response = exchange.response_mut();
                response.status = 408;
                response.headers.clear();
                exchange.set_response_body_text(String::new());
                exchange.respond();
            }
            Action::CloseConnection => exchange.terminate(),
            Action::BlockConnectionToHost => {
                debug!(%phase, "Tunnel block has no effect outside the tunnel phase");
            }
        }
    }

    async fn pause(&self, target: EditTarget, phase: Phase, exchange: &mut dyn Exchange) {
        match &self.edit_hook {
            Some(hook) => hook.pause(target, phase, exchange).await,
            None => debug!(?target, %phase, "No edit hook registered, pause is a no-op"),
        }
    }
}

fn record_broken_matcher(matcher: &Matcher) {
    match matcher {
        Matcher::UrlRegex(pattern) if pattern.regex().is_none() => {
            metrics::record_degraded("bad_regex");
        }
        Matcher::ExactJson(pattern) | Matcher::JsonIncluding(pattern)
            if pattern.parsed().is_none() =>
        {
            metrics::record_degraded("bad_json");
        }
        _ => {}
    }
}

fn return_fixed_response(response: &FixedResponse, exchange: &mut dyn Exchange) {
    let head = exchange.response_mut();
    // An empty header set leaves the live headers alone.
    if !response.header_map().is_empty() {
        head.replace_headers(response.header_map());
    }
    head.status = response.status_code();
    head.set_content_type(response.body_content_type());
    head.keep_body = response.keeps_body();
    head.version = response.version();
    exchange.set_response_body_text(response.body_string().to_string());
}

/// Swap the first textual occurrence of the current URI host in both URL
/// forms, then point the host field and `Host` header at `new_host`.
fn rewrite_host(request: &mut RequestHead, new_host: &str) {
    let original = request.uri.host().unwrap_or_default().to_string();
    if !original.is_empty() {
        request.url = replace_first(&request.url, &original, new_host);
        request.request_uri = replace_first(&request.request_uri, &original, new_host);
        if let Ok(uri) = request.url.parse::<Uri>() {
            request.uri = uri;
        }
    }
    request.host = new_host.to_string();
    request.set_host_header(new_host);
}

/// URL and host state captured before a transform, restored as a unit.
struct UrlSnapshot {
    url: String,
    request_uri: String,
    uri: Uri,
    host: String,
    host_header: Vec<HeaderValue>,
}

impl UrlSnapshot {
    fn capture(request: &RequestHead) -> Self {
        Self {
            url: request.url.clone(),
            request_uri: request.request_uri.clone(),
            uri: request.uri.clone(),
            host: request.host.clone(),
            host_header: request.headers.get_all(HOST).iter().cloned().collect(),
        }
    }

    fn restore(self, request: &mut RequestHead) {
        request.url = self.url;
        request.request_uri = self.request_uri;
        request.uri = self.uri;
        request.host = self.host;
        request.headers.remove(HOST);
        for value in self.host_header {
            request.headers.append(HOST, value);
        }
    }
}

fn parse_absolute(url: &str) -> Option<Uri> {
    let uri: Uri = url.parse().ok()?;
    (uri.scheme().is_some() && uri.authority().is_some()).then_some(uri)
}

fn transform_request(patch: &RequestPatch, exchange: &mut dyn Exchange) {
    let snapshot = UrlSnapshot::capture(exchange.request());

    let request = exchange.request_mut();
    if let Some(method) = &patch.method {
        request.method = method.clone();
    }
    if let Some(headers) = patch.headers.as_ref().filter(|h| !h.is_empty()) {
        request.replace_headers(headers);
    }
    if let Some(content_type) = patch.body_content_type {
        request.set_content_type(content_type);
    }

    if let Some(body) = &patch.body_string {
        exchange.set_request_body_text(body.clone());
    }

    let request = exchange.request_mut();
    if let Some(keep) = patch.keep_body {
        request.keep_body = keep;
    }
    if let Some(host) = &patch.host {
        rewrite_host(request, host);
    }
    if let Some(url) = &patch.url {
        match parse_absolute(url) {
            Some(uri) => {
                let host = authority_host(&uri).unwrap_or_default();
                request.set_host_header(&host);
                request.host = host;
                request.url = url.clone();
                request.request_uri = url.clone();
                request.uri = uri;
            }
            None => {
                warn!(url = %url, "Transformer URL is not an absolute URI, rolling back");
                metrics::record_degraded("url_rollback");
                snapshot.restore(request);
            }
        }
    }
    if let Some(version) = patch.http_version {
        request.version = version;
    }
}

fn transform_response(patch: &ResponsePatch, exchange: &mut dyn Exchange) {
    let response = exchange.response_mut();
    if let Some(status) = patch.status_code {
        response.status = status;
    }
    if let Some(headers) = patch.headers.as_ref().filter(|h| !h.is_empty()) {
        response.replace_headers(headers);
    }
    if let Some(content_type) = patch.body_content_type {
        response.set_content_type(content_type);
    }
    if let Some(keep) = patch.keep_body {
        response.keep_body = keep;
    }
    if let Some(version) = patch.http_version {
        response.version = version;
    }
    if let Some(body) = &patch.body_string {
        exchange.set_response_body_text(body.clone());
    }
}
