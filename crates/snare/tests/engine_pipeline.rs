//! End-to-end rule passes over in-memory exchanges.

use hyper::Method;
use snare::compare::FlatMap;
use snare::config::RuleSet;
use snare::content_type::ContentType;
use snare::diagnostics::WarningType;
use snare::exchange::{Exchange, MemoryExchange, MemoryTunnel, RequestHead, ResponseHead};
use snare::hooks::{HookPoints, HookRegistry};
use snare::response::FixedResponse;
use snare::transformer::{RequestPatch, ResponsePatch, Transformer};
use snare::{Action, Disposition, Matcher, MethodFilter, Rule, RuleEngine};
use std::sync::Arc;

fn request(method: Method, url: &str) -> RequestHead {
    RequestHead::new(method, url).unwrap()
}

fn engine_from_yaml(yaml: &str) -> RuleEngine {
    RuleEngine::new(RuleSet::from_yaml(yaml).unwrap().build_rules())
}

#[test]
fn test_construction_is_deterministic() {
    let yaml = r#"
rules:
  - matcher: forHost
    matcherOptions: { host: a.test }
    action: pauseResponseEdit
  - matcher: forUrl
    matcherOptions: { regexPattern: nope }
    action: timeout
"#;
    let first = RuleSet::from_yaml(yaml).unwrap().build_rules();
    let second = RuleSet::from_yaml(yaml).unwrap().build_rules();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.is_valid(), b.is_valid());
        assert_eq!(a.is_for_request(), b.is_for_request());
        assert_eq!(a.is_for_response(), b.is_for_response());
        assert_eq!(a.is_for_tunnel(), b.is_for_tunnel());
    }
    assert!(first[0].is_for_request());
    assert!(!first[0].is_for_response());
    assert!(!first[1].is_valid());
}

#[tokio::test]
async fn test_host_matching_is_case_sensitive() {
    let engine = engine_from_yaml(
        r#"
rules:
  - matcher: forHost
    matcherOptions: { host: EXAMPLE.com }
    action: closeConnection
"#,
    );
    let mut exchange = MemoryExchange::new(request(Method::GET, "http://example.com/"));
    assert_eq!(engine.on_request(&mut exchange).await, Disposition::Forward);
    assert_eq!(engine.stats(0).unwrap().matches, 0);
}

#[tokio::test]
async fn test_regex_must_cover_whole_url() {
    let prefix = Rule::from_parts(
        MethodFilter::Any,
        Matcher::url_regex(r"https://a\.com"),
        Action::CloseConnection,
    );
    let whole = Rule::from_parts(
        MethodFilter::Any,
        Matcher::url_regex(r"https://a\.com/x"),
        Action::CloseConnection,
    );

    let engine = RuleEngine::new(vec![prefix]);
    let mut exchange = MemoryExchange::new(request(Method::GET, "https://a.com/x"));
    assert_eq!(engine.on_request(&mut exchange).await, Disposition::Forward);

    engine.set_rules(vec![whole]);
    let mut exchange = MemoryExchange::new(request(Method::GET, "https://a.com/x"));
    assert_eq!(engine.on_request(&mut exchange).await, Disposition::Close);
}

#[tokio::test]
async fn test_json_matchers_differ_on_order() {
    let engine = RuleEngine::new(vec![
        Rule::from_parts(
            MethodFilter::Post,
            Matcher::exact_json(r#"{"a":"1","b":"2"}"#),
            Action::AutoTransform(Transformer::new(
                RequestPatch::default().headers(FlatMap::from([("X-Exact", "1")])),
                ResponsePatch::default(),
            )),
        ),
        Rule::from_parts(
            MethodFilter::Post,
            Matcher::json_including(r#"{"a":"1"}"#),
            Action::AutoTransform(Transformer::new(
                RequestPatch::default().headers(FlatMap::from([("X-Subset", "1")])),
                ResponsePatch::default(),
            )),
        ),
    ]);

    let mut exchange = MemoryExchange::new(request(Method::POST, "http://a.com/"))
        .with_request_body(r#"{"b":"2","a":"1"}"#);
    engine.on_request(&mut exchange).await;

    assert_eq!(exchange.request().header_text("X-Subset"), Some("1"));
    assert_eq!(exchange.request().header_text("X-Exact"), None);
    assert_eq!(engine.stats(0).unwrap().matches, 0);
    assert_eq!(engine.stats(1).unwrap().applications, 1);
}

#[tokio::test]
async fn test_fixed_response_header_replacement() {
    let engine = engine_from_yaml(
        r#"
rules:
  - matcher: forHost
    matcherOptions: { host: keep.test }
    action: returnFixedResponse
    actionOptions:
      response:
        statusCode: 201
        bodyString: created
  - matcher: forHost
    matcherOptions: { host: swap.test }
    action: returnFixedResponse
    actionOptions:
      response:
        statusCode: 202
        headers: { X-Mock: "yes" }
        bodyString: accepted
        bodyContentType: application/json
"#,
    );
    let origin = || ResponseHead::new(200).header("X-Origin", "1");

    let mut kept = MemoryExchange::new(request(Method::GET, "http://keep.test/"))
        .with_response(origin(), "origin body");
    engine.on_response(&mut kept).await;
    assert_eq!(kept.response().status, 201);
    assert_eq!(kept.response().header_text("X-Origin"), Some("1"));
    assert_eq!(kept.response_body(), "created");

    let mut swapped = MemoryExchange::new(request(Method::GET, "http://swap.test/"))
        .with_response(origin(), "origin body");
    engine.on_response(&mut swapped).await;
    assert_eq!(swapped.response().status, 202);
    assert_eq!(swapped.response().header_text("X-Origin"), None);
    assert_eq!(swapped.response().header_text("X-Mock"), Some("yes"));
    assert_eq!(
        swapped.response().content_type(),
        Some(ContentType::ApplicationJson)
    );
}

#[tokio::test]
async fn test_bad_url_override_rolls_back() {
    let engine = RuleEngine::new(vec![Rule::from_parts(
        MethodFilter::Any,
        Matcher::host("a.com"),
        Action::AutoTransform(Transformer::new(
            RequestPatch::default().host("b.com").url("not a url"),
            ResponsePatch::default(),
        )),
    )]);
    let mut exchange = MemoryExchange::new(
        request(Method::GET, "http://a.com/path").header("Host", "a.com"),
    );
    engine.on_request(&mut exchange).await;

    let head = exchange.request();
    assert_eq!(head.url, "http://a.com/path");
    assert_eq!(head.request_uri, "http://a.com/path");
    assert_eq!(head.host, "a.com");
    assert_eq!(head.header_text("Host"), Some("a.com"));
}

#[tokio::test]
async fn test_forward_to_host_rewrites_first_occurrence() {
    let engine = engine_from_yaml(
        r#"
rules:
  - method: GET
    matcher: forHost
    matcherOptions: { host: old.com }
    action: forwardToHost
    actionOptions: { host: new.com }
"#,
    );
    let mut exchange = MemoryExchange::new(request(Method::GET, "http://old.com/old.com/path"));
    engine.on_request(&mut exchange).await;

    let head = exchange.request();
    assert_eq!(head.url, "http://new.com/old.com/path");
    assert_eq!(head.request_uri, "http://new.com/old.com/path");
    assert_eq!(head.host, "new.com");
    assert_eq!(head.header_text("Host"), Some("new.com"));
}

#[tokio::test]
async fn test_timeout_ignores_payload() {
    let engine = engine_from_yaml(
        r#"
rules:
  - matcher: forUrl
    matcherOptions: { url: "http://slow.test/" }
    action: timeout
"#,
    );
    let mut exchange = MemoryExchange::new(request(Method::GET, "http://slow.test/")).with_response(
        ResponseHead::new(200).header("X-Origin", "1"),
        "origin",
    );
    let disposition = engine.on_response(&mut exchange).await;

    assert_eq!(disposition, Disposition::Respond);
    assert_eq!(exchange.response().status, 408);
    assert!(exchange.response().headers.is_empty());
    assert_eq!(exchange.response_body(), "");
}

#[tokio::test]
async fn test_later_rules_observe_earlier_mutations() {
    let engine = RuleEngine::new(vec![
        Rule::from_parts(
            MethodFilter::Any,
            Matcher::host("a.com"),
            Action::ForwardToHost("b.com".into()),
        ),
        Rule::from_parts(
            MethodFilter::Any,
            Matcher::host("b.com"),
            Action::AutoTransform(Transformer::new(
                RequestPatch::default().body("rewritten"),
                ResponsePatch::default(),
            )),
        ),
    ]);
    let mut exchange =
        MemoryExchange::new(request(Method::POST, "http://a.com/x")).with_request_body("original");
    engine.on_request(&mut exchange).await;

    assert_eq!(exchange.request().host, "b.com");
    assert_eq!(exchange.request_body(), "rewritten");
    assert_eq!(engine.stats(0).unwrap().applications, 1);
    assert_eq!(engine.stats(1).unwrap().applications, 1);
}

#[tokio::test]
async fn test_attached_engine_blocks_tunnel() {
    let registry = Arc::new(HookRegistry::new());
    let points: Arc<dyn HookPoints> = registry.clone();
    let engine = Arc::new(engine_from_yaml(
        r#"
rules:
  - matcher: forHost
    matcherOptions: { host: "blocked.test:443" }
    action: blockConnectionToHost
"#,
    ));
    engine.attach(&points);

    let mut blocked = MemoryTunnel::new(request(Method::CONNECT, "blocked.test:443"));
    assert!(registry.dispatch_tunnel(&mut blocked).await);

    let mut allowed = MemoryTunnel::new(request(Method::CONNECT, "open.test:443"));
    assert!(!registry.dispatch_tunnel(&mut allowed).await);

    assert!(engine.detach());
    assert!(registry.is_empty());
}

#[test]
fn test_lint_reports_silent_failures() {
    let rules = RuleSet::from_yaml(
        r#"
rules:
  - matcher: forUrl
    matcherOptions: { host: wrong-key }
    action: pass
  - matcher: forUrlsMatchingRegex
    matcherOptions: { regexPattern: "(" }
    action: pass
  - matcher: forHost
    matcherOptions: { host: a.test }
    action: returnFixedResponse
"#,
    )
    .unwrap()
    .build_rules();
    let report = snare::diagnostics::analyze_rules(&rules);

    assert!(report.has_errors());
    assert_eq!(report.warnings_of(WarningType::InvalidRule).count(), 1);
    assert_eq!(report.warnings_of(WarningType::InvalidRegex).count(), 1);
    assert_eq!(
        report.warnings_of(WarningType::MissingActionPayload).count(),
        1
    );
}

#[test]
fn test_fixed_response_round_trips_through_yaml() {
    let response = FixedResponse::new(418)
        .header("X-Teapot", "1")
        .body("short and stout", ContentType::TextPlain);
    let rule = Rule::from_parts(
        MethodFilter::Get,
        Matcher::host("tea.test"),
        Action::ReturnFixedResponse(response.clone()),
    );
    assert!(rule.is_valid());
    assert_eq!(rule.action(), Some(&Action::ReturnFixedResponse(response)));
}
