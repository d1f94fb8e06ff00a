//! Rule engine driver.
//!
//! The [`RuleEngine`] is handed exchanges by a substrate once per
//! interception phase. Each pass walks the rule list in order and applies
//! every valid rule whose phase, method filter and matcher hold. Earlier
//! rules' mutations are visible to later ones; a `CloseConnection` ends the
//! pass.
//!
//! The rule list is an `Arc` snapshot behind a read-mostly lock: mutation
//! swaps in a new snapshot, and a pass in flight keeps the one it started
//! with.

use crate::diagnostics::{self, DiagnosticsReport};
use crate::exchange::{Disposition, Exchange, TunnelExchange};
use crate::hooks::{AttachmentId, HookPoints, InterceptHandler};
use crate::metrics;
use crate::mocker::{EditHook, Mocker, Outcome};
use crate::rule::{Phase, Rule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Per-rule counters, kept across rule list mutations.
#[derive(Debug, Default)]
pub struct RuleStats {
    evaluations: AtomicU64,
    matches: AtomicU64,
    applications: AtomicU64,
    last_applied: Mutex<Option<DateTime<Utc>>>,
}

impl RuleStats {
    fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Applied => {
                self.matches.fetch_add(1, Ordering::Relaxed);
                self.applications.fetch_add(1, Ordering::Relaxed);
                *self.last_applied.lock() = Some(Utc::now());
            }
            Outcome::Unresolved => {
                self.matches.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::NotMatched | Outcome::Skipped => {}
        }
    }

    pub fn snapshot(&self) -> RuleStatsSnapshot {
        RuleStatsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            applications: self.applications.load(Ordering::Relaxed),
            last_applied: *self.last_applied.lock(),
        }
    }
}

/// Point-in-time copy of [`RuleStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatsSnapshot {
    pub evaluations: u64,
    pub matches: u64,
    pub applications: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RuleEntry {
    rule: Arc<Rule>,
    stats: Arc<RuleStats>,
}

impl RuleEntry {
    fn new(rule: Rule) -> Self {
        Self {
            rule: Arc::new(rule),
            stats: Arc::new(RuleStats::default()),
        }
    }
}

struct Attachment {
    points: Weak<dyn HookPoints>,
    id: AttachmentId,
}

/// What the hook points hold for an attached engine. Holding only a weak
/// reference lets the engine drop, and so detach, while still attached.
struct EngineHandle(Weak<RuleEngine>);

#[async_trait]
impl InterceptHandler for EngineHandle {
    async fn on_request(&self, exchange: &mut dyn Exchange) {
        if let Some(engine) = self.0.upgrade() {
            engine.on_request(exchange).await;
        }
    }

    async fn on_response(&self, exchange: &mut dyn Exchange) {
        if let Some(engine) = self.0.upgrade() {
            engine.on_response(exchange).await;
        }
    }

    async fn on_tunnel_connect(&self, tunnel: &mut dyn TunnelExchange) {
        if let Some(engine) = self.0.upgrade() {
            engine.on_tunnel_connect(tunnel);
        }
    }
}

/// Applies an ordered rule list to exchanges.
pub struct RuleEngine {
    rules: RwLock<Arc<[RuleEntry]>>,
    mocker: Mocker,
    attachment: Mutex<Option<Attachment>>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().map(RuleEntry::new).collect()),
            mocker: Mocker::new(),
            attachment: Mutex::new(None),
        }
    }

    /// Route pause actions to an interactive editor.
    pub fn with_edit_hook(mut self, hook: Arc<dyn EditHook>) -> Self {
        self.mocker = std::mem::take(&mut self.mocker).with_edit_hook(hook);
        self
    }

    // ===== Lifecycle =====

    /// Attach to a substrate's hook points, detaching from any previous
    /// ones first. The hook points do not keep the engine alive: dropping
    /// the last `Arc` detaches it.
    pub fn attach(self: &Arc<Self>, points: &Arc<dyn HookPoints>) -> AttachmentId {
        self.detach();
        let handler: Arc<dyn InterceptHandler> = Arc::new(EngineHandle(Arc::downgrade(self)));
        let id = points.attach(handler);
        *self.attachment.lock() = Some(Attachment {
            points: Arc::downgrade(points),
            id,
        });
        info!(rules = self.len(), "Rule engine attached");
        id
    }

    /// Detach from the current hook points. Returns false if not attached.
    pub fn detach(&self) -> bool {
        let Some(attachment) = self.attachment.lock().take() else {
            return false;
        };
        match attachment.points.upgrade() {
            Some(points) => {
                let removed = points.detach(attachment.id);
                info!("Rule engine detached");
                removed
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    // ===== Rule list =====

    fn snapshot(&self) -> Arc<[RuleEntry]> {
        self.rules.read().clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut Vec<RuleEntry>) -> R) -> R {
        let mut guard = self.rules.write();
        let mut entries = guard.to_vec();
        let result = f(&mut entries);
        *guard = entries.into();
        result
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        let count = rules.len();
        *self.rules.write() = rules.into_iter().map(RuleEntry::new).collect();
        info!(rules = count, "Rule list replaced");
    }

    pub fn push_rule(&self, rule: Rule) {
        self.update(|entries| entries.push(RuleEntry::new(rule)));
    }

    /// Insert at `index`. Returns false (and drops the rule) when `index`
    /// is past the end.
    pub fn insert_rule(&self, index: usize, rule: Rule) -> bool {
        self.update(|entries| {
            if index > entries.len() {
                return false;
            }
            entries.insert(index, RuleEntry::new(rule));
            true
        })
    }

    pub fn remove_rule(&self, index: usize) -> Option<Arc<Rule>> {
        self.update(|entries| (index < entries.len()).then(|| entries.remove(index).rule))
    }

    pub fn clear_rules(&self) {
        *self.rules.write() = Arc::from(Vec::new());
    }

    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.snapshot().iter().map(|e| e.rule.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn stats(&self, index: usize) -> Option<RuleStatsSnapshot> {
        self.snapshot().get(index).map(|e| e.stats.snapshot())
    }

    /// Report on every rule: validity, unresolved parts, and which rules
    /// have never fired.
    pub fn diagnostics(&self) -> DiagnosticsReport {
        let snapshot = self.snapshot();
        diagnostics::analyze(
            snapshot
                .iter()
                .map(|e| (e.rule.as_ref(), Some(e.stats.snapshot()))),
        )
    }

    // ===== Passes =====

    pub async fn on_request(&self, exchange: &mut dyn Exchange) -> Disposition {
        self.run_pass(exchange, Phase::Request).await
    }

    pub async fn on_response(&self, exchange: &mut dyn Exchange) -> Disposition {
        self.run_pass(exchange, Phase::Response).await
    }

    /// Returns true when the tunnel was blocked.
    pub fn on_tunnel_connect(&self, tunnel: &mut dyn TunnelExchange) -> bool {
        let rules = self.snapshot();
        for entry in rules.iter() {
            if tunnel.is_blocked() {
                break;
            }
            let rule = &entry.rule;
            if !rule.is_valid() {
                metrics::record_skipped("invalid");
                continue;
            }
            if !rule.is_for_tunnel() {
                continue;
            }
            entry.stats.record_evaluation();
            metrics::record_evaluation(Phase::Tunnel.as_str());
            let outcome = self.mocker.apply_tunnel(rule, tunnel);
            entry.stats.record_outcome(outcome);
        }
        let blocked = tunnel.is_blocked();
        metrics::record_exchange(
            Phase::Tunnel.as_str(),
            if blocked { "blocked" } else { "forward" },
        );
        blocked
    }

    async fn run_pass(&self, exchange: &mut dyn Exchange, phase: Phase) -> Disposition {
        let rules = self.snapshot();
        for (index, entry) in rules.iter().enumerate() {
            if exchange.disposition() == Disposition::Close {
                debug!(index, %phase, "Exchange closed, ending pass");
                break;
            }
            let rule = &entry.rule;
            if !rule.is_valid() {
                metrics::record_skipped("invalid");
                continue;
            }
            if !rule.applies_to(phase) {
                continue;
            }
            if !rule.method().matches(&exchange.request().method) {
                metrics::record_skipped("method");
                continue;
            }

            entry.stats.record_evaluation();
            metrics::record_evaluation(phase.as_str());
            let outcome = self.mocker.apply(rule, exchange, phase).await;
            entry.stats.record_outcome(outcome);
        }

        let disposition = exchange.disposition();
        metrics::record_exchange(phase.as_str(), disposition.as_str());
        disposition
    }
}

#[async_trait]
impl InterceptHandler for RuleEngine {
    async fn on_request(&self, exchange: &mut dyn Exchange) {
        RuleEngine::on_request(self, exchange).await;
    }

    async fn on_response(&self, exchange: &mut dyn Exchange) {
        RuleEngine::on_response(self, exchange).await;
    }

    async fn on_tunnel_connect(&self, tunnel: &mut dyn TunnelExchange) {
        RuleEngine::on_tunnel_connect(self, tunnel);
    }
}

impl Drop for RuleEngine {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::FlatMap;
    use crate::exchange::{MemoryExchange, MemoryTunnel, RequestHead};
    use crate::hooks::HookRegistry;
    use crate::response::FixedResponse;
    use crate::rule::{Action, ActionKind, ActionOptions, Matcher, MatcherKind, MethodFilter};
    use crate::transformer::{RequestPatch, ResponsePatch, Transformer};
    use hyper::Method;

    fn get(url: &str) -> MemoryExchange {
        MemoryExchange::new(RequestHead::new(Method::GET, url).unwrap())
    }

    fn host_rule(host: &str, action: Action) -> Rule {
        Rule::from_parts(MethodFilter::Any, Matcher::host(host), action)
    }

    #[tokio::test]
    async fn test_all_matching_rules_apply_in_order() {
        let engine = RuleEngine::new(vec![
            host_rule("a.com", Action::ForwardToHost("b.com".into())),
            host_rule("b.com", Action::ForwardToHost("c.com".into())),
        ]);
        let mut ex = get("http://a.com/x");
        engine.on_request(&mut ex).await;
        assert_eq!(ex.request().url, "http://c.com/x");
        assert_eq!(engine.stats(0).unwrap().applications, 1);
        assert_eq!(engine.stats(1).unwrap().applications, 1);
    }

    #[tokio::test]
    async fn test_method_filter() {
        let engine = RuleEngine::new(vec![Rule::from_parts(
            MethodFilter::Post,
            Matcher::host("a.com"),
            Action::CloseConnection,
        )]);
        let mut ex = get("http://a.com/");
        assert_eq!(engine.on_request(&mut ex).await, Disposition::Forward);
        assert_eq!(engine.stats(0).unwrap().evaluations, 0);
    }

    #[tokio::test]
    async fn test_invalid_rules_are_skipped() {
        let invalid = Rule::new(
            MethodFilter::Any,
            MatcherKind::ForHost,
            FlatMap::new(),
            ActionKind::CloseConnection,
            ActionOptions::new(),
        );
        let engine = RuleEngine::new(vec![invalid]);
        let mut ex = get("http://a.com/");
        assert_eq!(engine.on_request(&mut ex).await, Disposition::Forward);
    }

    #[tokio::test]
    async fn test_phase_filtering() {
        let engine = RuleEngine::new(vec![host_rule("a.com", Action::Timeout)]);
        let mut ex = get("http://a.com/");
        engine.on_request(&mut ex).await;
        assert_eq!(ex.response().status, 200);
        engine.on_response(&mut ex).await;
        assert_eq!(ex.response().status, 408);
    }

    #[tokio::test]
    async fn test_close_connection_ends_pass() {
        let engine = RuleEngine::new(vec![
            host_rule("a.com", Action::CloseConnection),
            host_rule("a.com", Action::ForwardToHost("b.com".into())),
        ]);
        let mut ex = get("http://a.com/");
        assert_eq!(engine.on_request(&mut ex).await, Disposition::Close);
        assert_eq!(ex.request().host, "a.com");
        assert_eq!(engine.stats(1).unwrap().evaluations, 0);
    }

    #[tokio::test]
    async fn test_later_rules_see_earlier_mutations() {
        let transformer = Transformer::new(
            RequestPatch::default().body(r#"{"user":"bob"}"#),
            ResponsePatch::default(),
        );
        let engine = RuleEngine::new(vec![
            host_rule("a.com", Action::AutoTransform(transformer)),
            Rule::from_parts(
                MethodFilter::Any,
                Matcher::json_including(r#"{"user":"bob"}"#),
                Action::CloseConnection,
            ),
        ]);
        let mut ex = get("http://a.com/").with_request_body("{}");
        assert_eq!(engine.on_request(&mut ex).await, Disposition::Close);
    }

    #[tokio::test]
    async fn test_rule_list_mutation() {
        let engine = RuleEngine::default();
        assert!(engine.is_empty());
        engine.push_rule(host_rule("a.com", Action::Pass));
        assert!(engine.insert_rule(0, host_rule("b.com", Action::Pass)));
        assert!(!engine.insert_rule(5, host_rule("c.com", Action::Pass)));
        assert_eq!(engine.len(), 2);
        assert_eq!(
            engine.rules()[0].matcher(),
            Some(&Matcher::host("b.com"))
        );

        let removed = engine.remove_rule(0).unwrap();
        assert_eq!(removed.matcher(), Some(&Matcher::host("b.com")));
        assert!(engine.remove_rule(3).is_none());

        engine.clear_rules();
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_stats_survive_mutation() {
        let engine = RuleEngine::new(vec![host_rule("a.com", Action::Pass)]);
        engine.on_request(&mut get("http://a.com/")).await;
        engine.push_rule(host_rule("b.com", Action::Pass));
        let stats = engine.stats(0).unwrap();
        assert_eq!(stats.applications, 1);
        assert!(stats.last_applied.is_some());
    }

    #[tokio::test]
    async fn test_attach_and_detach_through_registry() {
        let registry = Arc::new(HookRegistry::new());
        let points: Arc<dyn HookPoints> = registry.clone();
        let engine = Arc::new(RuleEngine::new(vec![host_rule(
            "a.com",
            Action::ReturnFixedResponse(FixedResponse::new(299)),
        )]));

        engine.attach(&points);
        assert!(engine.is_attached());
        assert_eq!(registry.len(), 1);

        let mut ex = get("http://a.com/");
        registry.dispatch_response(&mut ex).await;
        assert_eq!(ex.response().status, 299);

        assert!(engine.detach());
        assert!(registry.is_empty());
        assert!(!engine.detach());
    }

    #[tokio::test]
    async fn test_dropping_attached_engine_detaches() {
        let registry = Arc::new(HookRegistry::new());
        let points: Arc<dyn HookPoints> = registry.clone();
        let engine = Arc::new(RuleEngine::new(vec![host_rule(
            "a.com",
            Action::CloseConnection,
        )]));
        engine.attach(&points);
        assert_eq!(registry.len(), 1);

        drop(engine);
        assert!(registry.is_empty());
        let mut ex = get("http://a.com/");
        assert_eq!(registry.dispatch_request(&mut ex).await, Disposition::Forward);
    }

    #[test]
    fn test_tunnel_phase() {
        let engine = RuleEngine::new(vec![
            host_rule("a.com", Action::CloseConnection),
            host_rule("blocked.com:443", Action::BlockConnectionToHost),
        ]);
        let head = RequestHead::new(Method::CONNECT, "blocked.com:443").unwrap();
        assert!(engine.on_tunnel_connect(&mut MemoryTunnel::new(head)));

        let head = RequestHead::new(Method::CONNECT, "fine.com:443").unwrap();
        assert!(!engine.on_tunnel_connect(&mut MemoryTunnel::new(head)));
    }
}
