//! Rule diagnostics.
//!
//! The engine never rejects or reports a bad rule at runtime: invalid
//! rules are skipped and broken matchers evaluate to false. This module
//! surfaces those silent failures so an operator can see which rules will
//! never fire, and why:
//!
//! - Invalid rules (missing matcher option, stray action option)
//! - Matchers that cannot be compiled (bad regex, rule-side JSON)
//! - Actions whose payload could not be decoded
//! - Rules that can never see an exchange because an earlier rule closes it
//! - Rules that have not fired yet (when runtime statistics are available)

use crate::engine::RuleStatsSnapshot;
use crate::rule::{ActionKind, InvalidReason, Matcher, MethodFilter, Phase, Rule};
use serde::Serialize;

/// A single finding about one rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleWarning {
    pub warning_type: WarningType,
    pub message: String,
    pub rule_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    /// Index of the rule responsible (for shadowing warnings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_index: Option<usize>,
}

/// Types of findings
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    /// Rule is invalid and is always skipped
    InvalidRule,
    /// Matcher could not be built from the options
    UnresolvedMatcher,
    /// URL regex does not compile
    InvalidRegex,
    /// Rule-side JSON is not a flat string object
    InvalidJsonPattern,
    /// Action payload missing or malformed
    MissingActionPayload,
    /// An earlier CloseConnection rule ends every pass this rule could join
    ShadowedByTerminal,
    /// PauseResponseEdit runs during the request phase
    RequestPhaseResponseEdit,
    /// Rule has been evaluated but never applied, or never evaluated
    NeverFired,
}

impl WarningType {
    /// Findings that mean the rule can never do anything.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            WarningType::InvalidRule
                | WarningType::UnresolvedMatcher
                | WarningType::InvalidRegex
                | WarningType::InvalidJsonPattern
                | WarningType::MissingActionPayload
        )
    }
}

/// Per-rule summary line.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    pub index: usize,
    pub label: String,
    pub method: MethodFilter,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,
    pub phases: Vec<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RuleStatsSnapshot>,
}

/// Result of a diagnostics run.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub rules: Vec<RuleReport>,
    pub warnings: Vec<RuleWarning>,
}

impl DiagnosticsReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.warnings.iter().any(|w| w.warning_type.is_error())
    }

    pub fn warnings_of(&self, warning_type: WarningType) -> impl Iterator<Item = &RuleWarning> {
        self.warnings
            .iter()
            .filter(move |w| w.warning_type == warning_type)
    }

    fn warn(&mut self, rule: &Rule, index: usize, warning_type: WarningType, message: String) {
        self.warnings.push(RuleWarning {
            warning_type,
            message,
            rule_index: index,
            rule_name: rule.name().map(str::to_string),
            related_index: None,
        });
    }
}

/// Static analysis of a rule list, without runtime statistics.
pub fn analyze_rules<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> DiagnosticsReport {
    analyze(rules.into_iter().map(|rule| (rule, None)))
}

pub(crate) fn analyze<'a>(
    rules: impl IntoIterator<Item = (&'a Rule, Option<RuleStatsSnapshot>)>,
) -> DiagnosticsReport {
    let rules: Vec<_> = rules.into_iter().collect();
    let mut report = DiagnosticsReport::default();

    for (index, (rule, stats)) in rules.iter().enumerate() {
        report.rules.push(RuleReport {
            index,
            label: rule.label(),
            method: rule.method(),
            valid: rule.is_valid(),
            invalid_reason: rule.invalid_reason().cloned(),
            phases: phases_of(rule),
            stats: *stats,
        });

        if let Some(reason) = rule.invalid_reason() {
            report.warn(
                rule,
                index,
                WarningType::InvalidRule,
                format!("Rule at index {index} is invalid and will be skipped: {reason}"),
            );
            continue;
        }

        check_matcher(&mut report, rule, index);

        if let Some(error) = rule.payload_error() {
            report.warn(
                rule,
                index,
                WarningType::MissingActionPayload,
                format!("Rule at index {index} matches but does nothing: {error}"),
            );
        }

        if rule.action_kind() == ActionKind::PauseResponseEdit {
            report.warn(
                rule,
                index,
                WarningType::RequestPhaseResponseEdit,
                format!(
                    "Rule at index {index} pauses for response editing but runs in the request phase"
                ),
            );
        }

        if let Some(closer) = find_shadowing_closer(&rules, index) {
            report.warnings.push(RuleWarning {
                warning_type: WarningType::ShadowedByTerminal,
                message: format!(
                    "Rule at index {index} is shadowed by CloseConnection rule at index {closer}"
                ),
                rule_index: index,
                rule_name: rule.name().map(str::to_string),
                related_index: Some(closer),
            });
        }

        if let Some(stats) = stats {
            if stats.applications == 0 {
                let message = if stats.evaluations == 0 {
                    format!(
                        "Rule at index {index} has never been evaluated: no exchange reached it in its phase with a matching method"
                    )
                } else if stats.matches > 0 {
                    format!(
                        "Rule at index {index} matched {} time(s) but its action never ran",
                        stats.matches
                    )
                } else {
                    format!(
                        "Rule at index {index} was evaluated {} time(s) but its matcher never held",
                        stats.evaluations
                    )
                };
                report.warn(rule, index, WarningType::NeverFired, message);
            }
        }
    }

    report
}

fn phases_of(rule: &Rule) -> Vec<Phase> {
    [Phase::Request, Phase::Response, Phase::Tunnel]
        .into_iter()
        .filter(|p| rule.applies_to(*p))
        .collect()
}

fn check_matcher(report: &mut DiagnosticsReport, rule: &Rule, index: usize) {
    match rule.matcher() {
        None => report.warn(
            rule,
            index,
            WarningType::UnresolvedMatcher,
            format!(
                "Rule at index {index} has no usable {} matcher and never matches",
                rule.matcher_kind()
            ),
        ),
        Some(Matcher::UrlRegex(pattern)) => {
            if let Some(error) = pattern.error() {
                report.warn(
                    rule,
                    index,
                    WarningType::InvalidRegex,
                    format!(
                        "Rule at index {index} has regex '{}' that does not compile: {error}",
                        pattern.source()
                    ),
                );
            }
        }
        Some(Matcher::ExactJson(pattern)) | Some(Matcher::JsonIncluding(pattern)) => {
            if pattern.parsed().is_none() {
                report.warn(
                    rule,
                    index,
                    WarningType::InvalidJsonPattern,
                    format!(
                        "Rule at index {index} has JSON body '{}' that is not a flat string object",
                        pattern.source()
                    ),
                );
            }
        }
        Some(_) => {}
    }
}

/// An earlier valid CloseConnection rule shadows `index` when it runs in
/// every phase the later rule runs in, accepts at least the same methods,
/// and matches at least the same exchanges (identical matcher, or a
/// header matcher with no headers).
fn find_shadowing_closer(rules: &[(&Rule, Option<RuleStatsSnapshot>)], index: usize) -> Option<usize> {
    let (later, _) = rules[index];
    if later.is_for_tunnel() {
        return None;
    }
    rules[..index].iter().position(|(earlier, _)| {
        earlier.is_valid()
            && earlier.action().is_some()
            && earlier.action_kind() == ActionKind::CloseConnection
            && (earlier.method() == MethodFilter::Any || earlier.method() == later.method())
            && (!later.is_for_request() || earlier.is_for_request())
            && (!later.is_for_response() || earlier.is_for_response())
            && match (earlier.matcher(), later.matcher()) {
                (Some(Matcher::Headers(h)), _) if h.is_empty() => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::FlatMap;
    use crate::rule::{Action, ActionOptions, MatcherKind};

    fn rule(matcher: Matcher, action: Action) -> Rule {
        Rule::from_parts(MethodFilter::Any, matcher, action)
    }

    #[test]
    fn test_clean_rules_have_no_warnings() {
        let rules = vec![
            rule(Matcher::host("a.com"), Action::Pass),
            rule(Matcher::url_regex("^https://.*$"), Action::Timeout),
        ];
        let report = analyze_rules(&rules);
        assert!(!report.has_warnings());
        assert_eq!(report.rules.len(), 2);
        assert_eq!(report.rules[1].phases, vec![Phase::Response]);
    }

    #[test]
    fn test_invalid_rule_reported() {
        let rules = vec![Rule::new(
            MethodFilter::Get,
            MatcherKind::ExactBody,
            FlatMap::from([("partBody", "x")]),
            ActionKind::Pass,
            ActionOptions::new(),
        )
        .with_name("typo")];
        let report = analyze_rules(&rules);
        assert!(report.has_errors());
        let warning = report.warnings_of(WarningType::InvalidRule).next().unwrap();
        assert_eq!(warning.rule_name.as_deref(), Some("typo"));
        assert!(warning.message.contains("exactBody"));
        assert!(!report.rules[0].valid);
    }

    #[test]
    fn test_broken_matchers_reported() {
        let rules = vec![
            rule(Matcher::url_regex("(["), Action::Pass),
            rule(Matcher::json_including("[1,2]"), Action::Pass),
        ];
        let report = analyze_rules(&rules);
        assert_eq!(report.warnings_of(WarningType::InvalidRegex).count(), 1);
        assert_eq!(report.warnings_of(WarningType::InvalidJsonPattern).count(), 1);
    }

    #[test]
    fn test_missing_payload_reported() {
        let rules = vec![Rule::new(
            MethodFilter::Any,
            MatcherKind::ForHost,
            FlatMap::from([("host", "a")]),
            ActionKind::AutoTransform,
            ActionOptions::new(),
        )];
        let report = analyze_rules(&rules);
        assert_eq!(report.warnings_of(WarningType::MissingActionPayload).count(), 1);
    }

    #[test]
    fn test_block_connection_repair_reported() {
        let rules = vec![Rule::new(
            MethodFilter::Any,
            MatcherKind::ForUrl,
            FlatMap::from([("url", "https://a.com/")]),
            ActionKind::BlockConnectionToHost,
            ActionOptions::new(),
        )];
        let report = analyze_rules(&rules);
        assert_eq!(report.warnings_of(WarningType::UnresolvedMatcher).count(), 1);
    }

    #[test]
    fn test_shadowed_by_close() {
        let rules = vec![
            rule(Matcher::headers(FlatMap::new()), Action::CloseConnection),
            rule(Matcher::host("a.com"), Action::ForwardToHost("b.com".into())),
        ];
        let report = analyze_rules(&rules);
        let warning = report
            .warnings_of(WarningType::ShadowedByTerminal)
            .next()
            .unwrap();
        assert_eq!(warning.rule_index, 1);
        assert_eq!(warning.related_index, Some(0));
    }

    #[test]
    fn test_method_specific_close_does_not_shadow_any() {
        let rules = vec![
            Rule::from_parts(MethodFilter::Post, Matcher::host("a.com"), Action::CloseConnection),
            rule(Matcher::host("a.com"), Action::Pass),
        ];
        let report = analyze_rules(&rules);
        assert_eq!(report.warnings_of(WarningType::ShadowedByTerminal).count(), 0);
    }

    #[test]
    fn test_pause_response_edit_note() {
        let rules = vec![rule(Matcher::host("a"), Action::PauseResponseEdit)];
        let report = analyze_rules(&rules);
        assert_eq!(
            report.warnings_of(WarningType::RequestPhaseResponseEdit).count(),
            1
        );
        assert!(!report.has_errors());
    }

    #[test]
    fn test_never_fired_uses_stats() {
        let r = rule(Matcher::host("a"), Action::Pass);
        let stats = RuleStatsSnapshot {
            evaluations: 3,
            ..Default::default()
        };
        let report = analyze([(&r, Some(stats))]);
        let warning = report.warnings_of(WarningType::NeverFired).next().unwrap();
        assert!(warning.message.contains("3 time(s)"));

        let fired = RuleStatsSnapshot {
            evaluations: 1,
            matches: 1,
            applications: 1,
            last_applied: None,
        };
        assert!(!analyze([(&r, Some(fired))]).has_warnings());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let rules = vec![rule(Matcher::url_regex("(["), Action::Pass)];
        let json = serde_json::to_value(analyze_rules(&rules)).unwrap();
        assert_eq!(json["warnings"][0]["warningType"], "invalid_regex");
        assert_eq!(json["rules"][0]["method"], "ANY");
    }
}
