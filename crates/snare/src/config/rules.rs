//! Rule configuration as authored in YAML.

use crate::compare::FlatMap;
use crate::rule::{ActionKind, ActionOptions, MatcherKind, MethodFilter, Rule};
use serde::{Deserialize, Serialize};

/// One authored rule. Converted to an engine [`Rule`] without failing;
/// shape problems surface as an invalid rule instead.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub method: MethodFilter,
    pub matcher: MatcherKind,
    #[serde(default)]
    pub matcher_options: FlatMap,
    pub action: ActionKind,
    #[serde(default)]
    pub action_options: ActionOptions,
}

impl RuleSpec {
    pub fn to_rule(&self) -> Rule {
        let rule = Rule::new(
            self.method,
            self.matcher,
            self.matcher_options.clone(),
            self.action,
            self.action_options.clone(),
        );
        match &self.name {
            Some(name) => rule.with_name(name.clone()),
            None => rule,
        }
    }
}

impl From<&Rule> for RuleSpec {
    fn from(rule: &Rule) -> Self {
        Self {
            name: rule.name().map(str::to_string),
            method: rule.method(),
            matcher: rule.matcher_kind(),
            matcher_options: rule.matcher_options().clone(),
            action: rule.action_kind(),
            action_options: rule.action_options().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Action, Matcher};

    #[test]
    fn test_parse_rule_spec() {
        let yaml = r#"
name: mock-users
method: get
matcher: forUrlsMatchingRegex
matcherOptions:
  regexPattern: "https?://api\\.test/users.*"
action: returnFixedResponse
actionOptions:
  response:
    statusCode: 200
    bodyString: "[]"
    bodyContentType: application/json
"#;
        let spec: RuleSpec = serde_yaml::from_str(yaml).unwrap();
        let rule = spec.to_rule();
        assert!(rule.is_valid());
        assert_eq!(rule.name(), Some("mock-users"));
        assert_eq!(rule.method(), MethodFilter::Get);
        match rule.action() {
            Some(Action::ReturnFixedResponse(response)) => {
                assert_eq!(response.status_code(), 200);
                assert_eq!(response.body_string(), "[]");
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_method_defaults_to_any() {
        let spec: RuleSpec =
            serde_yaml::from_str("matcher: forHost\nmatcherOptions: {host: a}\naction: pass\n")
                .unwrap();
        assert_eq!(spec.method, MethodFilter::Any);
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        assert!(serde_yaml::from_str::<RuleSpec>("matcher: forPlanet\naction: pass\n").is_err());
    }

    #[test]
    fn test_spec_round_trip_from_rule() {
        let rule = Rule::from_parts(
            MethodFilter::Put,
            Matcher::json_including(r#"{"a":"1"}"#),
            Action::ForwardToHost("b.test".into()),
        );
        let spec = RuleSpec::from(&rule);
        let text = serde_yaml::to_string(&spec).unwrap();
        let back: RuleSpec = serde_yaml::from_str(&text).unwrap();
        let rebuilt = back.to_rule();
        assert_eq!(rebuilt.matcher(), rule.matcher());
        assert_eq!(rebuilt.action(), rule.action());
    }
}
