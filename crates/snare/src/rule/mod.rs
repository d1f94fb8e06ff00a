//! Rule model.
//!
//! A [`Rule`] combines a method filter, a matcher and an action. It is
//! immutable once built and never fails to construct: malformed input
//! produces a rule that reports itself invalid (and is skipped by the
//! engine) or whose matcher/action could not be resolved (and therefore
//! never fires).
//!
//! # Module Structure
//!
//! - `method` - request-method filter
//! - `matcher` - matcher kinds and compiled matchers
//! - `action` - action kinds, option payloads and resolved actions

mod action;
mod matcher;
mod method;

pub use action::{Action, ActionKind, ActionOptions, PayloadError};
pub use matcher::{JsonPattern, Matcher, MatcherKind, UrlPattern};
pub use method::MethodFilter;

use crate::compare::FlatMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interception phase a rule can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Request,
    Response,
    Tunnel,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
            Phase::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InvalidReason {
    #[error("matcher {matcher} requires option '{key}'")]
    MissingMatcherOption { matcher: MatcherKind, key: String },
    #[error("action {action} takes no options, found '{key}'")]
    UnexpectedActionOption { action: ActionKind, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PhaseFlags {
    request: bool,
    response: bool,
    tunnel: bool,
}

impl PhaseFlags {
    fn for_action(action: ActionKind) -> Self {
        let (request, response, tunnel) = match action {
            ActionKind::Pass
            | ActionKind::PauseRequestEdit
            | ActionKind::PauseResponseEdit
            | ActionKind::ForwardToHost => (true, false, false),
            ActionKind::ReturnFixedResponse | ActionKind::Timeout => (false, true, false),
            ActionKind::PauseBothEdit | ActionKind::AutoTransform | ActionKind::CloseConnection => {
                (true, true, false)
            }
            ActionKind::BlockConnectionToHost => (false, false, true),
        };
        Self {
            request,
            response,
            tunnel,
        }
    }
}

/// An immutable interception rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: Option<String>,
    method: MethodFilter,
    matcher_kind: MatcherKind,
    matcher_options: FlatMap,
    action_kind: ActionKind,
    action_options: ActionOptions,
    phases: PhaseFlags,
    validity: Result<(), InvalidReason>,
    matcher: Option<Matcher>,
    action: Result<Action, PayloadError>,
}

impl Rule {
    /// Build a rule from its authored parts.
    ///
    /// Validity is judged on the declared matcher and options. A
    /// `BlockConnectionToHost` rule whose matcher is not `ForHost` is then
    /// repaired to `ForUrl` with no options, which never matches.
    pub fn new(
        method: MethodFilter,
        matcher_kind: MatcherKind,
        matcher_options: FlatMap,
        action_kind: ActionKind,
        action_options: ActionOptions,
    ) -> Self {
        let validity = validate(matcher_kind, &matcher_options, action_kind, &action_options);

        let (matcher_kind, matcher_options) = if action_kind == ActionKind::BlockConnectionToHost
            && matcher_kind != MatcherKind::ForHost
        {
            (MatcherKind::ForUrl, FlatMap::new())
        } else {
            (matcher_kind, matcher_options)
        };

        let matcher = Matcher::compile(matcher_kind, &matcher_options);
        let action = Action::resolve(action_kind, &action_options);

        Self {
            name: None,
            method,
            matcher_kind,
            matcher_options,
            action_kind,
            action_options,
            phases: PhaseFlags::for_action(action_kind),
            validity,
            matcher,
            action,
        }
    }

    /// Build a rule from typed parts. Such rules are always valid.
    pub fn from_parts(method: MethodFilter, matcher: Matcher, action: Action) -> Self {
        Self::new(
            method,
            matcher.kind(),
            matcher.to_options(),
            action.kind(),
            action.to_options(),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn method(&self) -> MethodFilter {
        self.method
    }

    pub fn matcher_kind(&self) -> MatcherKind {
        self.matcher_kind
    }

    pub fn matcher_options(&self) -> &FlatMap {
        &self.matcher_options
    }

    pub fn action_kind(&self) -> ActionKind {
        self.action_kind
    }

    pub fn action_options(&self) -> &ActionOptions {
        &self.action_options
    }

    pub fn is_for_request(&self) -> bool {
        self.phases.request
    }

    pub fn is_for_response(&self) -> bool {
        self.phases.response
    }

    pub fn is_for_tunnel(&self) -> bool {
        self.phases.tunnel
    }

    pub fn applies_to(&self, phase: Phase) -> bool {
        match phase {
            Phase::Request => self.phases.request,
            Phase::Response => self.phases.response,
            Phase::Tunnel => self.phases.tunnel,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_ok()
    }

    pub fn invalid_reason(&self) -> Option<&InvalidReason> {
        self.validity.as_ref().err()
    }

    /// Compiled matcher, absent when the matcher option is missing.
    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    /// Resolved action, absent when its payload could not be decoded.
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref().ok()
    }

    pub fn payload_error(&self) -> Option<&PayloadError> {
        self.action.as_ref().err()
    }

    /// Short label for logs: the name if set, else `method matcher -> action`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {} -> {}", self.method, self.matcher_kind, self.action_kind),
        }
    }
}

fn validate(
    matcher_kind: MatcherKind,
    matcher_options: &FlatMap,
    action_kind: ActionKind,
    action_options: &ActionOptions,
) -> Result<(), InvalidReason> {
    if let Some(key) = matcher_kind.option_key() {
        if !matcher_options.contains_key(key) {
            return Err(InvalidReason::MissingMatcherOption {
                matcher: matcher_kind,
                key: key.to_string(),
            });
        }
    }

    if !action_kind.carries_payload() {
        if let Some(first) = action_options.first_key() {
            if first != action_kind.option_key() {
                return Err(InvalidReason::UnexpectedActionOption {
                    action: action_kind,
                    key: first.to_string(),
                });
            }
        }
    }

    Ok(())
}
