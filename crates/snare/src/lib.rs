//! Snare: a rule-based mocking and interception engine for HTTP(S)
//! debugging proxies.
//!
//! Rules pair an HTTP method filter with a matcher and an action. A
//! [`RuleEngine`] attaches to a substrate's [`hooks::HookPoints`] and, for
//! every intercepted exchange, applies each matching rule in order.

// ===== Rule model =====
pub mod compare;
pub mod content_type;
pub mod response;
pub mod rule;
pub mod transformer;
pub mod version;

// ===== Evaluation =====
pub mod engine;
pub mod exchange;
pub mod hooks;
pub mod matching;
pub mod mocker;

// ===== Tooling =====
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod interchange;
pub mod metrics;
pub mod proxy;

pub use engine::{RuleEngine, RuleStatsSnapshot};
pub use error::SnareError;
pub use exchange::{Disposition, Exchange, TunnelExchange};
pub use rule::{Action, ActionKind, Matcher, MatcherKind, MethodFilter, Phase, Rule};
