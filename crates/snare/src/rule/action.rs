//! Action kinds, their option payloads, and the resolved [`Action`].

use crate::response::FixedResponse;
use crate::transformer::Transformer;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::fmt;

/// Mutation kind applied once a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Pass,
    PauseRequestEdit,
    PauseResponseEdit,
    PauseBothEdit,
    ReturnFixedResponse,
    ForwardToHost,
    AutoTransform,
    Timeout,
    CloseConnection,
    BlockConnectionToHost,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Pass,
        ActionKind::PauseRequestEdit,
        ActionKind::PauseResponseEdit,
        ActionKind::PauseBothEdit,
        ActionKind::ReturnFixedResponse,
        ActionKind::ForwardToHost,
        ActionKind::AutoTransform,
        ActionKind::Timeout,
        ActionKind::CloseConnection,
        ActionKind::BlockConnectionToHost,
    ];

    /// Canonical option key; empty for actions without a payload.
    pub fn option_key(self) -> &'static str {
        match self {
            ActionKind::ReturnFixedResponse => "response",
            ActionKind::ForwardToHost => "host",
            ActionKind::AutoTransform => "transformer",
            _ => "",
        }
    }

    pub fn carries_payload(self) -> bool {
        !self.option_key().is_empty()
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Pass => "pass",
            ActionKind::PauseRequestEdit => "pauseRequestEdit",
            ActionKind::PauseResponseEdit => "pauseResponseEdit",
            ActionKind::PauseBothEdit => "pauseBothEdit",
            ActionKind::ReturnFixedResponse => "returnFixedResponse",
            ActionKind::ForwardToHost => "forwardToHost",
            ActionKind::AutoTransform => "autoTransform",
            ActionKind::Timeout => "timeout",
            ActionKind::CloseConnection => "closeConnection",
            ActionKind::BlockConnectionToHost => "blockConnectionToHost",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Authored action options: ordered key to opaque payload.
///
/// Payloads stay untyped until the rule resolves them against its action
/// kind, so a rule file with a mistyped payload still loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOptions {
    entries: Vec<(String, Value)>,
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response(response: FixedResponse) -> Self {
        Self::new().with("response", &response)
    }

    pub fn host(host: impl Into<String>) -> Self {
        Self::new().with("host", &host.into())
    }

    pub fn transformer(transformer: Transformer) -> Self {
        Self::new().with("transformer", &transformer)
    }

    /// Add an entry. Payloads that cannot be represented are skipped.
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, payload: &T) -> Self {
        if let Ok(value) = serde_yaml::to_value(payload) {
            self.insert_value(key.into(), value);
        }
        self
    }

    pub fn insert_value(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, PayloadError> {
        let value = self
            .get(key)
            .ok_or_else(|| PayloadError::Missing { key: key.to_string() })?;
        serde_yaml::from_value(value.clone()).map_err(|e| PayloadError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

impl Serialize for ActionOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct ActionOptionsVisitor;

impl<'de> Visitor<'de> for ActionOptionsVisitor {
    type Value = ActionOptions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of action option keys to payloads")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ActionOptions, A::Error> {
        let mut options = ActionOptions::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            options.insert_value(key, value);
        }
        Ok(options)
    }
}

impl<'de> Deserialize<'de> for ActionOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ActionOptionsVisitor)
    }
}

/// Why an action payload could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("missing '{key}' payload")]
    Missing { key: String },
    #[error("malformed '{key}' payload: {message}")]
    Malformed { key: String, message: String },
}

/// Resolved action: one variant per [`ActionKind`], payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Pass,
    PauseRequestEdit,
    PauseResponseEdit,
    PauseBothEdit,
    ReturnFixedResponse(FixedResponse),
    ForwardToHost(String),
    AutoTransform(Transformer),
    Timeout,
    CloseConnection,
    BlockConnectionToHost,
}

impl Action {
    /// Decode the payload an action kind needs from authored options.
    pub fn resolve(kind: ActionKind, options: &ActionOptions) -> Result<Action, PayloadError> {
        let key = kind.option_key();
        Ok(match kind {
            ActionKind::Pass => Action::Pass,
            ActionKind::PauseRequestEdit => Action::PauseRequestEdit,
            ActionKind::PauseResponseEdit => Action::PauseResponseEdit,
            ActionKind::PauseBothEdit => Action::PauseBothEdit,
            ActionKind::ReturnFixedResponse => Action::ReturnFixedResponse(options.decode(key)?),
            ActionKind::ForwardToHost => Action::ForwardToHost(options.decode(key)?),
            ActionKind::AutoTransform => Action::AutoTransform(options.decode(key)?),
            ActionKind::Timeout => Action::Timeout,
            ActionKind::CloseConnection => Action::CloseConnection,
            ActionKind::BlockConnectionToHost => Action::BlockConnectionToHost,
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Pass => ActionKind::Pass,
            Action::PauseRequestEdit => ActionKind::PauseRequestEdit,
            Action::PauseResponseEdit => ActionKind::PauseResponseEdit,
            Action::PauseBothEdit => ActionKind::PauseBothEdit,
            Action::ReturnFixedResponse(_) => ActionKind::ReturnFixedResponse,
            Action::ForwardToHost(_) => ActionKind::ForwardToHost,
            Action::AutoTransform(_) => ActionKind::AutoTransform,
            Action::Timeout => ActionKind::Timeout,
            Action::CloseConnection => ActionKind::CloseConnection,
            Action::BlockConnectionToHost => ActionKind::BlockConnectionToHost,
        }
    }

    pub fn to_options(&self) -> ActionOptions {
        match self {
            Action::ReturnFixedResponse(response) => ActionOptions::response(response.clone()),
            Action::ForwardToHost(host) => ActionOptions::host(host.clone()),
            Action::AutoTransform(transformer) => ActionOptions::transformer(transformer.clone()),
            _ => ActionOptions::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::RequestPatch;

    #[test]
    fn test_only_three_kinds_carry_payload() {
        let carrying: Vec<_> = ActionKind::ALL
            .into_iter()
            .filter(|k| k.carries_payload())
            .collect();
        assert_eq!(
            carrying,
            vec![
                ActionKind::ReturnFixedResponse,
                ActionKind::ForwardToHost,
                ActionKind::AutoTransform
            ]
        );
    }

    #[test]
    fn test_resolve_decodes_by_key() {
        let options = ActionOptions::host("new.example.com");
        assert_eq!(
            Action::resolve(ActionKind::ForwardToHost, &options),
            Ok(Action::ForwardToHost("new.example.com".into()))
        );
        assert_eq!(
            Action::resolve(ActionKind::ReturnFixedResponse, &options),
            Err(PayloadError::Missing {
                key: "response".into()
            })
        );
    }

    #[test]
    fn test_malformed_payload() {
        let options: ActionOptions = serde_yaml::from_str("host: [1, 2]").unwrap();
        assert!(matches!(
            Action::resolve(ActionKind::ForwardToHost, &options),
            Err(PayloadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_to_options_round_trip() {
        let transformer = Transformer::new(
            RequestPatch::default().url("http://b/").keep_body(true),
            Default::default(),
        );
        let action = Action::AutoTransform(transformer);
        assert_eq!(
            Action::resolve(ActionKind::AutoTransform, &action.to_options()),
            Ok(action)
        );
        let fixed = Action::ReturnFixedResponse(FixedResponse::new(418).header("X-T", "1"));
        assert_eq!(
            Action::resolve(ActionKind::ReturnFixedResponse, &fixed.to_options()),
            Ok(fixed)
        );
    }

    #[test]
    fn test_options_preserve_order() {
        let options: ActionOptions = serde_yaml::from_str("zeta: 1\nalpha: 2\n").unwrap();
        assert_eq!(options.first_key(), Some("zeta"));
        assert_eq!(options.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }
}
