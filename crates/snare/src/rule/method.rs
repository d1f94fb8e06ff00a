use hyper::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Request-method filter of a rule. `Any` accepts every method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodFilter {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    #[default]
    Any,
}

impl MethodFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodFilter::Get => "GET",
            MethodFilter::Post => "POST",
            MethodFilter::Put => "PUT",
            MethodFilter::Patch => "PATCH",
            MethodFilter::Delete => "DELETE",
            MethodFilter::Head => "HEAD",
            MethodFilter::Options => "OPTIONS",
            MethodFilter::Trace => "TRACE",
            MethodFilter::Any => "ANY",
        }
    }

    pub fn parse(value: &str) -> Option<MethodFilter> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(MethodFilter::Get),
            "POST" => Some(MethodFilter::Post),
            "PUT" => Some(MethodFilter::Put),
            "PATCH" => Some(MethodFilter::Patch),
            "DELETE" => Some(MethodFilter::Delete),
            "HEAD" => Some(MethodFilter::Head),
            "OPTIONS" => Some(MethodFilter::Options),
            "TRACE" => Some(MethodFilter::Trace),
            "ANY" | "*" => Some(MethodFilter::Any),
            _ => None,
        }
    }

    /// Case-insensitive comparison against the live request method.
    pub fn matches(self, method: &Method) -> bool {
        self == MethodFilter::Any || method.as_str().eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MethodFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MethodFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MethodFilter::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown method filter '{raw}'")))
    }
}
