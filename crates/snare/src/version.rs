//! HTTP protocol version tokens.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Protocol version an exchange is reported or rewritten as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVersion {
    Http10,
    #[default]
    Http11,
    Http20,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "1.0",
            HttpVersion::Http11 => "1.1",
            HttpVersion::Http20 => "2.0",
        }
    }

    pub fn as_number(self) -> f64 {
        match self {
            HttpVersion::Http10 => 1.0,
            HttpVersion::Http11 => 1.1,
            HttpVersion::Http20 => 2.0,
        }
    }

    /// Strict lookup: only 1.0, 1.1 and 2.0 are recognised.
    pub fn from_number(value: f64) -> Option<HttpVersion> {
        if value == 1.0 {
            Some(HttpVersion::Http10)
        } else if value == 1.1 {
            Some(HttpVersion::Http11)
        } else if value == 2.0 {
            Some(HttpVersion::Http20)
        } else {
            None
        }
    }

    /// Strict lookup of a textual token such as `"1.1"` or `"HTTP/2.0"`.
    pub fn parse(value: &str) -> Option<HttpVersion> {
        let token = value.trim();
        let token = token
            .strip_prefix("HTTP/")
            .or_else(|| token.strip_prefix("http/"))
            .unwrap_or(token);
        match token {
            "2" => Some(HttpVersion::Http20),
            other => other.parse::<f64>().ok().and_then(HttpVersion::from_number),
        }
    }

    /// Lenient lookup: anything unrecognised becomes 1.1.
    pub fn normalize(value: f64) -> HttpVersion {
        HttpVersion::from_number(value).unwrap_or_default()
    }

    pub fn from_hyper(version: hyper::Version) -> HttpVersion {
        match version {
            hyper::Version::HTTP_09 | hyper::Version::HTTP_10 => HttpVersion::Http10,
            hyper::Version::HTTP_2 | hyper::Version::HTTP_3 => HttpVersion::Http20,
            _ => HttpVersion::Http11,
        }
    }

    pub fn to_hyper(self) -> hyper::Version {
        match self {
            HttpVersion::Http10 => hyper::Version::HTTP_10,
            HttpVersion::Http11 => hyper::Version::HTTP_11,
            HttpVersion::Http20 => hyper::Version::HTTP_2,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HttpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(f64),
    Text(String),
}

impl RawVersion {
    fn strict(&self) -> Option<HttpVersion> {
        match self {
            RawVersion::Number(n) => HttpVersion::from_number(*n),
            RawVersion::Text(s) => HttpVersion::parse(s),
        }
    }
}

/// Lenient: accepts a number or a string, unknown values become 1.1.
impl<'de> Deserialize<'de> for HttpVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawVersion::deserialize(deserializer)?;
        Ok(raw.strict().unwrap_or_default())
    }
}

/// Strict optional form for patch fields: unknown values become `None`.
pub(crate) fn deserialize_strict_opt<'de, D>(deserializer: D) -> Result<Option<HttpVersion>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawVersion>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| r.strict()))
}
