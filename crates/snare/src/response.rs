//! Canned responses returned by `ReturnFixedResponse` rules.

use crate::compare::FlatMap;
use crate::content_type::ContentType;
use crate::version::HttpVersion;
use serde::{Deserialize, Deserializer, Serialize};

fn default_status() -> u16 {
    404
}

/// Unknown MIME strings fall back to `text/plain` instead of failing the
/// whole payload.
fn lenient_content_type<'de, D>(deserializer: D) -> Result<ContentType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(ContentType::from_mime_or_default(&raw))
}

/// A fixed response payload.
///
/// Defaults mirror an unconfigured mock: `404`, no headers, empty
/// `text/plain` body, HTTP/1.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedResponse {
    #[serde(default = "default_status")]
    status_code: u16,
    #[serde(default)]
    headers: FlatMap,
    #[serde(default)]
    body_string: String,
    #[serde(default, deserialize_with = "lenient_content_type")]
    body_content_type: ContentType,
    #[serde(default)]
    keep_body: bool,
    #[serde(default)]
    http_version: HttpVersion,
}

impl Default for FixedResponse {
    fn default() -> Self {
        Self {
            status_code: default_status(),
            headers: FlatMap::new(),
            body_string: String::new(),
            body_content_type: ContentType::TextPlain,
            keep_body: false,
            http_version: HttpVersion::Http11,
        }
    }
}

impl FixedResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: FlatMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<String>, content_type: ContentType) -> Self {
        self.body_string = body.into();
        self.body_content_type = content_type;
        self
    }

    pub fn keep_body(mut self, keep: bool) -> Self {
        self.keep_body = keep;
        self
    }

    /// Set the protocol version from a numeric token; unknown values
    /// normalise to 1.1.
    pub fn http_version(mut self, version: f64) -> Self {
        self.http_version = HttpVersion::normalize(version);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn header_map(&self) -> &FlatMap {
        &self.headers
    }

    pub fn body_string(&self) -> &str {
        &self.body_string
    }

    pub fn body_content_type(&self) -> ContentType {
        self.body_content_type
    }

    pub fn keeps_body(&self) -> bool {
        self.keep_body
    }

    pub fn version(&self) -> HttpVersion {
        self.http_version
    }

    pub fn has_body(&self) -> bool {
        !self.body_string.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let response: FixedResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response, FixedResponse::default());
        assert_eq!(response.status_code(), 404);
        assert!(!response.has_body());
        assert_eq!(response.version(), HttpVersion::Http11);
    }

    #[test]
    fn test_unknown_version_normalises() {
        let response = FixedResponse::new(200).http_version(1.7);
        assert_eq!(response.version(), HttpVersion::Http11);
        let response: FixedResponse = serde_yaml::from_str("httpVersion: 2.0").unwrap();
        assert_eq!(response.version(), HttpVersion::Http20);
    }

    #[test]
    fn test_unknown_content_type_falls_back() {
        let response: FixedResponse =
            serde_yaml::from_str("statusCode: 200\nbodyString: x\nbodyContentType: foo/bar\n")
                .unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body_content_type(), ContentType::TextPlain);
    }

    #[test]
    fn test_camel_case_fields() {
        let response: FixedResponse = serde_yaml::from_str(
            "statusCode: 201\nheaders: {X-A: b}\nbodyString: hi\nbodyContentType: application/json\nkeepBody: true\n",
        )
        .unwrap();
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.header_map().get("X-A"), Some("b"));
        assert_eq!(response.body_content_type(), ContentType::ApplicationJson);
        assert!(response.keeps_body());
        assert!(response.has_body());
    }
}
