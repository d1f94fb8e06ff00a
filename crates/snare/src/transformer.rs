//! Field-level overrides consumed by `AutoTransform` rules.
//!
//! Every field is optional: `None` leaves the exchange untouched, `Some`
//! overwrites. Request and response sides are applied in their own phase.

use crate::compare::FlatMap;
use crate::content_type::ContentType;
use crate::version::{self, HttpVersion};
use hyper::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Overrides for the request side of an exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestPatch {
    #[serde(with = "method_opt", skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<FlatMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_string: Option<String>,
    #[serde(
        deserialize_with = "lenient_content_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub body_content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_body: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        deserialize_with = "version::deserialize_strict_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_version: Option<HttpVersion>,
}

/// Overrides for the response side of an exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponsePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<FlatMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_string: Option<String>,
    #[serde(
        deserialize_with = "lenient_content_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub body_content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_body: Option<bool>,
    #[serde(
        deserialize_with = "version::deserialize_strict_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_version: Option<HttpVersion>,
}

/// Paired request and response overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transformer {
    pub request: RequestPatch,
    pub response: ResponsePatch,
}

impl Transformer {
    pub fn new(request: RequestPatch, response: ResponsePatch) -> Self {
        Self { request, response }
    }

    pub fn is_empty(&self) -> bool {
        self.request == RequestPatch::default() && self.response == ResponsePatch::default()
    }
}

impl RequestPatch {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn headers(mut self, headers: FlatMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body_string = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.body_content_type = Some(content_type);
        self
    }

    pub fn keep_body(mut self, keep: bool) -> Self {
        self.keep_body = Some(keep);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Unknown version numbers leave the field unset.
    pub fn http_version(mut self, version: f64) -> Self {
        self.http_version = HttpVersion::from_number(version);
        self
    }
}

impl ResponsePatch {
    pub fn status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn headers(mut self, headers: FlatMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body_string = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.body_content_type = Some(content_type);
        self
    }

    pub fn keep_body(mut self, keep: bool) -> Self {
        self.keep_body = Some(keep);
        self
    }

    /// Unknown version numbers leave the field unset.
    pub fn http_version(mut self, version: f64) -> Self {
        self.http_version = HttpVersion::from_number(version);
        self
    }
}

fn lenient_content_type<'de, D>(deserializer: D) -> Result<Option<ContentType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(ContentType::from_mime))
}

mod method_opt {
    use super::*;

    pub fn serialize<S: Serializer>(method: &Option<Method>, s: S) -> Result<S::Ok, S::Error> {
        match method {
            Some(m) => s.serialize_str(m.as_str()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Method>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| serde::de::Error::custom(format!("invalid HTTP method '{m}'")))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_stay_none() {
        let transformer: Transformer = serde_yaml::from_str("request: {bodyString: x}").unwrap();
        assert_eq!(transformer.request.body_string.as_deref(), Some("x"));
        assert!(transformer.request.method.is_none());
        assert!(transformer.request.url.is_none());
        assert_eq!(transformer.response, ResponsePatch::default());
    }

    #[test]
    fn test_unknown_version_and_content_type_become_none() {
        let transformer: Transformer = serde_yaml::from_str(
            "response: {httpVersion: 1.4, bodyContentType: foo/bar, statusCode: 201}",
        )
        .unwrap();
        assert_eq!(transformer.response.http_version, None);
        assert_eq!(transformer.response.body_content_type, None);
        assert_eq!(transformer.response.status_code, Some(201));
    }

    #[test]
    fn test_method_parses_case_insensitively() {
        let transformer: Transformer = serde_yaml::from_str("request: {method: put}").unwrap();
        assert_eq!(transformer.request.method, Some(Method::PUT));
    }

    #[test]
    fn test_builder_version_is_strict() {
        assert_eq!(RequestPatch::default().http_version(3.0).http_version, None);
        assert_eq!(
            ResponsePatch::default().http_version(2.0).http_version,
            Some(HttpVersion::Http20)
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(Transformer::default().is_empty());
        let t = Transformer::new(RequestPatch::default().keep_body(true), ResponsePatch::default());
        assert!(!t.is_empty());
    }
}
