//! Canonical request/response shapes for exporters.
//!
//! [`RequestShape`] and [`ResponseShape`] are the substrate-independent view
//! of an exchange that an exporter serializes. The flat [`RequestRecord`] /
//! [`ResponseRecord`] forms fix the field order exporters write:
//! `http_version`, `http_method` or `status_code`, `url` (requests only),
//! `headers` as an embedded JSON string, `has_body`, `body_type` as a MIME
//! string, `body_string`, `keep_body`.
//!
//! Reading and writing files is left to the exporter.

use crate::compare::FlatMap;
use crate::content_type::ContentType;
use crate::error::{Result, SnareError};
use crate::exchange::{header_pairs, Exchange};
use crate::response::FixedResponse;
use crate::version::HttpVersion;
use hyper::Method;
use serde::{Deserialize, Serialize};

/// Request side of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestShape {
    pub method: String,
    pub url: String,
    pub headers: FlatMap,
    pub body: String,
    pub content_type: ContentType,
    pub keep_body: bool,
    pub http_version: HttpVersion,
}

/// Response side of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseShape {
    pub status_code: u16,
    pub headers: FlatMap,
    pub body: String,
    pub content_type: ContentType,
    pub keep_body: bool,
    pub http_version: HttpVersion,
}

/// Flat request layout with a fixed field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub http_version: f64,
    pub http_method: String,
    pub url: String,
    pub headers: String,
    pub has_body: bool,
    pub body_type: String,
    pub body_string: String,
    pub keep_body: bool,
}

/// Flat response layout with a fixed field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub http_version: f64,
    pub status_code: u16,
    pub headers: String,
    pub has_body: bool,
    pub body_type: String,
    pub body_string: String,
    pub keep_body: bool,
}

fn headers_to_json(headers: &FlatMap) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

fn headers_from_json(text: &str) -> Result<FlatMap> {
    FlatMap::from_json_text_repeated(text)
        .ok_or_else(|| SnareError::Interchange(format!("headers are not a flat JSON object: {text}")))
}

impl RequestShape {
    /// Capture the current request side of a live exchange.
    pub async fn capture(exchange: &mut dyn Exchange) -> Self {
        let body = exchange.request_body_text().await.unwrap_or_default();
        let head = exchange.request();
        Self {
            method: head.method.to_string(),
            url: head.url.clone(),
            headers: header_pairs(&head.headers),
            body,
            content_type: head.content_type().unwrap_or_default(),
            keep_body: head.keep_body,
            http_version: head.version,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn to_record(&self) -> RequestRecord {
        RequestRecord {
            http_version: self.http_version.as_number(),
            http_method: self.method.clone(),
            url: self.url.clone(),
            headers: headers_to_json(&self.headers),
            has_body: self.has_body(),
            body_type: self.content_type.mime().to_string(),
            body_string: self.body.clone(),
            keep_body: self.keep_body,
        }
    }

    /// Rebuild from a record. Unknown versions become 1.1 and unknown body
    /// types `text/plain`; a bad method or header blob is an error.
    pub fn from_record(record: RequestRecord) -> Result<Self> {
        let method = Method::from_bytes(record.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                SnareError::Interchange(format!("invalid method '{}'", record.http_method))
            })?;
        Ok(Self {
            method: method.to_string(),
            url: record.url,
            headers: headers_from_json(&record.headers)?,
            body: record.body_string,
            content_type: ContentType::from_mime_or_default(&record.body_type),
            keep_body: record.keep_body,
            http_version: HttpVersion::normalize(record.http_version),
        })
    }
}

impl ResponseShape {
    /// Capture the current response side of a live exchange.
    pub async fn capture(exchange: &mut dyn Exchange) -> Self {
        let body = exchange.response_body_text().await.unwrap_or_default();
        let head = exchange.response();
        Self {
            status_code: head.status,
            headers: header_pairs(&head.headers),
            body,
            content_type: head.content_type().unwrap_or_default(),
            keep_body: head.keep_body,
            http_version: head.version,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn to_record(&self) -> ResponseRecord {
        ResponseRecord {
            http_version: self.http_version.as_number(),
            status_code: self.status_code,
            headers: headers_to_json(&self.headers),
            has_body: self.has_body(),
            body_type: self.content_type.mime().to_string(),
            body_string: self.body.clone(),
            keep_body: self.keep_body,
        }
    }

    pub fn from_record(record: ResponseRecord) -> Result<Self> {
        Ok(Self {
            status_code: record.status_code,
            headers: headers_from_json(&record.headers)?,
            body: record.body_string,
            content_type: ContentType::from_mime_or_default(&record.body_type),
            keep_body: record.keep_body,
            http_version: HttpVersion::normalize(record.http_version),
        })
    }

    /// Turn a captured response into a canned one, e.g. to mock it later.
    pub fn to_fixed_response(&self) -> FixedResponse {
        FixedResponse::new(self.status_code)
            .headers(self.headers.clone())
            .body(self.body.clone(), self.content_type)
            .keep_body(self.keep_body)
            .http_version(self.http_version.as_number())
    }
}

impl From<&FixedResponse> for ResponseShape {
    fn from(response: &FixedResponse) -> Self {
        Self {
            status_code: response.status_code(),
            headers: response.header_map().clone(),
            body: response.body_string().to_string(),
            content_type: response.body_content_type(),
            keep_body: response.keeps_body(),
            http_version: response.version(),
        }
    }
}
