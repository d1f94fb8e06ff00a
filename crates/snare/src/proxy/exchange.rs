//! hyper-backed exchanges.
//!
//! Bodies stay streaming until a matcher or action asks for their text;
//! the first fetch buffers them and later fetches reuse the buffer.

use super::response_ext::{empty_body, full_body, ProxyBody};
use crate::error::{Result, SnareError};
use crate::exchange::{Disposition, Exchange, RequestHead, ResponseHead, TunnelExchange};
use crate::version::HttpVersion;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::{HeaderMap, Request, Response, StatusCode, Uri, Version};
use tracing::warn;

enum BodyState {
    Streaming(ProxyBody),
    Buffered { bytes: Bytes, rewritten: bool },
    Unreadable,
}

impl BodyState {
    fn empty() -> Self {
        BodyState::Buffered {
            bytes: Bytes::new(),
            rewritten: false,
        }
    }

    async fn text(&mut self, side: &str) -> Option<String> {
        let state = std::mem::replace(self, BodyState::Unreadable);
        *self = match state {
            BodyState::Streaming(body) => match body.collect().await {
                Ok(collected) => BodyState::Buffered {
                    bytes: collected.to_bytes(),
                    rewritten: false,
                },
                Err(e) => {
                    warn!("Failed to read {} body: {}", side, e);
                    BodyState::Unreadable
                }
            },
            other => other,
        };
        match self {
            BodyState::Buffered { bytes, .. } => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn replace(&mut self, text: String) {
        *self = BodyState::Buffered {
            bytes: Bytes::from(text),
            rewritten: true,
        };
    }

    /// The body to send, and whether framing headers are now stale.
    fn take(&mut self) -> (ProxyBody, bool) {
        match std::mem::replace(self, BodyState::Unreadable) {
            BodyState::Streaming(body) => (body, false),
            BodyState::Buffered { bytes, rewritten } => (full_body(bytes), rewritten),
            BodyState::Unreadable => (empty_body(), true),
        }
    }
}

fn strip_framing(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
}

/// An HTTP/1.1 request and, once the origin answered, its response.
pub struct HyperExchange {
    request: RequestHead,
    request_body: BodyState,
    response: ResponseHead,
    response_body: BodyState,
    disposition: Disposition,
}

impl HyperExchange {
    pub fn new(request: Request<Incoming>) -> Self {
        let (parts, body) = request.into_parts();
        let head = RequestHead::from_uri(
            parts.method,
            parts.uri,
            parts.headers,
            HttpVersion::from_hyper(parts.version),
        );
        Self {
            request: head,
            request_body: BodyState::Streaming(body.boxed()),
            response: ResponseHead::default(),
            response_body: BodyState::empty(),
            disposition: Disposition::Forward,
        }
    }

    /// Request to send upstream. The target is the current `url`, which
    /// must be absolute.
    pub fn upstream_request(&mut self) -> Result<Request<ProxyBody>> {
        let uri: Uri = self
            .request
            .url
            .parse()
            .map_err(|_| SnareError::InvalidTarget(self.request.url.clone()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(SnareError::InvalidTarget(self.request.url.clone()));
        }

        let (body, rewritten) = self.request_body.take();
        let mut headers = self.request.headers.clone();
        headers.remove("proxy-connection");
        if rewritten {
            strip_framing(&mut headers);
        }

        let mut request = Request::new(body);
        *request.method_mut() = self.request.method.clone();
        *request.uri_mut() = uri;
        *request.version_mut() = wire_version(self.request.version);
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Install the origin's response for the response phase.
    pub fn set_upstream_response(&mut self, response: Response<Incoming>) {
        let (parts, body) = response.into_parts();
        self.response = ResponseHead {
            status: parts.status.as_u16(),
            headers: parts.headers,
            keep_body: self.response.keep_body,
            version: HttpVersion::from_hyper(parts.version),
        };
        self.response_body = BodyState::Streaming(body.boxed());
    }

    /// Response to write back to the client.
    pub fn into_response(mut self) -> Response<ProxyBody> {
        let (body, rewritten) = self.response_body.take();
        let status = StatusCode::from_u16(self.response.status).unwrap_or_else(|_| {
            warn!(
                "Status {} is not a valid HTTP status, sending 500",
                self.response.status
            );
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut headers = std::mem::take(&mut self.response.headers);
        if rewritten {
            strip_framing(&mut headers);
        }

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.version_mut() = wire_version(self.response.version);
        *response.headers_mut() = headers;
        response
    }
}

/// HTTP/2 heads are written as HTTP/1.1 on this HTTP/1 proxy.
fn wire_version(version: HttpVersion) -> Version {
    match version {
        HttpVersion::Http20 => Version::HTTP_11,
        other => other.to_hyper(),
    }
}

#[async_trait]
impl Exchange for HyperExchange {
    fn request(&self) -> &RequestHead {
        &self.request
    }

    fn request_mut(&mut self) -> &mut RequestHead {
        &mut self.request
    }

    fn response(&self) -> &ResponseHead {
        &self.response
    }

    fn response_mut(&mut self) -> &mut ResponseHead {
        &mut self.response
    }

    async fn request_body_text(&mut self) -> Option<String> {
        self.request_body.text("request").await
    }

    async fn response_body_text(&mut self) -> Option<String> {
        self.response_body.text("response").await
    }

    fn set_request_body_text(&mut self, body: String) {
        self.request_body.replace(body);
    }

    fn set_response_body_text(&mut self, body: String) {
        self.response_body.replace(body);
    }

    fn respond(&mut self) {
        if self.disposition != Disposition::Close {
            self.disposition = Disposition::Respond;
        }
    }

    fn terminate(&mut self) {
        self.disposition = Disposition::Close;
    }

    fn disposition(&self) -> Disposition {
        self.disposition
    }
}

/// A CONNECT request awaiting the tunnel hooks.
pub struct HyperTunnel {
    request: RequestHead,
    blocked: bool,
}

impl HyperTunnel {
    pub fn new<B>(request: &Request<B>) -> Self {
        let head = RequestHead::from_uri(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
            HttpVersion::from_hyper(request.version()),
        );
        Self {
            request: head,
            blocked: false,
        }
    }

    /// `host:port` to dial, from the CONNECT target.
    pub fn target(&self) -> Option<String> {
        self.request.uri.authority().map(|a| a.to_string())
    }
}

impl TunnelExchange for HyperTunnel {
    fn request(&self) -> &RequestHead {
        &self.request
    }

    fn block(&mut self) {
        self.blocked = true;
    }

    fn is_blocked(&self) -> bool {
        self.blocked
    }
}
