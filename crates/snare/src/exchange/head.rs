use crate::compare::FlatMap;
use crate::content_type::ContentType;
use crate::version::HttpVersion;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::{HeaderMap, Method, Uri};
use tracing::debug;

/// Mutable request head of an intercepted exchange.
///
/// `url` is the absolute URL shown to the user; `request_uri` is the
/// request-line target written on the wire. For a forward proxy both are
/// absolute-form and usually identical, but actions rewrite them
/// independently as text.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub url: String,
    pub request_uri: String,
    pub uri: Uri,
    /// Authority host, with the port when one is explicit.
    pub host: String,
    pub headers: HeaderMap,
    pub keep_body: bool,
    pub version: HttpVersion,
}

impl RequestHead {
    pub fn new(method: Method, url: &str) -> Result<Self, hyper::http::uri::InvalidUri> {
        let uri: Uri = url.parse()?;
        Ok(Self::from_uri(method, uri, HeaderMap::new(), HttpVersion::Http11))
    }

    pub fn from_uri(method: Method, uri: Uri, headers: HeaderMap, version: HttpVersion) -> Self {
        let url = uri.to_string();
        let host = authority_host(&uri)
            .or_else(|| {
                headers
                    .get(HOST)
                    .and_then(value_text)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        Self {
            method,
            request_uri: url.clone(),
            url,
            uri,
            host,
            headers,
            keep_body: false,
            version,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header_text(&self, name: &str) -> Option<&str> {
        header_text(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        content_type(&self.headers)
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        set_content_type(&mut self.headers, content_type);
    }

    /// Clear all headers and insert the given ones. Entries that are not
    /// valid header names or values are skipped.
    pub fn replace_headers(&mut self, headers: &FlatMap) {
        replace_headers(&mut self.headers, headers);
    }

    pub fn set_host_header(&mut self, host: &str) {
        self.headers.remove(HOST);
        insert_header(&mut self.headers, HOST.as_str(), host);
    }
}

/// Mutable response head of an intercepted exchange.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
    pub keep_body: bool,
    pub version: HttpVersion,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            keep_body: false,
            version: HttpVersion::Http11,
        }
    }
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn header_text(&self, name: &str) -> Option<&str> {
        header_text(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        content_type(&self.headers)
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        set_content_type(&mut self.headers, content_type);
    }

    pub fn replace_headers(&mut self, headers: &FlatMap) {
        replace_headers(&mut self.headers, headers);
    }
}

/// `host[:port]` of a URI's authority, port only when explicit.
pub(crate) fn authority_host(uri: &Uri) -> Option<String> {
    let host = uri.host()?;
    Some(match uri.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Flatten a header map into ordered name/value text pairs, one pair per
/// value. Bytes that are not UTF-8 are replaced.
pub(crate) fn header_pairs(headers: &HeaderMap) -> FlatMap {
    let mut pairs = FlatMap::new();
    for (name, value) in headers {
        pairs.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    pairs
}

fn value_text(value: &HeaderValue) -> Option<&str> {
    std::str::from_utf8(value.as_bytes()).ok()
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    headers.get(name).and_then(value_text)
}

fn content_type(headers: &HeaderMap) -> Option<ContentType> {
    headers
        .get(CONTENT_TYPE)
        .and_then(value_text)
        .and_then(ContentType::from_mime)
}

fn set_content_type(headers: &mut HeaderMap, content_type: ContentType) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.mime()));
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.append(name, value);
        }
        _ => debug!(header = name, "Skipping invalid header"),
    }
}

fn replace_headers(headers: &mut HeaderMap, replacement: &FlatMap) {
    headers.clear();
    for (name, value) in replacement.iter() {
        insert_header(headers, name, value);
    }
}
