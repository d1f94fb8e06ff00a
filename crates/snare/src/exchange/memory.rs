use super::{Disposition, Exchange, RequestHead, ResponseHead, TunnelExchange};
use async_trait::async_trait;

/// Fully buffered exchange.
#[derive(Debug, Clone)]
pub struct MemoryExchange {
    request: RequestHead,
    request_body: String,
    response: ResponseHead,
    response_body: String,
    disposition: Disposition,
    body_reads: usize,
}

impl MemoryExchange {
    pub fn new(request: RequestHead) -> Self {
        Self {
            request,
            request_body: String::new(),
            response: ResponseHead::default(),
            response_body: String::new(),
            disposition: Disposition::Forward,
            body_reads: 0,
        }
    }

    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = body.into();
        self
    }

    pub fn with_response(mut self, response: ResponseHead, body: impl Into<String>) -> Self {
        self.response = response;
        self.response_body = body.into();
        self
    }

    pub fn request_body(&self) -> &str {
        &self.request_body
    }

    pub fn response_body(&self) -> &str {
        &self.response_body
    }

    /// Number of body fetches served so far.
    pub fn body_reads(&self) -> usize {
        self.body_reads
    }
}

#[async_trait]
impl Exchange for MemoryExchange {
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
        self.body_reads += 1;
        Some(self.request_body.clone())
    }

    async fn response_body_text(&mut self) -> Option<String> {
        self.body_reads += 1;
        Some(self.response_body.clone())
    }

    fn set_request_body_text(&mut self, body: String) {
        self.request_body = body;
    }

    fn set_response_body_text(&mut self, body: String) {
        self.response_body = body;
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

/// CONNECT negotiation held in memory.
#[derive(Debug, Clone)]
pub struct MemoryTunnel {
    request: RequestHead,
    blocked: bool,
}

impl MemoryTunnel {
    pub fn new(request: RequestHead) -> Self {
        Self {
            request,
            blocked: false,
        }
    }
}

impl TunnelExchange for MemoryTunnel {
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

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    #[tokio::test]
    async fn test_body_reads_observe_writes() {
        let head = RequestHead::new(Method::POST, "http://a/").unwrap();
        let mut exchange = MemoryExchange::new(head).with_request_body("one");
        assert_eq!(exchange.request_body_text().await.as_deref(), Some("one"));
        exchange.set_request_body_text("two".into());
        assert_eq!(exchange.request_body_text().await.as_deref(), Some("two"));
        assert_eq!(exchange.body_reads(), 2);
    }

    #[test]
    fn test_close_is_sticky() {
        let head = RequestHead::new(Method::GET, "http://a/").unwrap();
        let mut exchange = MemoryExchange::new(head);
        exchange.terminate();
        exchange.respond();
        assert_eq!(exchange.disposition(), Disposition::Close);
    }
}
