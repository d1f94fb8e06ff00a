//! Interception hook wiring.
//!
//! A substrate owns a [`HookRegistry`] (or any other [`HookPoints`]
//! implementation) and calls its dispatch methods at each interception
//! phase. Handlers such as the [`crate::engine::RuleEngine`] attach to it
//! explicitly and receive an [`AttachmentId`] to detach with later.

use crate::exchange::{Disposition, Exchange, TunnelExchange};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Receives exchanges from a substrate.
#[async_trait]
pub trait InterceptHandler: Send + Sync {
    async fn on_request(&self, exchange: &mut dyn Exchange);
    async fn on_response(&self, exchange: &mut dyn Exchange);
    async fn on_tunnel_connect(&self, tunnel: &mut dyn TunnelExchange);
}

/// Handle returned by [`HookPoints::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId(u64);

/// Attachment points a substrate exposes to handlers.
pub trait HookPoints: Send + Sync {
    fn attach(&self, handler: Arc<dyn InterceptHandler>) -> AttachmentId;

    /// Returns false if `id` was not attached.
    fn detach(&self, id: AttachmentId) -> bool;
}

/// Ordered list of attached handlers.
#[derive(Default)]
pub struct HookRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(AttachmentId, Arc<dyn InterceptHandler>)>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn InterceptHandler>> {
        self.handlers.read().iter().map(|(_, h)| h.clone()).collect()
    }

    /// Run request handlers in attachment order. Stops once the exchange
    /// is closed.
    pub async fn dispatch_request(&self, exchange: &mut dyn Exchange) -> Disposition {
        for handler in self.snapshot() {
            if exchange.disposition() == Disposition::Close {
                break;
            }
            handler.on_request(exchange).await;
        }
        exchange.disposition()
    }

    pub async fn dispatch_response(&self, exchange: &mut dyn Exchange) -> Disposition {
        for handler in self.snapshot() {
            if exchange.disposition() == Disposition::Close {
                break;
            }
            handler.on_response(exchange).await;
        }
        exchange.disposition()
    }

    /// Returns true when the tunnel was blocked.
    pub async fn dispatch_tunnel(&self, tunnel: &mut dyn TunnelExchange) -> bool {
        for handler in self.snapshot() {
            if tunnel.is_blocked() {
                break;
            }
            handler.on_tunnel_connect(tunnel).await;
        }
        tunnel.is_blocked()
    }
}

impl HookPoints for HookRegistry {
    fn attach(&self, handler: Arc<dyn InterceptHandler>) -> AttachmentId {
        let id = AttachmentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        debug!(?id, "Handler attached");
        id
    }

    fn detach(&self, id: AttachmentId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if removed {
            debug!(?id, "Handler detached");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MemoryExchange, MemoryTunnel, RequestHead};
    use hyper::Method;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        requests: AtomicUsize,
        close: bool,
    }

    #[async_trait]
    impl InterceptHandler for Counting {
        async fn on_request(&self, exchange: &mut dyn Exchange) {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.close {
                exchange.terminate();
            }
        }

        async fn on_response(&self, _exchange: &mut dyn Exchange) {}

        async fn on_tunnel_connect(&self, tunnel: &mut dyn TunnelExchange) {
            tunnel.block();
        }
    }

    fn exchange() -> MemoryExchange {
        MemoryExchange::new(RequestHead::new(Method::GET, "http://a/").unwrap())
    }

    #[tokio::test]
    async fn test_attach_detach() {
        let registry = HookRegistry::new();
        let handler = Arc::new(Counting::default());
        let id = registry.attach(handler.clone());
        assert_eq!(registry.len(), 1);

        registry.dispatch_request(&mut exchange()).await;
        assert_eq!(handler.requests.load(Ordering::SeqCst), 1);

        assert!(registry.detach(id));
        assert!(!registry.detach(id));
        registry.dispatch_request(&mut exchange()).await;
        assert_eq!(handler.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_stops_dispatch() {
        let registry = HookRegistry::new();
        let closer = Arc::new(Counting {
            close: true,
            ..Default::default()
        });
        let after = Arc::new(Counting::default());
        registry.attach(closer);
        registry.attach(after.clone());

        let disposition = registry.dispatch_request(&mut exchange()).await;
        assert_eq!(disposition, Disposition::Close);
        assert_eq!(after.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tunnel_dispatch() {
        let registry = HookRegistry::new();
        registry.attach(Arc::new(Counting::default()));
        let head = RequestHead::new(Method::CONNECT, "a.com:443").unwrap();
        assert!(registry.dispatch_tunnel(&mut MemoryTunnel::new(head)).await);
    }
}
