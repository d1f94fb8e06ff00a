//! The exchange contract between an interception substrate and the engine.
//!
//! A substrate (the bundled [`crate::proxy`], or any other transport)
//! wraps each intercepted transaction in a type implementing [`Exchange`]
//! and each CONNECT negotiation in a [`TunnelExchange`]. The engine only
//! reads and mutates them for the duration of a hook call.
//!
//! # Module Structure
//!
//! - `head` - request/response heads with header helpers
//! - `memory` - in-memory exchange used by tests and embedders

mod head;
mod memory;

pub use head::{RequestHead, ResponseHead};
pub use memory::{MemoryExchange, MemoryTunnel};

pub(crate) use head::{authority_host, header_pairs};

use async_trait::async_trait;
use serde::Serialize;

/// What the substrate should do with an exchange after a hook pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Continue normally (forward to origin, or relay the response).
    #[default]
    Forward,
    /// The response head and body are final; do not contact the origin.
    Respond,
    /// Abort the connection.
    Close,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Forward => "forward",
            Disposition::Respond => "respond",
            Disposition::Close => "close",
        }
    }
}

/// A live, mutable request/response pair.
///
/// Bodies are fetched lazily. Implementations may buffer the body on
/// first fetch, but a fetch after `set_*_body_text` must return the new
/// text.
#[async_trait]
pub trait Exchange: Send {
    fn request(&self) -> &RequestHead;
    fn request_mut(&mut self) -> &mut RequestHead;

    /// Response head. Before the origin has answered this is a default
    /// `200` head that actions may overwrite.
    fn response(&self) -> &ResponseHead;
    fn response_mut(&mut self) -> &mut ResponseHead;

    /// Request body as text, `None` when it cannot be read.
    async fn request_body_text(&mut self) -> Option<String>;
    async fn response_body_text(&mut self) -> Option<String>;

    fn set_request_body_text(&mut self, body: String);
    fn set_response_body_text(&mut self, body: String);

    /// Mark the current response as final.
    fn respond(&mut self);

    /// Abort the underlying connection.
    fn terminate(&mut self);

    fn disposition(&self) -> Disposition;
}

/// A CONNECT negotiation, before any request inside the tunnel is visible.
pub trait TunnelExchange: Send {
    fn request(&self) -> &RequestHead;

    /// Refuse to establish the tunnel.
    fn block(&mut self);

    fn is_blocked(&self) -> bool;
}
