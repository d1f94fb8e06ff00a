//! Bundled forward proxy.
//!
//! A plain HTTP/1.1 forward proxy that exposes a [`HookRegistry`] so a
//! [`crate::engine::RuleEngine`] can intercept its traffic. CONNECT
//! requests are offered to the tunnel hooks and then spliced blindly;
//! TLS inside the tunnel is never decrypted.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct, accept loop and request handling
//! - `exchange` - hyper-backed implementations of the exchange traits
//! - `tunnel` - CONNECT handling
//! - `client` - upstream HTTP client creation
//! - `response_ext` - body conversion helpers
//! - `tests` - end-to-end request flow tests
//!
//! [`HookRegistry`]: crate::hooks::HookRegistry

mod client;
mod exchange;
mod response_ext;
mod server;
mod tunnel;


#[allow(unused_imports)]
pub use client::{create_http_client, HttpClient};
#[allow(unused_imports)]
pub use exchange::{HyperExchange, HyperTunnel};
pub use server::ProxyServer;
