//! Upstream HTTP client.

use crate::config::ConnectionPoolConfig;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::info;

/// Pooled HTTP/1.1 client used to reach origins.
pub type HttpClient = Client<HttpConnector, BoxBody<Bytes, hyper::Error>>;

pub fn create_http_client(pool: &ConnectionPoolConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    connector.set_nodelay(true);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(connector);

    info!(
        "Upstream pool configured: max_idle={}, idle_timeout={}s, keepalive={}s, connect_timeout={}s",
        pool.max_idle_per_host,
        pool.idle_timeout_secs,
        pool.keepalive_timeout_secs,
        pool.connect_timeout_secs
    );

    client
}
