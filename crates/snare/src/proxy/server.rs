//! Proxy server implementation.
//!
//! This module contains the ProxyServer struct, its accept loop, and the
//! per-request flow: request hooks, upstream forwarding, response hooks.

use super::client::{create_http_client, HttpClient};
use super::exchange::HyperExchange;
use super::response_ext::{status_response, ProxyBody};
use super::tunnel;
use crate::config::Config;
use crate::error::{Result, SnareError};
use crate::exchange::{Disposition, Exchange};
use crate::hooks::{HookPoints, HookRegistry};
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

struct ProxyState {
    hooks: Arc<HookRegistry>,
    client: HttpClient,
}

/// Forward proxy exposing its traffic through a [`HookRegistry`].
pub struct ProxyServer {
    listen_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(config: &Config) -> Self {
        let metrics_addr = config
            .metrics
            .enabled
            .then(|| SocketAddr::new(config.listen.address, config.metrics.port));
        Self {
            listen_addr: config.listen.socket_addr(),
            metrics_addr,
            state: Arc::new(ProxyState {
                hooks: Arc::new(HookRegistry::new()),
                client: create_http_client(&config.connection_pool),
            }),
        }
    }

    /// Attachment points for interception handlers.
    pub fn hook_points(&self) -> Arc<dyn HookPoints> {
        self.state.hooks.clone()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Run the proxy, accepting connections until the task is cancelled.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| SnareError::Bind(self.listen_addr, e.to_string()))?;
        info!("Proxy listening on http://{}", self.listen_addr);

        if let Some(addr) = self.metrics_addr {
            let metrics_listener = TcpListener::bind(addr)
                .await
                .map_err(|e| SnareError::Bind(addr, e.to_string()))?;
            info!("Metrics available at http://{}/metrics", addr);
            tokio::spawn(serve_metrics(metrics_listener));
        }

        self.serve(listener).await
    }

    /// Accept proxy connections on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("{} interception handler(s) attached", self.state.hooks.len());
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let state = self.state.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { handle_request(&state, req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .preserve_header_case(true)
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    if err.is_user() {
                        debug!("Connection from {} closed: {}", remote_addr, err);
                    } else {
                        error!("Error serving HTTP connection from {}: {}", remote_addr, err);
                    }
                }
            });
        }
    }
}

async fn handle_request(
    state: &ProxyState,
    request: Request<Incoming>,
) -> Result<Response<ProxyBody>> {
    if request.method() == Method::CONNECT {
        return Ok(tunnel::handle_connect(&state.hooks, request).await);
    }

    let mut exchange = HyperExchange::new(request);
    match state.hooks.dispatch_request(&mut exchange).await {
        Disposition::Close => {
            info!("Closing connection for {}", exchange.request().url);
            return Err(SnareError::ConnectionClosed);
        }
        Disposition::Respond => return Ok(exchange.into_response()),
        Disposition::Forward => {}
    }

    let upstream = match exchange.upstream_request() {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("Cannot forward request: {}", e);
            return Ok(status_response(StatusCode::BAD_REQUEST, &e.to_string()));
        }
    };

    let method = upstream.method().to_string();
    let url = exchange.request().url.clone();
    let start = Instant::now();
    let response = match state.client.request(upstream).await {
        Ok(response) => response,
        Err(e) => {
            let err = SnareError::Upstream(format!("{url}: {e}"));
            warn!("{}", err);
            return Ok(status_response(StatusCode::BAD_GATEWAY, &err.to_string()));
        }
    };
    metrics::record_upstream_duration(
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0,
    );
    debug!(%url, status = response.status().as_u16(), "Upstream responded");

    exchange.set_upstream_response(response);
    match state.hooks.dispatch_response(&mut exchange).await {
        Disposition::Close => {
            info!("Closing connection for {}", url);
            Err(SnareError::ConnectionClosed)
        }
        _ => Ok(exchange.into_response()),
    }
}

async fn serve_metrics(listener: TcpListener) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Metrics listener failed to accept: {}", e);
                continue;
            }
        };
        tokio::spawn(async move {
            let service = service_fn(|req: Request<Incoming>| async move {
                let response = if req.method() == Method::GET && req.uri().path() == "/metrics" {
                    Response::builder()
                        .header("Content-Type", "text/plain; version=0.0.4")
                        .body(Full::new(Bytes::from(metrics::collect_metrics())))
                } else {
                    Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .body(Full::new(Bytes::new()))
                };
                Ok::<_, Infallible>(response.unwrap_or_default())
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Metrics connection error: {}", err);
            }
        });
    }
}
