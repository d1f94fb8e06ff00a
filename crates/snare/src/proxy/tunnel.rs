//! CONNECT handling.
//!
//! The tunnel hooks run before the tunnel is acknowledged. A blocked tunnel
//! is refused with `403`; otherwise the client connection is upgraded and
//! spliced to the target without inspection.

use super::exchange::HyperTunnel;
use super::response_ext::{empty_body, status_response, ProxyBody};
use crate::exchange::TunnelExchange;
use crate::hooks::HookRegistry;
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub(super) async fn handle_connect(
    hooks: &HookRegistry,
    request: Request<Incoming>,
) -> Response<ProxyBody> {
    let mut tunnel = HyperTunnel::new(&request);
    if hooks.dispatch_tunnel(&mut tunnel).await {
        info!("Blocked CONNECT to {}", tunnel.request().host);
        return status_response(StatusCode::FORBIDDEN, "Connection blocked");
    }

    let Some(target) = tunnel.target() else {
        return status_response(StatusCode::BAD_REQUEST, "CONNECT target must be host:port");
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(request).await {
            Ok(upgraded) => {
                if let Err(e) = splice(upgraded, &target).await {
                    debug!("Tunnel to {} ended: {}", target, e);
                }
            }
            Err(e) => warn!("CONNECT upgrade to {} failed: {}", target, e),
        }
    });

    Response::new(empty_body())
}

async fn splice(upgraded: Upgraded, target: &str) -> std::io::Result<()> {
    let mut server = TcpStream::connect(target).await?;
    let mut client = TokioIo::new(upgraded);
    let (sent, received) = tokio::io::copy_bidirectional(&mut client, &mut server).await?;
    debug!(target, sent, received, "Tunnel closed");
    Ok(())
}
