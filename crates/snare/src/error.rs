//! Error types.
//!
//! The engine's hot path never returns errors; these cover the edges
//! around it: loading rule files, decoding interchange records, and the
//! bundled proxy.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SnareError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid interchange record: {0}")]
    Interchange(String),
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, String),
    #[error("Upstream request failed: {0}")]
    Upstream(String),
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),
    #[error("Connection closed by rule")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, SnareError>;
