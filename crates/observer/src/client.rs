//! Chain client contract consumed by the observer.
//!
//! The observer only needs four reads from a node plus an optional header stream. Transport
//! details (HTTP, retries at the connection level) live in the implementation; see
//! [crate::rpc::RpcClient] for the node REST implementation.

use crate::types::{BlockHash, BlockHeader, OpHash};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("header stream closed")]
    StreamClosed,
}

impl ClientError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the node reports it lacks the requested capability (no such endpoint).
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ClientError::Unsupported(_)) || matches!(self.status(), Some(404 | 501))
    }
}

/// Stream of new chain heads pushed by the node.
#[async_trait]
pub trait HeaderStream: Send {
    /// Wait for the next head. Any error means the stream is unusable and must be reopened.
    async fn next(&mut self) -> Result<BlockHeader, ClientError>;

    /// Release the underlying connection.
    fn close(&mut self) {}
}

/// Node reads used by the observer.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    type Stream: HeaderStream + 'static;

    /// Open a header stream. Fails with an error for which
    /// [ClientError::is_unsupported] is true when the node has no streaming support.
    async fn monitor_block_headers(&self) -> Result<Self::Stream, ClientError>;

    /// Current best header.
    async fn tip_header(&self) -> Result<BlockHeader, ClientError>;

    /// Canonical block hash at `level`.
    async fn block_hash_at(&self, level: u64) -> Result<BlockHash, ClientError>;

    /// Operation hashes of `block`, grouped by validation pass in block order.
    async fn block_operation_hashes(&self, block: &BlockHash)
        -> Result<Vec<Vec<OpHash>>, ClientError>;

    /// Chain's minimal block delay, when known.
    fn min_block_interval(&self) -> Option<Duration> {
        None
    }
}
