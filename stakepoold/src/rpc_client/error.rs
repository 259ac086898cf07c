//! Errors associated with an [`crate::rpc_client::RpcClient`] session.

use serde::Deserialize;

/// Error object returned by the peer in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcServerError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("websocket error. {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("io error. {0}")]
    Io(#[from] std::io::Error),
    #[error("json error. {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid authorization header. {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error("server returned error. {0}")]
    Server(#[from] RpcServerError),
    #[error("dispatcher dropped the request without a reply.")]
    DispatcherDropped,
    #[error("session disconnected.")]
    Disconnected,
}
