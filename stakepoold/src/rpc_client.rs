//! Websocket JSON-RPC session with a chain node or wallet

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;

use rpc_version::Semver;
use ticket_sync::{BlockHeader, ChainSource, Hash, TransactionDetail, WalletSource};

use crate::notifications::NotificationHandler;

pub mod error;
pub(crate) mod dispatch;

pub use error::{RpcError, RpcServerError};

/// Requests are created by [`RpcClient::call`] and sent to the [`dispatch::dispatch`] task which owns the socket.
///
/// `reply_sender` returns the response to the requester.
#[derive(Debug)]
pub(crate) struct RpcRequest {
    pub(crate) id: u64,
    pub(crate) method: String,
    pub(crate) body: String,
    pub(crate) reply_sender: oneshot::Sender<Result<Value, RpcError>>,
}

#[derive(Debug, Deserialize)]
struct GetTicketsResult {
    #[serde(default)]
    hashes: Vec<String>,
}

/// Handle to an established session.
///
/// Handles are cheap to clone and share one socket. Any number of requests may be in flight at once; responses are
/// matched to requests by id so callers can send a batch of requests before awaiting the first reply.
///
/// The session closes when the peer closes the socket or every handle has been dropped.
#[derive(Debug, Clone)]
pub struct RpcClient {
    peer: Arc<str>,
    request_sender: mpsc::UnboundedSender<RpcRequest>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Starts a session over an established websocket. Must be called from within a tokio runtime.
    ///
    /// Notifications sent by the peer are passed to `handler`. `peer` names the session in logs.
    pub fn from_stream<S>(
        peer: impl Into<String>,
        ws_stream: WebSocketStream<S>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer: Arc<str> = Arc::from(peer.into());
        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        tokio::spawn(dispatch::dispatch(
            Arc::clone(&peer),
            request_receiver,
            ws_stream,
            handler,
        ));

        Self {
            peer,
            request_sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Name of the peer in logs.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Returns false once the session has closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.request_sender.is_closed()
    }

    /// Waits for the session to close.
    pub async fn disconnected(&self) {
        self.request_sender.closed().await;
    }

    /// Calls `method` and deserializes its result.
    pub async fn call<T>(&self, method: &str, params: Vec<Value>) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;

        let (reply_sender, reply_receiver) = oneshot::channel();
        self.request_sender
            .send(RpcRequest {
                id,
                method: method.to_string(),
                body,
                reply_sender,
            })
            .map_err(|_| RpcError::Disconnected)?;
        let result = reply_receiver.await.map_err(|_| {
            if self.request_sender.is_closed() {
                RpcError::Disconnected
            } else {
                RpcError::DispatcherDropped
            }
        })??;

        Ok(serde_json::from_value(result)?)
    }

    /// Gets the API versions advertised by the peer, keyed by API name.
    pub async fn version(&self) -> Result<HashMap<String, Semver>, RpcError> {
        self.call("version", Vec::new()).await
    }

    /// Subscribes to `newtickets` notifications.
    pub async fn notify_new_tickets(&self) -> Result<(), RpcError> {
        self.call("notifynewtickets", Vec::new()).await
    }

    /// Subscribes to `spentandmissedtickets` notifications.
    pub async fn notify_spent_and_missed_tickets(&self) -> Result<(), RpcError> {
        self.call("notifyspentandmissedtickets", Vec::new()).await
    }
}

impl ChainSource for RpcClient {
    type Error = RpcError;

    async fn get_block_header(&self, block_hash: &Hash) -> Result<BlockHeader, RpcError> {
        self.call(
            "getblockheader",
            vec![json!(block_hash.to_string()), json!(true)],
        )
        .await
    }
}

impl WalletSource for RpcClient {
    type Error = RpcError;

    async fn get_tickets(&self, include_immature: bool) -> Result<Vec<String>, RpcError> {
        let tickets: GetTicketsResult = self
            .call("gettickets", vec![json!(include_immature)])
            .await?;

        Ok(tickets.hashes)
    }

    async fn get_transaction(&self, txid: &str) -> Result<TransactionDetail, RpcError> {
        self.call("gettransaction", vec![json!(txid)]).await
    }
}
