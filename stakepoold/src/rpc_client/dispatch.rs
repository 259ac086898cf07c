//! Single task owning the websocket of a session

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc::UnboundedReceiver, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::notifications::NotificationHandler;

use super::{RpcError, RpcRequest, RpcServerError};

type ReplySender = oneshot::Sender<Result<Value, RpcError>>;

/// Message received from the peer. Responses carry the id of their request, notifications a method and a null id.
#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcServerError>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
}

/// Writes requests received via `request_receiver` to the socket and routes incoming messages until the peer
/// closes the session or every [`super::RpcClient`] handle has been dropped.
///
/// Requests still awaiting a response when the session ends fail with [`RpcError::Disconnected`].
pub(crate) async fn dispatch<S>(
    peer: Arc<str>,
    mut request_receiver: UnboundedReceiver<RpcRequest>,
    ws_stream: WebSocketStream<S>,
    handler: Arc<dyn NotificationHandler>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut pending: HashMap<u64, ReplySender> = HashMap::new();

    loop {
        tokio::select! {
            request = request_receiver.recv() => {
                let Some(request) = request else {
                    debug!("All {peer} handles dropped. Closing session.");
                    if let Err(e) = ws_sink.close().await {
                        debug!("Closing {peer} session failed. {e}");
                    }
                    break;
                };
                debug!("Sending {} request {} to {peer}", request.method, request.id);
                if let Err(e) = ws_sink.send(Message::Text(request.body)).await {
                    warn!("Sending {} request to {peer} failed. {e}", request.method);
                    let _ignore_error = request.reply_sender.send(Err(RpcError::WebSocket(e)));
                    break;
                }
                track_request(&mut pending, request.id, request.reply_sender);
            }
            message = ws_stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    route_message(&peer, &text, &mut pending, handler.as_ref());
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => route_message(&peer, text, &mut pending, handler.as_ref()),
                    Err(e) => warn!("Discarding non utf-8 message from {peer}. {e}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("{peer} closed the session. {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Reading from {peer} failed. {e}");
                    break;
                }
                None => {
                    debug!("{peer} session ended.");
                    break;
                }
            }
        }
    }

    request_receiver.close();
    for (_id, reply_sender) in pending.drain() {
        let _ignore_error = reply_sender.send(Err(RpcError::Disconnected));
    }
    while let Ok(request) = request_receiver.try_recv() {
        let _ignore_error = request.reply_sender.send(Err(RpcError::Disconnected));
    }
    warn!("Disconnected from {peer}.");
}

/// Adds a request awaiting its response, dropping requests whose caller stopped waiting.
fn track_request(pending: &mut HashMap<u64, ReplySender>, id: u64, reply_sender: ReplySender) {
    pending.retain(|_id, reply_sender| !reply_sender.is_closed());
    pending.insert(id, reply_sender);
}

fn route_message(
    peer: &str,
    text: &str,
    pending: &mut HashMap<u64, ReplySender>,
    handler: &dyn NotificationHandler,
) {
    let message: IncomingMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Discarding malformed message from {peer}. {e}");
            return;
        }
    };

    match (message.id, message.method) {
        (Some(id), _) => {
            let Some(reply_sender) = pending.remove(&id) else {
                warn!("Discarding response from {peer} with unknown id {id}.");
                return;
            };
            let reply = match message.error {
                Some(error) => Err(RpcError::Server(error)),
                None => Ok(message.result.unwrap_or(Value::Null)),
            };
            // requester may have timed out
            let _ignore_error = reply_sender.send(reply);
        }
        (None, Some(method)) => {
            debug!("Received {method} notification from {peer}");
            handler.on_notification(&method, &message.params);
        }
        (None, None) => warn!("Discarding message from {peer} with neither id nor method."),
    }
}
