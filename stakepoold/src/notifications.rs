//! Handlers for notifications pushed by the RPC peers.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Ticket notification sent by the node after `notifynewtickets`.
pub const NEW_TICKETS: &str = "newtickets";
/// Ticket notification sent by the node after `notifyspentandmissedtickets`.
pub const SPENT_AND_MISSED_TICKETS: &str = "spentandmissedtickets";

/// Receives notifications of an [`crate::rpc_client::RpcClient`] session.
///
/// Called from the session's dispatch task, so implementations must not block.
pub trait NotificationHandler: Send + Sync {
    /// Handles notification `method` with its positional `params`.
    fn on_notification(&self, method: &str, params: &[Value]);
}

/// Logs every notification and otherwise ignores it.
#[derive(Debug, Clone)]
pub struct LogNotifications {
    peer: String,
}

impl LogNotifications {
    /// Creates a handler logging notifications of `peer`.
    pub fn new(peer: impl Into<String>) -> Self {
        Self { peer: peer.into() }
    }
}

impl NotificationHandler for LogNotifications {
    fn on_notification(&self, method: &str, params: &[Value]) {
        debug!(
            "Ignoring {method} notification from {} with {} params",
            self.peer,
            params.len()
        );
    }
}

/// Requests an early ticket refresh whenever the node reports ticket changes.
#[derive(Debug, Clone)]
pub struct TicketNotifications {
    refresh: Arc<Notify>,
}

impl TicketNotifications {
    /// Creates a handler signalling `refresh` on ticket notifications.
    pub fn new(refresh: Arc<Notify>) -> Self {
        Self { refresh }
    }
}

impl NotificationHandler for TicketNotifications {
    fn on_notification(&self, method: &str, params: &[Value]) {
        match method {
            NEW_TICKETS | SPENT_AND_MISSED_TICKETS => {
                info!("{method} notification received. Scheduling ticket refresh.");
                self.refresh.notify_one();
            }
            _ => debug!(
                "Ignoring {method} notification with {} params",
                params.len()
            ),
        }
    }
}
