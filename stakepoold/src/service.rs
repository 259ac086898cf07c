//! Ticket refresh service
//!
//! Owns the node and wallet sessions and keeps the [`AppContext`] ticket view current. A refresh runs on every
//! interval tick and whenever the node reports ticket changes.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::StakepooldConfig;
use crate::context::AppContext;
use crate::error::StakepooldError;
use crate::fee_policy::MinimumFeePolicy;
use crate::notifications::{LogNotifications, NotificationHandler, TicketNotifications};
use crate::rpc_client::RpcClient;
use crate::rpc_connector::{ConnectError, connect_node_rpc, connect_wallet_rpc};

/// Connected refresh service.
pub struct Service {
    config: StakepooldConfig,
    context: Arc<AppContext>,
    fee_policy: MinimumFeePolicy,
    refresh: Arc<Notify>,
    node: RpcClient,
    wallet: RpcClient,
}

impl Service {
    /// Connects to the node and the wallet.
    ///
    /// Fails if either peer is unreachable or the node serves an incompatible API.
    pub async fn connect(
        config: StakepooldConfig,
        context: Arc<AppContext>,
    ) -> Result<Self, StakepooldError> {
        let refresh = Arc::new(Notify::new());
        let node = connect_node(&config, &refresh).await?;
        let (wallet, wallet_version) = connect_wallet_rpc(&config, wallet_handler()).await?;
        info!("Connected to wallet JSON-RPC API {wallet_version}");

        Ok(Self {
            fee_policy: MinimumFeePolicy::new(config.min_ticket_fee),
            config,
            context,
            refresh,
            node,
            wallet,
        })
    }

    /// Creates a service over established sessions. `refresh` must be the signal installed in the node's
    /// [`TicketNotifications`] handler, if any.
    pub fn from_sessions(
        config: StakepooldConfig,
        context: Arc<AppContext>,
        node: RpcClient,
        wallet: RpcClient,
        refresh: Arc<Notify>,
    ) -> Self {
        Self {
            fee_policy: MinimumFeePolicy::new(config.min_ticket_fee),
            config,
            context,
            refresh,
            node,
            wallet,
        }
    }

    /// Shared pool state updated by the service.
    #[must_use]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Refreshes tickets until `shutdown` completes.
    ///
    /// Returns an error only if the node can no longer be used, i.e. it reconnected with an incompatible API.
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), StakepooldError>
    where
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutting down ticket refresh.");
                    return Ok(());
                }
                _ = interval.tick() => debug!("Scheduled ticket refresh."),
                () = self.refresh.notified() => debug!("Ticket refresh requested by node."),
            }

            self.refresh_tickets().await?;
        }
    }

    async fn refresh_tickets(&mut self) -> Result<(), StakepooldError> {
        if !self.node.is_connected() {
            self.reconnect_node().await?;
        }

        match self
            .context
            .refresh_tickets(
                &self.node,
                &self.wallet,
                &self.fee_policy,
                &self.config.classify,
            )
            .await
        {
            Ok(summary) => debug!("Ticket refresh complete. {summary}"),
            Err(e) => {
                warn!("Ticket refresh failed. {e}");
                self.reconnect_wallet().await;
            }
        }

        Ok(())
    }

    async fn reconnect_node(&mut self) -> Result<(), StakepooldError> {
        warn!("Node session closed. Reconnecting.");
        match connect_node(&self.config, &self.refresh).await {
            Ok(node) => {
                self.node = node;
                Ok(())
            }
            Err(e @ ConnectError::IncompatibleVersion { .. }) => Err(e.into()),
            Err(e) => {
                error!("Reconnecting to node failed. {e}");
                Ok(())
            }
        }
    }

    async fn reconnect_wallet(&mut self) {
        info!("Reconnecting to wallet.");
        match connect_wallet_rpc(&self.config, wallet_handler()).await {
            Ok((wallet, wallet_version)) => {
                info!("Reconnected to wallet JSON-RPC API {wallet_version}");
                self.wallet = wallet;
            }
            Err(e) => error!("Reconnecting to wallet failed. {e}"),
        }
    }
}

fn wallet_handler() -> Arc<dyn NotificationHandler> {
    Arc::new(LogNotifications::new("bitumwallet"))
}

async fn connect_node(
    config: &StakepooldConfig,
    refresh: &Arc<Notify>,
) -> Result<RpcClient, ConnectError> {
    let handler = Arc::new(TicketNotifications::new(Arc::clone(refresh)));
    let (node, node_version) = connect_node_rpc(config, handler).await?;
    info!("Connected to node JSON-RPC API {node_version}");

    for subscription in [
        node.notify_new_tickets().await,
        node.notify_spent_and_missed_tickets().await,
    ] {
        if let Err(e) = subscription {
            warn!("Ticket notification subscription failed. Relying on scheduled refreshes. {e}");
        }
    }

    Ok(node)
}
