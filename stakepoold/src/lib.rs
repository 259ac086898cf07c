#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! `Stakepoold`
//! Stake pool daemon core
//!
//! Connects to the chain node and the voting wallet over authenticated websocket JSON-RPC sessions and keeps the
//! pool's view of live and ignored low fee tickets current with [`ticket_sync`].

pub mod config;
pub mod context;
pub mod error;
pub mod fee_policy;
pub mod notifications;
pub mod rpc_client;
pub mod rpc_connector;
pub mod service;

pub use config::{PeerConfig, StakepooldConfig, StakepooldConfigBuilder};
pub use context::AppContext;
pub use error::StakepooldError;
pub use rpc_client::RpcClient;
pub use rpc_connector::{connect_node_rpc, connect_wallet_rpc};
pub use service::Service;
