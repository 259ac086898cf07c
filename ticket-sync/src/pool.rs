//! Data exchanged between the engine, the RPC peers and the pool state.

use serde::{Deserialize, Serialize};

pub mod hash;
pub mod traits;
pub mod transaction;

/// Voting configuration of a pool user, keyed by the user's depositor address in the pool's user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVotingConfig {
    /// Pool user id.
    #[serde(default)]
    pub user_id: i64,
    /// Multisig address shared by the user and the pool. Every ticket of the user is voted through this address.
    pub multisig_address: String,
    /// Vote bits the pool casts on the user's behalf.
    #[serde(default)]
    pub vote_bits: u16,
    /// Agenda version the vote bits apply to.
    #[serde(default)]
    pub vote_bits_version: u32,
}

/// Block header fields read by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    /// Block hash.
    #[serde(default)]
    pub hash: String,
    /// Block height.
    pub height: u32,
}

/// Wallet view of a ticket purchase transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionDetail {
    /// Transaction id.
    pub txid: String,
    /// Serialized transaction, hex encoded.
    pub hex: String,
    /// Hash of the block the transaction was mined in.
    #[serde(rename = "blockhash", default)]
    pub block_hash: String,
    /// Wallet relevant outputs, in output order.
    #[serde(default)]
    pub details: Vec<TransactionOutputDetail>,
}

impl TransactionDetail {
    /// Returns the output addresses in output order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.details.iter().map(|detail| detail.address.as_str())
    }
}

/// Single output of a [`TransactionDetail`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionOutputDetail {
    /// Output address.
    #[serde(default)]
    pub address: String,
    /// Wallet category, e.g. `ticket` or `send`.
    #[serde(default)]
    pub category: String,
    /// Output amount in coins.
    #[serde(default)]
    pub amount: f64,
}

/// Outcome of evaluating a ticket against the pool fee policy.
///
/// `valid` alone decides the classification. `error` carries any diagnostic raised during evaluation and is only
/// logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeVerdict {
    /// Ticket paid the pool fee.
    pub valid: bool,
    /// Diagnostic raised during evaluation.
    pub error: Option<String>,
}

impl FeeVerdict {
    /// Ticket paid the pool fee.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// Ticket did not pay the pool fee.
    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}
