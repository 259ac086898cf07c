//! Ticket sync error module

use std::time::Duration;

use crate::pool::{hash::HashParseError, transaction::TransactionError};

/// Boxed error returned by a [`crate::ChainSource`] or [`crate::WalletSource`] implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error aborting a classification run.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The wallet could not enumerate its tickets. Without ticket identities no classification is possible.
    #[error("failed to enumerate wallet tickets. {0}")]
    Enumeration(#[source] ServerError),
}

/// Server errors.
///
/// Errors associated with an RPC call made to the chain node or the wallet.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Server request failed.
    #[error("server request failed. {0}")]
    RequestFailed(#[source] BoxError),
    /// Server did not respond within the call deadline.
    #[error("server request timed out after {0:?}.")]
    TimedOut(Duration),
}

impl ServerError {
    pub(crate) fn request_failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::RequestFailed(Box::new(error))
    }
}

/// Errors skipping a single ticket of a classification run.
///
/// These are logged and never abort the run.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    /// Ticket transaction lookup failed.
    #[error("transaction lookup failed for ticket {txid}. {source}")]
    Lookup {
        /// Ticket txid as reported by the wallet.
        txid: String,
        /// Cause.
        source: ServerError,
    },
    /// None of the ticket's output addresses belong to a user of this pool.
    #[error("could not map ticket {txid} to a user. addresses: {addresses:?}")]
    NotMapped {
        /// Ticket txid.
        txid: String,
        /// Output addresses of the ticket transaction.
        addresses: Vec<String>,
    },
    /// Ticket txid is not a valid hash.
    #[error("invalid ticket hash {txid}. {source}")]
    InvalidTicketHash {
        /// Ticket txid.
        txid: String,
        /// Cause.
        source: HashParseError,
    },
    /// Ticket transaction could not be decoded.
    #[error("failed to decode ticket transaction {txid}. {source}")]
    InvalidTransaction {
        /// Ticket txid.
        txid: String,
        /// Cause.
        source: TransactionError,
    },
    /// Block hash containing the ticket is not a valid hash.
    #[error("invalid block hash {block_hash} for ticket {txid}. {source}")]
    InvalidBlockHash {
        /// Ticket txid.
        txid: String,
        /// Block hash as reported by the wallet.
        block_hash: String,
        /// Cause.
        source: HashParseError,
    },
    /// Height of the block containing the ticket could not be resolved.
    #[error("failed to get block header {block_hash} for ticket {txid}. {source}")]
    BlockHeight {
        /// Ticket txid.
        txid: String,
        /// Block hash.
        block_hash: String,
        /// Cause.
        source: ServerError,
    },
}
