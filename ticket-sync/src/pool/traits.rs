//! Traits for interfacing RPC peers and pool state with the classification engine

use std::collections::HashMap;
use std::future::Future;

use super::hash::Hash;
use super::transaction::Transaction;
use super::{BlockHeader, FeeVerdict, TransactionDetail, UserVotingConfig};

/// Chain node queried for block data.
pub trait ChainSource {
    /// Errors returned by the node session.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the header of the block with hash `block_hash`.
    fn get_block_header(
        &self,
        block_hash: &Hash,
    ) -> impl Future<Output = Result<BlockHeader, Self::Error>> + Send;
}

/// Voting wallet holding the pool's tickets.
///
/// [`Self::get_transaction`] calls are issued concurrently, so implementations must support several requests in
/// flight on one session.
pub trait WalletSource {
    /// Errors returned by the wallet session.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the hashes of all tickets known to the wallet. Immature tickets are only included if
    /// `include_immature` is set.
    fn get_tickets(
        &self,
        include_immature: bool,
    ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

    /// Fetches the wallet's view of transaction `txid`.
    fn get_transaction(
        &self,
        txid: &str,
    ) -> impl Future<Output = Result<TransactionDetail, Self::Error>> + Send;
}

/// Table of pool users keyed by depositor address.
///
/// The table may be written concurrently by other parts of the pool.
pub trait VotingConfigStore {
    /// Returns a copy of the table. Implementations must only hold their lock for the duration of the copy.
    fn snapshot(&self) -> HashMap<String, UserVotingConfig>;
}

/// Operator whitelist of tickets that are voted despite failing fee validation.
pub trait LowFeeOverrides {
    /// Returns the multisig address recorded for `ticket`, if whitelisted.
    fn low_fee_override(&self, ticket: &Hash) -> Option<String>;
}

/// Stake pool fee rules.
pub trait FeePolicy {
    /// Evaluates whether `ticket`, mined at `block_height`, paid the pool fee.
    fn evaluate_ticket(&self, ticket: &Transaction, block_height: u32) -> FeeVerdict;
}

impl LowFeeOverrides for HashMap<Hash, String> {
    fn low_fee_override(&self, ticket: &Hash) -> Option<String> {
        self.get(ticket).cloned()
    }
}

impl<F> FeePolicy for F
where
    F: Fn(&Transaction, u32) -> FeeVerdict,
{
    fn evaluate_ticket(&self, ticket: &Transaction, block_height: u32) -> FeeVerdict {
        self(ticket, block_height)
    }
}
