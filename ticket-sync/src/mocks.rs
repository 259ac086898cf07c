//! In-memory chain node, wallet and pool state for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::pool::hash::{HASH_SIZE, Hash};
use crate::pool::traits::{ChainSource, LowFeeOverrides, VotingConfigStore, WalletSource};
use crate::pool::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::pool::{
    BlockHeader, FeeVerdict, TransactionDetail, TransactionOutputDetail, UserVotingConfig,
};

/// Fee in atoms accepted by [`minimum_fee_policy`].
pub(crate) const NORMAL_FEE: i64 = 10_000;
/// Fee in atoms rejected by [`minimum_fee_policy`].
pub(crate) const LOW_FEE: i64 = 100;

const TICKET_VALUE: i64 = 2_000_000_000;

#[derive(Debug, thiserror::Error)]
#[error("mock server error: {0}")]
pub(crate) struct MockError(String);

pub(crate) fn block_hash(n: u8) -> Hash {
    let mut bytes = [n; HASH_SIZE];
    bytes[0] = 0xb1;
    Hash::from_bytes(bytes)
}

pub(crate) fn ticket_hash(n: u8) -> Hash {
    let mut bytes = [n; HASH_SIZE];
    bytes[0] = 0x71;
    Hash::from_bytes(bytes)
}

/// Ticket purchase paying `fee` atoms.
pub(crate) fn ticket_transaction(fee: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_outpoint: OutPoint {
                hash: Hash::from_bytes([0x0f; HASH_SIZE]),
                index: 0,
                tree: 0,
            },
            sequence: u32::MAX,
            value_in: TICKET_VALUE + fee,
            block_height: 1,
            block_index: 0,
            signature_script: vec![0x47; 72],
        }],
        outputs: vec![TxOut {
            value: TICKET_VALUE,
            script_version: 0,
            pk_script: vec![0xba, 0x76, 0xa9, 0x14],
        }],
        lock_time: 0,
        expiry: 0,
    }
}

/// Accepts tickets paying at least [`NORMAL_FEE`].
pub(crate) fn minimum_fee_policy(ticket: &Transaction, _block_height: u32) -> FeeVerdict {
    if ticket.fee() >= Some(NORMAL_FEE) {
        FeeVerdict::valid()
    } else {
        FeeVerdict::invalid(format!("ticket fee {:?} below {NORMAL_FEE}", ticket.fee()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockChain {
    heights: HashMap<Hash, u32>,
    delay: Option<Duration>,
    header_requests: Mutex<HashMap<Hash, usize>>,
}

impl MockChain {
    pub(crate) fn with_block(mut self, block_hash: Hash, height: u32) -> Self {
        self.heights.insert(block_hash, height);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn header_requests(&self, block_hash: &Hash) -> usize {
        self.header_requests
            .lock()
            .unwrap()
            .get(block_hash)
            .copied()
            .unwrap_or(0)
    }
}

impl ChainSource for MockChain {
    type Error = MockError;

    async fn get_block_header(&self, block_hash: &Hash) -> Result<BlockHeader, MockError> {
        *self
            .header_requests
            .lock()
            .unwrap()
            .entry(*block_hash)
            .or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.heights
            .get(block_hash)
            .map(|&height| BlockHeader {
                hash: block_hash.to_string(),
                height,
            })
            .ok_or_else(|| MockError(format!("block {block_hash} not found")))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockWallet {
    tickets: Vec<String>,
    transactions: HashMap<String, TransactionDetail>,
    fail_enumeration: bool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    transaction_requests: Mutex<Vec<String>>,
}

impl MockWallet {
    pub(crate) fn with_ticket(
        self,
        txid: Hash,
        addresses: &[&str],
        block_hash: Hash,
        fee: i64,
    ) -> Self {
        let hex = ticket_transaction(fee).to_hex().unwrap();
        self.with_raw_ticket(&txid.to_string(), addresses, &block_hash.to_string(), &hex)
    }

    pub(crate) fn with_raw_ticket(
        mut self,
        txid: &str,
        addresses: &[&str],
        block_hash: &str,
        hex: &str,
    ) -> Self {
        let details = addresses
            .iter()
            .map(|address| TransactionOutputDetail {
                address: address.to_string(),
                category: "ticket".to_string(),
                amount: 20.0,
            })
            .collect();
        self.tickets.push(txid.to_string());
        self.transactions.insert(
            txid.to_string(),
            TransactionDetail {
                txid: txid.to_string(),
                hex: hex.to_string(),
                block_hash: block_hash.to_string(),
                details,
            },
        );
        self
    }

    /// Lists a ticket the wallet has no transaction for.
    pub(crate) fn with_failed_lookup(mut self, txid: Hash) -> Self {
        self.tickets.push(txid.to_string());
        self
    }

    /// Lists an already added ticket a second time.
    pub(crate) fn with_duplicate_listing(mut self, txid: Hash) -> Self {
        self.tickets.push(txid.to_string());
        self
    }

    pub(crate) fn with_failed_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn max_lookups_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn transaction_requests(&self) -> Vec<String> {
        self.transaction_requests.lock().unwrap().clone()
    }

    pub(crate) fn reset_counters(&self) {
        self.in_flight.store(0, Ordering::SeqCst);
        self.max_in_flight.store(0, Ordering::SeqCst);
        self.transaction_requests.lock().unwrap().clear();
    }

    async fn respond(&self) {
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

impl WalletSource for MockWallet {
    type Error = MockError;

    async fn get_tickets(&self, include_immature: bool) -> Result<Vec<String>, MockError> {
        assert!(!include_immature);
        self.respond().await;
        if self.fail_enumeration {
            return Err(MockError("wallet locked".to_string()));
        }

        Ok(self.tickets.clone())
    }

    async fn get_transaction(&self, txid: &str) -> Result<TransactionDetail, MockError> {
        self.transaction_requests
            .lock()
            .unwrap()
            .push(txid.to_string());
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.respond().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| MockError(format!("no transaction {txid}")))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockPool {
    users: HashMap<String, UserVotingConfig>,
    overrides: HashMap<Hash, String>,
    snapshots: AtomicUsize,
}

impl MockPool {
    pub(crate) fn with_user(mut self, address: &str, multisig_address: &str) -> Self {
        let user_id = self.users.len() as i64 + 1;
        self.users.insert(
            address.to_string(),
            UserVotingConfig {
                user_id,
                multisig_address: multisig_address.to_string(),
                vote_bits: 1,
                vote_bits_version: 5,
            },
        );
        self
    }

    pub(crate) fn with_override(mut self, ticket: Hash, multisig_address: &str) -> Self {
        self.overrides.insert(ticket, multisig_address.to_string());
        self
    }

    pub(crate) fn snapshots_taken(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

impl VotingConfigStore for MockPool {
    fn snapshot(&self) -> HashMap<String, UserVotingConfig> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.users.clone()
    }
}

impl LowFeeOverrides for MockPool {
    fn low_fee_override(&self, ticket: &Hash) -> Option<String> {
        self.overrides.low_fee_override(ticket)
    }
}
