//! Long-lived pool state shared by the refresh service and other pool components.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use tracing::info;

use ticket_sync::error::ClassifyError;
use ticket_sync::{
    ChainSource, ClassifyConfig, FeePolicy, Hash, LowFeeOverrides, TicketSummary,
    UserVotingConfig, VotingConfigStore, WalletSource, classify_tickets,
};

use crate::error::StakepooldError;

/// Voting configuration, low fee whitelist and the latest ticket classification of the pool.
///
/// Every table sits behind its own lock. A lock poisoned by a panicking writer is recovered, since each write
/// replaces or inserts whole entries and never leaves a table half updated.
#[derive(Debug, Default)]
pub struct AppContext {
    user_voting_config: RwLock<HashMap<String, UserVotingConfig>>,
    low_fee_overrides: RwLock<HashMap<Hash, String>>,
    live_tickets: RwLock<HashMap<Hash, String>>,
    ignored_low_fee_tickets: RwLock<HashMap<Hash, String>>,
    ticket_summary: RwLock<Option<TicketSummary>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl AppContext {
    /// Creates a context with empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the voting configuration table.
    pub fn set_user_voting_config(&self, user_voting_config: HashMap<String, UserVotingConfig>) {
        *write(&self.user_voting_config) = user_voting_config;
    }

    /// Inserts or replaces the voting configuration of depositor `address`, returning the previous entry.
    pub fn update_user_voting_config(
        &self,
        address: impl Into<String>,
        config: UserVotingConfig,
    ) -> Option<UserVotingConfig> {
        write(&self.user_voting_config).insert(address.into(), config)
    }

    /// Returns the voting configuration of depositor `address`.
    #[must_use]
    pub fn user_voting_config(&self, address: &str) -> Option<UserVotingConfig> {
        read(&self.user_voting_config).get(address).cloned()
    }

    /// Replaces the low fee whitelist.
    pub fn set_low_fee_overrides(&self, overrides: HashMap<Hash, String>) {
        *write(&self.low_fee_overrides) = overrides;
    }

    /// Whitelists `ticket`, voting it through `multisig_address` regardless of its fee.
    pub fn add_low_fee_override(&self, ticket: Hash, multisig_address: impl Into<String>) {
        write(&self.low_fee_overrides).insert(ticket, multisig_address.into());
    }

    /// Copy of the live tickets of the latest classification.
    #[must_use]
    pub fn live_tickets(&self) -> HashMap<Hash, String> {
        read(&self.live_tickets).clone()
    }

    /// Copy of the ignored low fee tickets of the latest classification.
    #[must_use]
    pub fn ignored_low_fee_tickets(&self) -> HashMap<Hash, String> {
        read(&self.ignored_low_fee_tickets).clone()
    }

    /// Counters of the latest classification.
    #[must_use]
    pub fn ticket_summary(&self) -> Option<TicketSummary> {
        read(&self.ticket_summary).clone()
    }

    /// Classifies the wallet's tickets and replaces the live and ignored low fee sets with the result.
    ///
    /// A failed run leaves the previous sets in place.
    pub async fn refresh_tickets<C, W, F>(
        &self,
        chain: &C,
        wallet: &W,
        fee_policy: &F,
        config: &ClassifyConfig,
    ) -> Result<TicketSummary, ClassifyError>
    where
        C: ChainSource,
        W: WalletSource,
        F: FeePolicy,
    {
        let classified = classify_tickets(chain, wallet, self, fee_policy, config).await?;

        *write(&self.live_tickets) = classified.live;
        *write(&self.ignored_low_fee_tickets) = classified.ignored_low_fee;
        *write(&self.ticket_summary) = Some(classified.summary.clone());

        Ok(classified.summary)
    }
}

impl VotingConfigStore for AppContext {
    fn snapshot(&self) -> HashMap<String, UserVotingConfig> {
        read(&self.user_voting_config).clone()
    }
}

impl LowFeeOverrides for AppContext {
    fn low_fee_override(&self, ticket: &Hash) -> Option<String> {
        read(&self.low_fee_overrides).get(ticket).cloned()
    }
}

fn read_json<T>(path: &Path) -> Result<T, StakepooldError>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path).map_err(|source| StakepooldError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| StakepooldError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a voting configuration table, a JSON object keyed by depositor address.
pub fn load_voting_config(path: &Path) -> Result<HashMap<String, UserVotingConfig>, StakepooldError> {
    let user_voting_config: HashMap<String, UserVotingConfig> = read_json(path)?;
    info!(
        "Loaded voting configuration of {} users from {}",
        user_voting_config.len(),
        path.display()
    );

    Ok(user_voting_config)
}

/// Reads a low fee whitelist, a JSON object mapping ticket hash to multisig address.
pub fn load_low_fee_tickets(path: &Path) -> Result<HashMap<Hash, String>, StakepooldError> {
    let entries: HashMap<String, String> = read_json(path)?;
    let overrides = entries
        .into_iter()
        .map(|(hash, multisig_address)| {
            let ticket = hash
                .parse::<Hash>()
                .map_err(|source| StakepooldError::InvalidTicketHash {
                    path: path.to_path_buf(),
                    hash,
                    source,
                })?;
            Ok((ticket, multisig_address))
        })
        .collect::<Result<HashMap<_, _>, StakepooldError>>()?;
    info!(
        "Loaded {} low fee tickets from {}",
        overrides.len(),
        path.display()
    );

    Ok(overrides)
}
