//! Entrypoint for ticket classification

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::client;
use crate::config::ClassifyConfig;
use crate::error::{ClassifyError, ServerError, TicketError};
use crate::pool::hash::Hash;
use crate::pool::traits::{ChainSource, FeePolicy, LowFeeOverrides, VotingConfigStore, WalletSource};
use crate::pool::transaction::Transaction;
use crate::pool::{TransactionDetail, UserVotingConfig};

pub mod height;

use height::BlockHeightCache;

/// Counters of a classification run.
///
/// `added_low_fee`, `normal_fee`, `low_fee` and `skipped` count tickets as they are processed and together add up
/// to `total`. `live` and `ignored_low_fee` are the sizes of the resulting sets, which only differ from the
/// processing counters if the wallet reported a ticket more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketSummary {
    /// Tickets reported by the wallet.
    pub total: usize,
    /// Tickets made live by the low fee whitelist.
    pub added_low_fee: usize,
    /// Tickets made live by passing fee validation.
    pub normal_fee: usize,
    /// Tickets that failed fee validation.
    pub low_fee: usize,
    /// Tickets that could not be looked up, mapped to a user or decoded.
    pub skipped: usize,
    /// Size of the live set.
    pub live: usize,
    /// Size of the ignored low fee set.
    pub ignored_low_fee: usize,
}

impl std::fmt::Display for TicketSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tickets loaded -- addedLowFee {} ignoredLowFee {} normalFee {} live {} skipped {} total {}",
            self.added_low_fee,
            self.ignored_low_fee,
            self.normal_fee,
            self.live,
            self.skipped,
            self.total,
        )
    }
}

/// Returned when [`classify_tickets`] completes. Maps ticket hash to the multisig address the ticket is voted
/// through.
///
/// A ticket is never in both sets.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedTickets {
    /// Tickets the pool votes.
    pub live: HashMap<Hash, String>,
    /// Tickets of pool users that did not pay the pool fee.
    pub ignored_low_fee: HashMap<Hash, String>,
    /// Run counters.
    pub summary: TicketSummary,
}

impl ClassifiedTickets {
    fn insert(&mut self, ticket: Hash, classification: Classification) {
        match classification {
            Classification::AddedLowFee(multisig_address) => {
                self.summary.added_low_fee += 1;
                self.ignored_low_fee.remove(&ticket);
                self.live.insert(ticket, multisig_address);
            }
            Classification::NormalFee(multisig_address) => {
                self.summary.normal_fee += 1;
                self.ignored_low_fee.remove(&ticket);
                self.live.insert(ticket, multisig_address);
            }
            Classification::LowFee(multisig_address) => {
                self.summary.low_fee += 1;
                self.live.remove(&ticket);
                self.ignored_low_fee.insert(ticket, multisig_address);
            }
        }
    }
}

#[derive(Debug)]
enum Classification {
    AddedLowFee(String),
    NormalFee(String),
    LowFee(String),
}

/// Classifies every ticket held by `wallet` as live or ignored for paying a low fee.
///
/// The voting configuration of `pool` is copied once at the start of the run. Tickets that cannot be looked up,
/// mapped to a user of the pool or decoded are logged and left out of both sets.
///
/// Returns [`ClassifyError::Enumeration`] if the wallet's ticket list cannot be fetched. The run produces no
/// classification in that case.
pub async fn classify_tickets<C, W, P, F>(
    chain: &C,
    wallet: &W,
    pool: &P,
    fee_policy: &F,
    config: &ClassifyConfig,
) -> Result<ClassifiedTickets, ClassifyError>
where
    C: ChainSource,
    W: WalletSource,
    P: VotingConfigStore + LowFeeOverrides,
    F: FeePolicy,
{
    let voting_config = pool.snapshot();

    info!("Fetching wallet tickets.");
    let start = Instant::now();
    let tickets = client::get_tickets(wallet, config.call_timeout).await;
    info!("Fetching wallet tickets took {:?}", start.elapsed());
    let tickets = tickets.map_err(|e| {
        warn!("Fetching wallet tickets failed. {e}");
        ClassifyError::Enumeration(e)
    })?;

    debug!("Fetching transactions for {} tickets", tickets.len());
    let transactions = client::get_transactions(wallet, &tickets, config).await;

    let mut classifier = Classifier {
        chain,
        pool,
        fee_policy,
        voting_config: &voting_config,
        block_heights: BlockHeightCache::new(),
        call_timeout: config.call_timeout,
    };
    let mut classified = ClassifiedTickets::default();
    classified.summary.total = tickets.len();

    for (index, (txid, transaction)) in tickets.iter().zip(transactions).enumerate() {
        debug!("Classifying ticket {}/{}", index + 1, tickets.len());
        match classifier.classify(txid, transaction).await {
            Ok((ticket, classification)) => classified.insert(ticket, classification),
            Err(e) => {
                warn!("Skipping ticket. {e}");
                classified.summary.skipped += 1;
            }
        }
    }

    classified.summary.live = classified.live.len();
    classified.summary.ignored_low_fee = classified.ignored_low_fee.len();
    debug!(
        "Resolved {} block heights for {} tickets",
        classifier.block_heights.len(),
        tickets.len()
    );
    info!("{}", classified.summary);

    Ok(classified)
}

struct Classifier<'a, C, P, F> {
    chain: &'a C,
    pool: &'a P,
    fee_policy: &'a F,
    voting_config: &'a HashMap<String, UserVotingConfig>,
    block_heights: BlockHeightCache,
    call_timeout: Duration,
}

impl<C, P, F> Classifier<'_, C, P, F>
where
    C: ChainSource,
    P: LowFeeOverrides,
    F: FeePolicy,
{
    async fn classify(
        &mut self,
        txid: &str,
        transaction: Result<TransactionDetail, ServerError>,
    ) -> Result<(Hash, Classification), TicketError> {
        let transaction = transaction.map_err(|source| TicketError::Lookup {
            txid: txid.to_string(),
            source,
        })?;

        // only the first output address belonging to a user maps the ticket
        let Some(user) = transaction
            .addresses()
            .find_map(|address| self.voting_config.get(address))
        else {
            return Err(TicketError::NotMapped {
                txid: transaction.txid.clone(),
                addresses: transaction.addresses().map(str::to_string).collect(),
            });
        };

        let ticket = transaction
            .txid
            .parse::<Hash>()
            .map_err(|source| TicketError::InvalidTicketHash {
                txid: transaction.txid.clone(),
                source,
            })?;

        if let Some(multisig_address) = self.pool.low_fee_override(&ticket) {
            return Ok((ticket, Classification::AddedLowFee(multisig_address)));
        }

        let ticket_transaction = Transaction::from_hex(&transaction.hex).map_err(|source| {
            TicketError::InvalidTransaction {
                txid: transaction.txid.clone(),
                source,
            }
        })?;

        let block_hash =
            transaction
                .block_hash
                .parse::<Hash>()
                .map_err(|source| TicketError::InvalidBlockHash {
                    txid: transaction.txid.clone(),
                    block_hash: transaction.block_hash.clone(),
                    source,
                })?;
        let block_height = self
            .block_heights
            .resolve(self.chain, &block_hash, self.call_timeout)
            .await
            .map_err(|source| TicketError::BlockHeight {
                txid: transaction.txid.clone(),
                block_hash: transaction.block_hash.clone(),
                source,
            })?;

        let verdict = self
            .fee_policy
            .evaluate_ticket(&ticket_transaction, block_height);
        if verdict.valid {
            if let Some(error) = verdict.error {
                debug!("Fee policy reported an error for valid ticket {ticket}. {error}");
            }
            Ok((ticket, Classification::NormalFee(user.multisig_address.clone())))
        } else {
            warn!(
                "Ignoring ticket {} for msa {} ticketFeesValid {} err {:?}",
                ticket, user.multisig_address, verdict.valid, verdict.error
            );
            Ok((ticket, Classification::LowFee(user.multisig_address.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use crate::config::ClassifyConfig;
    use crate::error::{ClassifyError, ServerError};
    use crate::mocks::{
        LOW_FEE, MockChain, MockPool, MockWallet, NORMAL_FEE, block_hash, minimum_fee_policy,
        ticket_hash,
    };
    use crate::pool::FeeVerdict;
    use crate::pool::transaction::Transaction;

    use super::classify_tickets;

    const ADDR_A: &str = "TsAddrA";
    const ADDR_B: &str = "TsAddrB";
    const ADDR_Z: &str = "TsAddrZUnconfigured";
    const MSA_M: &str = "TcMultisigM";
    const MSA_N: &str = "TcMultisigN";

    fn pool() -> MockPool {
        MockPool::default()
            .with_user(ADDR_A, MSA_M)
            .with_user(ADDR_B, MSA_N)
    }

    fn example_wallet() -> MockWallet {
        MockWallet::default()
            .with_ticket(ticket_hash(1), &[ADDR_A], block_hash(1), NORMAL_FEE)
            .with_ticket(ticket_hash(2), &[ADDR_A], block_hash(1), LOW_FEE)
            .with_ticket(ticket_hash(3), &[ADDR_Z], block_hash(2), NORMAL_FEE)
    }

    fn example_chain() -> MockChain {
        MockChain::default()
            .with_block(block_hash(1), 1000)
            .with_block(block_hash(2), 1001)
    }

    #[tokio::test]
    async fn classifies_example_scenario() {
        let chain = example_chain();
        let wallet = example_wallet();
        let pool = pool();

        let classified = classify_tickets(
            &chain,
            &wallet,
            &pool,
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            classified.live,
            HashMap::from([(ticket_hash(1), MSA_M.to_string())])
        );
        assert_eq!(
            classified.ignored_low_fee,
            HashMap::from([(ticket_hash(2), MSA_M.to_string())])
        );
        assert_eq!(chain.header_requests(&block_hash(1)), 1);
        assert_eq!(chain.header_requests(&block_hash(2)), 0);
        assert_eq!(classified.summary.total, 3);
        assert_eq!(classified.summary.normal_fee, 1);
        assert_eq!(classified.summary.low_fee, 1);
        assert_eq!(classified.summary.skipped, 1);
        assert_eq!(pool.snapshots_taken(), 1);
    }

    #[tokio::test]
    async fn override_wins_over_fee_policy() {
        let chain = example_chain();
        let wallet = example_wallet();
        let pool = pool().with_override(ticket_hash(2), MSA_M);

        let classified = classify_tickets(
            &chain,
            &wallet,
            &pool,
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            classified.live,
            HashMap::from([
                (ticket_hash(1), MSA_M.to_string()),
                (ticket_hash(2), MSA_M.to_string())
            ])
        );
        assert!(classified.ignored_low_fee.is_empty());
        assert_eq!(classified.summary.added_low_fee, 1);
    }

    #[tokio::test]
    async fn override_uses_recorded_multisig_address() {
        let chain = example_chain();
        let wallet = example_wallet();
        let pool = pool().with_override(ticket_hash(2), MSA_N);

        let classified = classify_tickets(
            &chain,
            &wallet,
            &pool,
            &|_: &Transaction, _: u32| FeeVerdict::invalid("always low"),
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.live.get(&ticket_hash(2)), Some(&MSA_N.to_string()));
        assert_eq!(
            classified.ignored_low_fee.get(&ticket_hash(1)),
            Some(&MSA_M.to_string())
        );
    }

    #[tokio::test]
    async fn override_for_unmapped_ticket_is_ignored() {
        let chain = example_chain();
        let wallet = example_wallet();
        let pool = pool().with_override(ticket_hash(3), MSA_M);

        let classified = classify_tickets(
            &chain,
            &wallet,
            &pool,
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert!(!classified.live.contains_key(&ticket_hash(3)));
        assert!(!classified.ignored_low_fee.contains_key(&ticket_hash(3)));
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_run() {
        let wallet = example_wallet().with_failed_enumeration();

        let result = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(ClassifyError::Enumeration(ServerError::RequestFailed(_)))
        ));
        assert!(wallet.transaction_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn enumeration_timeout_aborts_run() {
        let wallet = example_wallet().with_delay(Duration::from_secs(120));

        let result = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default().with_call_timeout(Duration::from_secs(10)),
        )
        .await;

        assert!(matches!(
            result,
            Err(ClassifyError::Enumeration(ServerError::TimedOut(_)))
        ));
    }

    #[tokio::test]
    async fn failed_lookup_only_skips_that_ticket() {
        let wallet = MockWallet::default()
            .with_ticket(ticket_hash(1), &[ADDR_A], block_hash(1), NORMAL_FEE)
            .with_failed_lookup(ticket_hash(2))
            .with_ticket(ticket_hash(3), &[ADDR_B], block_hash(2), NORMAL_FEE)
            .with_ticket(ticket_hash(4), &[ADDR_B], block_hash(2), LOW_FEE);

        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.live.len(), 2);
        assert_eq!(classified.ignored_low_fee.len(), 1);
        assert_eq!(classified.summary.skipped, 1);
        assert!(!classified.live.contains_key(&ticket_hash(2)));
    }

    #[tokio::test]
    async fn overflowing_ticket_values_are_ignored() {
        let mut overflowing = crate::mocks::ticket_transaction(NORMAL_FEE);
        overflowing.inputs[0].value_in = i64::MAX;
        overflowing.inputs.push(overflowing.inputs[0].clone());
        let wallet = MockWallet::default()
            .with_raw_ticket(
                &ticket_hash(4).to_string(),
                &[ADDR_A],
                &block_hash(1).to_string(),
                &overflowing.to_hex().unwrap(),
            )
            .with_ticket(ticket_hash(1), &[ADDR_A], block_hash(1), NORMAL_FEE);

        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            classified.live,
            HashMap::from([(ticket_hash(1), MSA_M.to_string())])
        );
        assert_eq!(
            classified.ignored_low_fee,
            HashMap::from([(ticket_hash(4), MSA_M.to_string())])
        );
        assert_eq!(classified.summary.skipped, 0);
    }

    #[tokio::test]
    async fn per_ticket_decode_failures_are_skipped() {
        let wallet = example_wallet()
            .with_raw_ticket("not-a-hash", &[ADDR_A], &block_hash(1).to_string(), "00")
            .with_raw_ticket(&ticket_hash(5).to_string(), &[ADDR_A], &block_hash(1).to_string(), "zz")
            .with_raw_ticket(
                &ticket_hash(6).to_string(),
                &[ADDR_A],
                "not-a-block",
                &crate::mocks::ticket_transaction(NORMAL_FEE).to_hex().unwrap(),
            )
            .with_raw_ticket(
                &ticket_hash(7).to_string(),
                &[ADDR_A],
                &block_hash(9).to_string(),
                &crate::mocks::ticket_transaction(NORMAL_FEE).to_hex().unwrap(),
            );

        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.summary.total, 7);
        assert_eq!(classified.summary.skipped, 5);
        assert_eq!(
            classified.live.keys().copied().collect::<HashSet<_>>(),
            HashSet::from([ticket_hash(1)])
        );
    }

    #[tokio::test]
    async fn first_matching_address_maps_ticket() {
        let wallet = MockWallet::default().with_ticket(
            ticket_hash(1),
            &[ADDR_Z, ADDR_B, ADDR_A],
            block_hash(1),
            NORMAL_FEE,
        );

        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.live.get(&ticket_hash(1)), Some(&MSA_N.to_string()));
    }

    #[tokio::test]
    async fn fee_policy_error_does_not_change_valid_verdict() {
        let classified = classify_tickets(
            &example_chain(),
            &example_wallet(),
            &pool(),
            &|_: &Transaction, _: u32| FeeVerdict {
                valid: true,
                error: Some("stake pool fee percent unavailable".to_string()),
            },
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.live.len(), 2);
        assert!(classified.ignored_low_fee.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ticket_keeps_last_classification() {
        let wallet = example_wallet().with_duplicate_listing(ticket_hash(2));
        let evaluations = std::sync::atomic::AtomicUsize::new(0);
        // first evaluation of the duplicated ticket passes, the second fails
        let fee_policy = |ticket: &Transaction, height: u32| {
            if ticket.fee() == Some(LOW_FEE)
                && evaluations.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0
            {
                FeeVerdict::valid()
            } else {
                minimum_fee_policy(ticket, height)
            }
        };

        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(classified.summary.total, 4);
        assert!(!classified.live.contains_key(&ticket_hash(2)));
        assert!(classified.ignored_low_fee.contains_key(&ticket_hash(2)));
    }

    #[tokio::test]
    async fn outputs_are_disjoint() {
        let mut wallet = MockWallet::default();
        for n in 1..=40u8 {
            let fee = if n % 3 == 0 { LOW_FEE } else { NORMAL_FEE };
            let owner = if n % 2 == 0 { ADDR_A } else { ADDR_B };
            wallet = wallet.with_ticket(ticket_hash(n), &[owner], block_hash(n % 4), fee);
        }
        let wallet = wallet
            .with_duplicate_listing(ticket_hash(3))
            .with_duplicate_listing(ticket_hash(4));
        let chain = (0..4u8).fold(MockChain::default(), |chain, n| {
            chain.with_block(block_hash(n), 500 + u32::from(n))
        });
        let pool = pool().with_override(ticket_hash(6), MSA_M);

        let classified = classify_tickets(
            &chain,
            &wallet,
            &pool,
            &minimum_fee_policy,
            &ClassifyConfig::default(),
        )
        .await
        .unwrap();

        assert!(
            classified
                .live
                .keys()
                .all(|ticket| !classified.ignored_low_fee.contains_key(ticket))
        );
        assert_eq!(classified.live.len() + classified.ignored_low_fee.len(), 40);
        for n in 0..4u8 {
            assert_eq!(chain.header_requests(&block_hash(n)), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_are_pipelined_up_to_bound() {
        let mut wallet = MockWallet::default().with_delay(Duration::from_millis(50));
        for n in 1..=10u8 {
            wallet = wallet.with_ticket(ticket_hash(n), &[ADDR_A], block_hash(1), NORMAL_FEE);
        }

        let unbounded = ClassifyConfig::default();
        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &unbounded,
        )
        .await
        .unwrap();
        assert_eq!(classified.live.len(), 10);
        assert_eq!(wallet.max_lookups_in_flight(), 10);

        wallet.reset_counters();
        let bounded =
            ClassifyConfig::default().with_max_concurrent_lookups(NonZeroUsize::new(3).unwrap());
        let classified = classify_tickets(
            &example_chain(),
            &wallet,
            &pool(),
            &minimum_fee_policy,
            &bounded,
        )
        .await
        .unwrap();
        assert_eq!(classified.live.len(), 10);
        assert_eq!(wallet.max_lookups_in_flight(), 3);
        assert_eq!(
            wallet.transaction_requests(),
            (1..=10u8).map(|n| ticket_hash(n).to_string()).collect::<Vec<_>>()
        );
    }
}
