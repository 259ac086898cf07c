#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = r#"
# Ticket Sync

## Overview
Ticket-sync is the engine a stake pool uses to decide which of the tickets held by its voting wallet it should vote
on. Tickets fall in two sets:
- Live - tickets owned by a registered depositor that paid the pool fee, or that an operator whitelisted.
- Ignored low fee - tickets owned by a registered depositor that did not pay the pool fee.

Tickets that cannot be mapped to a registered depositor belong to neither set.

The engine does not own any connection or pool state. Callers supply a chain node and a wallet through the
[`ChainSource`] and [`WalletSource`] traits, the pool's user table and whitelist through [`VotingConfigStore`] and
[`LowFeeOverrides`], and the fee rules through [`FeePolicy`].

## Terminology
- Ticket - stake transaction granting the right to vote in the future.
- Depositor address - address of the user that funded a ticket. Keys the pool's voting configuration.
- Multisig address (MSA) - address controlled jointly by the user and the pool. Each classified ticket maps to the
  MSA of its owner.
- Override - ticket whitelisted by an operator despite failing fee validation.
- Classification run - a single pass of [`classify_tickets`].

## Classification run
1. Copy the voting configuration table, releasing its lock before any network call.
2. Fetch all mature tickets from the wallet. Failure aborts the run.
3. Fetch the transaction of every ticket from the wallet, keeping a bounded number of requests in flight and
   collecting responses in request order.
4. Map each ticket to its owner from the first output address found in the voting configuration.
5. Whitelisted tickets become live without fee evaluation.
6. Otherwise decode the ticket, resolve the height of its block through a per-run cache and evaluate the fee
   policy, classifying the ticket as live or ignored.
7. Log a summary of the run.

Any failure while handling a single ticket is logged and the ticket is skipped; the run carries on with the rest.
"#]

pub(crate) mod client;
pub mod classify;
pub mod config;
pub mod error;
pub mod pool;

#[cfg(test)]
pub(crate) mod mocks;

pub use classify::{ClassifiedTickets, TicketSummary, classify_tickets, height::BlockHeightCache};
pub use config::ClassifyConfig;
pub use pool::hash::Hash;
pub use pool::traits::{ChainSource, FeePolicy, LowFeeOverrides, VotingConfigStore, WalletSource};
pub use pool::transaction::Transaction;
pub use pool::{BlockHeader, FeeVerdict, TransactionDetail, TransactionOutputDetail, UserVotingConfig};
