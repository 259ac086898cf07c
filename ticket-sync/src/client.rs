//! Module for handling all requests to the chain node and the wallet

use std::future::Future;
use std::time::Duration;

use futures::{StreamExt as _, stream};

use crate::config::ClassifyConfig;
use crate::error::ServerError;
use crate::pool::TransactionDetail;
use crate::pool::hash::Hash;
use crate::pool::traits::{ChainSource, WalletSource};

/// Awaits `request`, failing with [`ServerError::TimedOut`] if no response arrives within `call_timeout`.
async fn with_deadline<T, E, F>(call_timeout: Duration, request: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(call_timeout, request).await {
        Ok(response) => response.map_err(ServerError::request_failed),
        Err(_elapsed) => Err(ServerError::TimedOut(call_timeout)),
    }
}

/// Gets the hashes of all mature tickets held by the wallet.
pub(crate) async fn get_tickets<W>(
    wallet: &W,
    call_timeout: Duration,
) -> Result<Vec<String>, ServerError>
where
    W: WalletSource,
{
    with_deadline(call_timeout, wallet.get_tickets(false)).await
}

/// Gets the wallet transaction of every ticket in `txids`.
///
/// Up to `max_concurrent_lookups` requests are sent before any response is awaited, so the total latency is close
/// to a single round trip for each batch rather than one per ticket. Responses are returned in the order of
/// `txids`.
pub(crate) async fn get_transactions<W>(
    wallet: &W,
    txids: &[String],
    config: &ClassifyConfig,
) -> Vec<Result<TransactionDetail, ServerError>>
where
    W: WalletSource,
{
    stream::iter(txids)
        .map(|txid| with_deadline(config.call_timeout, wallet.get_transaction(txid)))
        .buffered(config.max_concurrent_lookups.get())
        .collect()
        .await
}

/// Gets the height of the block with hash `block_hash`.
pub(crate) async fn get_block_height<C>(
    chain: &C,
    block_hash: &Hash,
    call_timeout: Duration,
) -> Result<u32, ServerError>
where
    C: ChainSource,
{
    let header = with_deadline(call_timeout, chain.get_block_header(block_hash)).await?;

    Ok(header.height)
}
