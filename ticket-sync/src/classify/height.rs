//! Block height resolution for a single classification run.

use std::collections::HashMap;
use std::time::Duration;

use crate::client;
use crate::error::ServerError;
use crate::pool::hash::Hash;
use crate::pool::traits::ChainSource;

/// Memoizes block hash to height lookups so tickets mined in the same block cost one header request.
///
/// Entries are never evicted. A cache must not outlive the classification run it was created for.
#[derive(Debug, Default)]
pub struct BlockHeightCache {
    heights: HashMap<Hash, u32>,
}

impl BlockHeightCache {
    /// Constructs an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached height of `block_hash`.
    #[must_use]
    pub fn get(&self, block_hash: &Hash) -> Option<u32> {
        self.heights.get(block_hash).copied()
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    /// Returns true if no block is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Returns the height of `block_hash`, fetching its header from `chain` on a cache miss.
    ///
    /// Failed lookups are not cached.
    pub async fn resolve<C>(
        &mut self,
        chain: &C,
        block_hash: &Hash,
        call_timeout: Duration,
    ) -> Result<u32, ServerError>
    where
        C: ChainSource,
    {
        if let Some(height) = self.get(block_hash) {
            return Ok(height);
        }

        let height = client::get_block_height(chain, block_hash, call_timeout).await?;
        self.heights.insert(*block_hash, height);

        Ok(height)
    }
}
