//! Fee policy applied to tickets that are not whitelisted.

use ticket_sync::{FeePolicy, FeeVerdict, Transaction};

/// Accepts a ticket if the fee it paid is at least `min_fee` atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumFeePolicy {
    /// Minimum fee in atoms.
    pub min_fee: i64,
}

impl MinimumFeePolicy {
    /// Creates a policy requiring `min_fee` atoms.
    #[must_use]
    pub fn new(min_fee: i64) -> Self {
        Self { min_fee }
    }
}

impl FeePolicy for MinimumFeePolicy {
    fn evaluate_ticket(&self, ticket: &Transaction, block_height: u32) -> FeeVerdict {
        match ticket.fee() {
            Some(fee) if fee >= self.min_fee => FeeVerdict::valid(),
            Some(fee) => FeeVerdict::invalid(format!(
                "ticket mined at height {block_height} paid {fee} atoms, minimum is {}",
                self.min_fee
            )),
            None => FeeVerdict::invalid(format!(
                "ticket mined at height {block_height} spends more than its inputs or its values overflow"
            )),
        }
    }
}
