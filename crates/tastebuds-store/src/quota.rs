//! Credit and batch-cap lookups consulted during admission.

use tastebuds_core::Result;

use crate::types::Tier;

/// Read side of the quota bookkeeping.
///
/// The debit itself happens inside the batch-creation transaction, so this
/// trait only answers the pre-flight questions.
pub trait QuotaLedger: Send + Sync {
    /// Current credit balance. Unknown owners have zero credits.
    fn credits(&self, owner_id: &str) -> Result<i64>;

    /// Subscription tier. Unknown owners are on the free tier.
    fn tier(&self, owner_id: &str) -> Result<Tier>;

    /// Number of batches the owner has created so far.
    fn count_batches(&self, owner_id: &str) -> Result<i64>;
}
