//! Stock counter adjustments inside a store transaction.

use tracing::{debug, warn};

use stockroom_core::{DomainError, ProductId};

use crate::error::ServiceError;
use crate::store::{ReleaseOutcome, ReserveOutcome, StoreTransaction};

/// Atomic conditional decrements and unconditional increments of per-size
/// stock counters.
///
/// The ledger never commits: callers run it inside their own transaction so
/// a multi-line order either reserves every line or none.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Decrement the counter iff at least `quantity` is left.
    ///
    /// Returns the stock remaining after the decrement.
    pub async fn reserve(
        &self,
        tx: &mut dyn StoreTransaction,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<u32, ServiceError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1").into());
        }
        match tx.reserve_stock(product_id, size, quantity).await? {
            ReserveOutcome::Reserved { remaining } => {
                debug!(%product_id, size, quantity, remaining, "stock reserved");
                Ok(remaining)
            }
            ReserveOutcome::Insufficient { available } => Err(DomainError::OutOfStock {
                product_id,
                size: size.to_string(),
                available,
                requested: quantity,
            }
            .into()),
            ReserveOutcome::SizeMissing => Err(DomainError::missing_size(product_id, size).into()),
            ReserveOutcome::ProductMissing => Err(DomainError::missing_product(product_id).into()),
        }
    }

    /// Increment the counter by `quantity`.
    ///
    /// A product or size that no longer exists is skipped with a warning;
    /// returns `None` in that case.
    pub async fn release(
        &self,
        tx: &mut dyn StoreTransaction,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<Option<u32>, ServiceError> {
        match tx.release_stock(product_id, size, quantity).await? {
            ReleaseOutcome::Released { stock } => {
                debug!(%product_id, size, quantity, stock, "stock released");
                Ok(Some(stock))
            }
            ReleaseOutcome::SizeMissing => {
                warn!(%product_id, size, quantity, "size gone; released stock dropped");
                Ok(None)
            }
            ReleaseOutcome::ProductMissing => {
                warn!(%product_id, size, quantity, "product gone; released stock dropped");
                Ok(None)
            }
        }
    }
}
