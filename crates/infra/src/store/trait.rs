use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use stockroom_auth::Account;
use stockroom_core::{DomainError, DomainResult, OrderId, ProductId, UserId};
use stockroom_inventory::Product;
use stockroom_orders::{Order, OrderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed while executing `operation`.
    #[error("storage error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// A concurrent writer won (unique violation, serialization failure).
    #[error("concurrent modification in {0}")]
    Conflict(String),

    /// A stored row could not be decoded back into a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// Result of a conditional "decrement iff stock ≥ quantity".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { remaining: u32 },
    Insufficient { available: u32 },
    ProductMissing,
    SizeMissing,
}

/// Result of an unconditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { stock: u32 },
    ProductMissing,
    SizeMissing,
}

/// Listing order. Ties fall back to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderSort {
    #[default]
    Newest,
    Oldest,
    /// Largest total first.
    Highest,
    /// Smallest total first.
    Lowest,
}

impl OrderSort {
    pub fn compare(self, a: &Order, b: &Order) -> Ordering {
        let newest = || {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        };
        match self {
            OrderSort::Newest => newest(),
            OrderSort::Oldest => newest().reverse(),
            OrderSort::Highest => b.total_amount().cmp(&a.total_amount()).then_with(newest),
            OrderSort::Lowest => a.total_amount().cmp(&b.total_amount()).then_with(newest),
        }
    }
}

impl FromStr for OrderSort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(OrderSort::Newest),
            "oldest" => Ok(OrderSort::Oldest),
            "highest" => Ok(OrderSort::Highest),
            "lowest" => Ok(OrderSort::Lowest),
            _ => Err(DomainError::validation(format!(
                "sort must be one of: newest, oldest, highest, lowest (got '{s}')"
            ))),
        }
    }
}

/// One page of a listing, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> DomainResult<Self> {
        if page == 0 {
            return Err(DomainError::validation("page must be at least 1"));
        }
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn page(self) -> u32 {
        self.page
    }

    pub fn limit(self) -> u32 {
        self.limit
    }

    /// Number of rows skipped before this page.
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn total_pages(self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

/// Read filter for order listings.
///
/// `owner` and `status` select rows; `sort` and `page` shape the result.
/// Counting ignores the latter two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub owner: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub sort: OrderSort,
    pub page: Option<PageRequest>,
}

impl OrderFilter {
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn sorted_by(mut self, sort: OrderSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn paged(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.owner.is_none_or(|o| o == order.owner())
            && self.status.is_none_or(|s| s == order.status())
    }
}

/// Row lock strength for [`StoreTransaction::lock_account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLock {
    /// Keeps the account from being deleted; other shared holders proceed.
    Shared,
    /// Waits out every shared holder and blocks new ones.
    Exclusive,
}

/// One atomic unit of work.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Atomically decrement `size` of `product_id` by `quantity` iff enough
    /// stock is left. Never leaves a partial decrement behind.
    async fn reserve_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Atomically increment `size` of `product_id` by `quantity`.
    async fn release_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReleaseOutcome, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Load an order and hold it against concurrent writers until the
    /// transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Load an account and hold it with `lock` until the transaction ends.
    async fn lock_account(
        &mut self,
        id: UserId,
        lock: AccountLock,
    ) -> Result<Option<Account>, StoreError>;

    /// Ids of the orders `owner` holds, as this transaction sees them.
    async fn owned_order_ids(&mut self, owner: UserId) -> Result<Vec<OrderId>, StoreError>;

    /// Returns `false` when the order was already gone.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError>;

    /// Returns `false` when the account was already gone.
    async fn delete_account(&mut self, id: UserId) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage backend: opens transactions and serves committed reads.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// Number of orders matching `filter`, ignoring its sort and page.
    async fn count_orders(&self, filter: OrderFilter) -> Result<u64, StoreError>;

    async fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError>;

    /// Insert or replace a catalog product (seeding; catalog CRUD lives elsewhere).
    async fn put_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Insert or replace an account (seeding; registration lives elsewhere).
    async fn put_account(&self, account: &Account) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get_order(id).await
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders(filter).await
    }

    async fn count_orders(&self, filter: OrderFilter) -> Result<u64, StoreError> {
        (**self).count_orders(filter).await
    }

    async fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        (**self).get_account(id).await
    }

    async fn put_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).put_product(product).await
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        (**self).put_account(account).await
    }
}

/// Commit `tx` when `staged` succeeded, otherwise roll it back and hand the
/// staging error back unchanged.
pub async fn commit_or_rollback<T, E>(
    tx: Box<dyn StoreTransaction>,
    staged: Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed; transaction discarded");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_one_based_and_bounded() {
        let page = PageRequest::new(3, 10).unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.total_pages(21), 3);
        assert_eq!(page.total_pages(0), 0);
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(1, PageRequest::MAX_LIMIT + 1).is_err());
    }

    #[test]
    fn sort_names_parse_in_any_case() {
        assert_eq!("Highest".parse::<OrderSort>().unwrap(), OrderSort::Highest);
        assert_eq!(" oldest ".parse::<OrderSort>().unwrap(), OrderSort::Oldest);
        assert!(matches!(
            "cheapest".parse::<OrderSort>(),
            Err(DomainError::Validation(_))
        ));
    }
}
