use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_auth::Account;
use stockroom_core::{OrderId, ProductId, UserId};
use stockroom_inventory::Product;
use stockroom_orders::Order;

use super::r#trait::{
    AccountLock, OrderFilter, ReleaseOutcome, ReserveOutcome, Store, StoreError,
    StoreTransaction,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    accounts: HashMap<UserId, Account>,
}

/// In-memory store.
///
/// Intended for tests/dev. Transactions are fully serialised: `begin` takes
/// the table lock and holds it until commit or rollback.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Writes go to `staged`; commit swaps it into the guarded tables.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn reserve_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReserveOutcome, StoreError> {
        let Some(product) = self.staged.products.get_mut(&product_id) else {
            return Ok(ReserveOutcome::ProductMissing);
        };
        let Some(available) = product.stock_of(size) else {
            return Ok(ReserveOutcome::SizeMissing);
        };
        if available < quantity {
            return Ok(ReserveOutcome::Insufficient { available });
        }
        product
            .reserve(size, quantity)
            .map(|remaining| ReserveOutcome::Reserved { remaining })
            .map_err(|e| StoreError::backend("reserve_stock", e.to_string()))
    }

    async fn release_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReleaseOutcome, StoreError> {
        let Some(product) = self.staged.products.get_mut(&product_id) else {
            return Ok(ReleaseOutcome::ProductMissing);
        };
        if product.stock_of(size).is_none() {
            return Ok(ReleaseOutcome::SizeMissing);
        }
        product
            .release(size, quantity)
            .map(|stock| ReleaseOutcome::Released { stock })
            .map_err(|e| StoreError::backend("release_stock", e.to_string()))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let id = order.id_typed();
        if self.staged.orders.contains_key(&id) {
            return Err(StoreError::Conflict(format!("order {id} already exists")));
        }
        self.staged.orders.insert(id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        match self.staged.orders.get_mut(&order.id_typed()) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "order {} vanished before update",
                order.id_typed()
            ))),
        }
    }

    // The table lock already excludes every other transaction.
    async fn lock_account(
        &mut self,
        id: UserId,
        _lock: AccountLock,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn owned_order_ids(&mut self, owner: UserId) -> Result<Vec<OrderId>, StoreError> {
        Ok(self
            .staged
            .orders
            .values()
            .filter(|o| o.owner() == owner)
            .map(Order::id_typed)
            .collect())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError> {
        Ok(self.staged.orders.remove(&id).is_some())
    }

    async fn delete_account(&mut self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.staged.accounts.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| filter.sort.compare(a, b));

        if let Some(page) = filter.page {
            let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let take = usize::try_from(page.limit()).unwrap_or(usize::MAX);
            orders = orders.into_iter().skip(skip).take(take).collect();
        }
        Ok(orders)
    }

    async fn count_orders(&self, filter: OrderFilter) -> Result<u64, StoreError> {
        let tables = self.tables.lock().await;
        let count = tables.orders.values().filter(|o| filter.matches(o)).count();
        Ok(count as u64)
    }

    async fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn put_product(&self, product: &Product) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .products
            .insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }
}
