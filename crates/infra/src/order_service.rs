//! Order placement, cancellation, status changes and reads.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, instrument};

use stockroom_auth::Principal;
use stockroom_core::{DomainError, OrderId, ProductId};
use stockroom_orders::{LineItem, Order, OrderStatus, PlaceOrder};

use crate::error::ServiceError;
use crate::ledger::InventoryLedger;
use crate::store::{
    commit_or_rollback, AccountLock, OrderFilter, PageRequest, Store, StoreTransaction,
};

/// A committed cancellation and whether it put stock back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReceipt {
    pub order: Order,
    pub stock_restored: bool,
}

/// One page of an administrative listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Matching orders across all pages.
    pub total: u64,
    pub page: Option<PageRequest>,
}

impl OrderPage {
    pub fn total_pages(&self) -> u64 {
        match self.page {
            Some(page) => page.total_pages(self.total),
            None => u64::from(self.total > 0),
        }
    }
}

/// Order use cases over a transactional [`Store`].
///
/// Each mutating call runs in one store transaction: either every stock
/// counter and the order record change together, or nothing does.
#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
    ledger: InventoryLedger,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: InventoryLedger::new(),
        }
    }

    /// Reserve stock for every line and record a `Pending` order.
    ///
    /// The owning account is share-locked for the whole transaction, so an
    /// order can never be recorded for an account that is being deleted.
    /// Lines are reserved in `(product, size)` order. Any failure (missing
    /// product or size, short stock, total mismatch, storage) rolls back all
    /// reservations made so far.
    #[instrument(
        skip(self, request),
        fields(owner = %request.owner, lines = request.items.len()),
        err
    )]
    pub async fn create_order(&self, request: PlaceOrder) -> Result<Order, ServiceError> {
        let mut tx = self.store.begin().await?;
        let staged = self.stage_create(tx.as_mut(), &request).await;
        let order = commit_or_rollback(tx, staged).await?;

        info!(
            order_id = %order.id_typed(),
            total = order.total_amount(),
            "order placed"
        );
        Ok(order)
    }

    async fn stage_create(
        &self,
        tx: &mut dyn StoreTransaction,
        request: &PlaceOrder,
    ) -> Result<Order, ServiceError> {
        let (address, total) = request.validate()?;
        tx.lock_account(request.owner, AccountLock::Shared)
            .await?
            .ok_or_else(|| DomainError::missing_account(request.owner))?;

        let mut prices: HashMap<ProductId, u64> = HashMap::new();
        for item in request.reservation_order() {
            let product = tx
                .load_product(item.product_id)
                .await?
                .ok_or_else(|| DomainError::missing_product(item.product_id))?;
            self.ledger
                .reserve(tx, item.product_id, &item.size, item.quantity)
                .await?;
            prices.insert(item.product_id, product.price());
        }

        let items = request
            .items
            .iter()
            .map(|item| {
                let unit_price = prices
                    .get(&item.product_id)
                    .copied()
                    .ok_or_else(|| DomainError::missing_product(item.product_id))?;
                Ok(LineItem {
                    product_id: item.product_id,
                    size: item.size.clone(),
                    quantity: item.quantity,
                    unit_price,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let order = Order::place(
            OrderId::new(),
            request.owner,
            items,
            address.clone(),
            total,
            Utc::now(),
        )?;
        tx.insert_order(&order).await?;
        Ok(order)
    }

    /// Administrative cancellation.
    ///
    /// Releases every line back to stock when the order was `Processing` or
    /// `Shipped`. A `Pending` order is cancelled without touching stock.
    #[instrument(skip(self, reason), err)]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<CancelReceipt, ServiceError> {
        let mut tx = self.store.begin().await?;
        let staged = self.stage_cancel(tx.as_mut(), order_id, reason).await;
        let receipt = commit_or_rollback(tx, staged).await?;

        info!(stock_restored = receipt.stock_restored, "order cancelled");
        Ok(receipt)
    }

    async fn stage_cancel(
        &self,
        tx: &mut dyn StoreTransaction,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<CancelReceipt, ServiceError> {
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::missing_order(order_id))?;

        let outcome = order.cancel(reason, Utc::now())?;
        if outcome.restore_stock {
            release_lines(&self.ledger, tx, &order).await?;
        }
        tx.update_order(&order).await?;

        Ok(CancelReceipt {
            order,
            stock_restored: outcome.restore_stock,
        })
    }

    /// Generic status change. Never moves stock, even when `target` is
    /// `Cancelled`; use [`OrderService::cancel_order`] for that.
    #[instrument(skip(self), err)]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, ServiceError> {
        let mut tx = self.store.begin().await?;
        let staged = stage_transition(tx.as_mut(), order_id, target).await;
        let order = commit_or_rollback(tx, staged).await?;

        info!(status = %order.status(), "order status updated");
        Ok(order)
    }

    /// One order, visible to its owner and to administrators.
    pub async fn get_order(
        &self,
        actor: &Principal,
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::missing_order(order_id))?;
        actor.require_owner_or_admin(order.owner())?;
        Ok(order)
    }

    /// The caller's own orders, newest first.
    pub async fn orders_for_user(&self, actor: &Principal) -> Result<Vec<Order>, ServiceError> {
        Ok(self
            .store
            .list_orders(OrderFilter::owned_by(actor.user_id))
            .await?)
    }

    /// Orders matching `filter`, sorted and paged as it asks, with the
    /// total match count. Administrators only.
    pub async fn list_orders(
        &self,
        actor: &Principal,
        filter: OrderFilter,
    ) -> Result<OrderPage, ServiceError> {
        actor.require_admin()?;
        let orders = self.store.list_orders(filter).await?;
        let total = self.store.count_orders(filter).await?;
        Ok(OrderPage {
            orders,
            total,
            page: filter.page,
        })
    }
}

async fn stage_transition(
    tx: &mut dyn StoreTransaction,
    order_id: OrderId,
    target: OrderStatus,
) -> Result<Order, ServiceError> {
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or_else(|| DomainError::missing_order(order_id))?;
    order.transition_to(target, Utc::now())?;
    tx.update_order(&order).await?;
    Ok(order)
}

/// Put every line of `order` back into stock, in `(product, size)` order.
pub(crate) async fn release_lines(
    ledger: &InventoryLedger,
    tx: &mut dyn StoreTransaction,
    order: &Order,
) -> Result<(), ServiceError> {
    let mut lines: Vec<&LineItem> = order.items().iter().collect();
    lines.sort_by(|a, b| {
        a.product_id
            .cmp(&b.product_id)
            .then_with(|| a.size.cmp(&b.size))
    });
    for line in lines {
        ledger
            .release(tx, line.product_id, &line.size, line.quantity)
            .await?;
    }
    Ok(())
}
