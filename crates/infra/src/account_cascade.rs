//! Account deletion with compensation of the account's orders.

use tracing::{info, instrument, warn};

use stockroom_core::{DomainError, OrderId, UserId};
use stockroom_orders::{Order, StatusStateMachine};

use crate::error::ServiceError;
use crate::ledger::InventoryLedger;
use crate::order_service::release_lines;
use crate::store::{commit_or_rollback, AccountLock, OrderFilter, Store, StoreTransaction};

/// Compensation rounds before giving up on an account that keeps receiving
/// orders while it is being deleted.
const MAX_SWEEPS: usize = 4;

/// What happened to a single order during compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Order deleted; `restored` tells whether its lines went back to stock.
    Deleted { restored: bool },
    /// A previous (possibly interrupted) run already handled it.
    AlreadyGone,
}

/// Outcome of the final, account-deleting transaction.
#[derive(Debug)]
enum Removal {
    Deleted { existed: bool },
    /// Orders placed after the last sweep; compensate them and try again.
    OrdersRemain(Vec<OrderId>),
}

/// Summary of a completed account deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeReport {
    pub user_id: UserId,
    pub orders_deleted: usize,
    pub orders_restored: usize,
}

/// Deletes an account together with every order it owns.
///
/// Each order is compensated in its own transaction: stock is released when
/// the order was `Processing`, `Shipped` or `Delivered`, and the order row is
/// removed in the same commit. An interrupted run can therefore be retried
/// without releasing anything twice.
///
/// The account row itself goes last, in a transaction that holds it
/// exclusively and finds no orders left. Order placement share-locks the same
/// row, so no order can outlive its account.
#[derive(Debug, Clone)]
pub struct AccountCascadeCoordinator<S> {
    store: S,
    ledger: InventoryLedger,
}

impl<S: Store> AccountCascadeCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: InventoryLedger::new(),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn delete_account(&self, user_id: UserId) -> Result<CascadeReport, ServiceError> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| DomainError::missing_account(user_id))?;
        if account.is_admin {
            return Err(DomainError::conflict("cannot delete admin accounts").into());
        }

        let mut report = CascadeReport {
            user_id,
            orders_deleted: 0,
            orders_restored: 0,
        };
        let mut pending: Vec<OrderId> = self
            .store
            .list_orders(OrderFilter::owned_by(user_id))
            .await?
            .iter()
            .map(Order::id_typed)
            .collect();

        for sweep in 1..=MAX_SWEEPS {
            self.compensate_all(user_id, &pending, &mut report).await?;

            let mut tx = self.store.begin().await?;
            let staged = stage_removal(tx.as_mut(), user_id).await;
            match commit_or_rollback(tx, staged).await? {
                Removal::Deleted { existed } => {
                    if !existed {
                        warn!(%user_id, "account vanished during deletion");
                    }
                    info!(
                        %user_id,
                        orders_deleted = report.orders_deleted,
                        orders_restored = report.orders_restored,
                        "account deleted"
                    );
                    return Ok(report);
                }
                Removal::OrdersRemain(ids) => {
                    warn!(
                        %user_id,
                        sweep,
                        late_orders = ids.len(),
                        "orders placed during deletion"
                    );
                    pending = ids;
                }
            }
        }

        Err(DomainError::conflict(
            "orders kept arriving while the account was being deleted",
        )
        .into())
    }

    async fn compensate_all(
        &self,
        user_id: UserId,
        orders: &[OrderId],
        report: &mut CascadeReport,
    ) -> Result<(), ServiceError> {
        for &order_id in orders {
            match self.compensate_order(order_id).await {
                Ok(Compensation::Deleted { restored }) => {
                    report.orders_deleted += 1;
                    if restored {
                        report.orders_restored += 1;
                    }
                }
                Ok(Compensation::AlreadyGone) => {}
                Err(err) => {
                    warn!(
                        %user_id,
                        %order_id,
                        compensated = report.orders_deleted,
                        error = %err,
                        "account deletion interrupted; safe to retry"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Release (when the status calls for it) and delete one order, atomically.
    #[instrument(skip(self), err)]
    pub async fn compensate_order(&self, order_id: OrderId) -> Result<Compensation, ServiceError> {
        let mut tx = self.store.begin().await?;
        let staged = self.stage_compensation(tx.as_mut(), order_id).await;
        commit_or_rollback(tx, staged).await
    }

    async fn stage_compensation(
        &self,
        tx: &mut dyn StoreTransaction,
        order_id: OrderId,
    ) -> Result<Compensation, ServiceError> {
        let Some(order) = tx.lock_order(order_id).await? else {
            return Ok(Compensation::AlreadyGone);
        };

        let restored = StatusStateMachine::cascade_restores_stock(order.status());
        if restored {
            release_lines(&self.ledger, tx, &order).await?;
        }
        tx.delete_order(order_id).await?;
        Ok(Compensation::Deleted { restored })
    }
}

async fn stage_removal(
    tx: &mut dyn StoreTransaction,
    user_id: UserId,
) -> Result<Removal, ServiceError> {
    if tx.lock_account(user_id, AccountLock::Exclusive).await?.is_none() {
        return Ok(Removal::Deleted { existed: false });
    }
    let remaining = tx.owned_order_ids(user_id).await?;
    if !remaining.is_empty() {
        return Ok(Removal::OrdersRemain(remaining));
    }
    let existed = tx.delete_account(user_id).await?;
    Ok(Removal::Deleted { existed })
}
