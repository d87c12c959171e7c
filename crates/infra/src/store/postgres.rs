//! Postgres-backed store.
//!
//! Stock counters live one row per `(product, size)` in `product_sizes`. A
//! reservation locks the counter row, decides on the locked value and then
//! decrements it, so concurrent orders for the same counter serialise on that
//! row and can never drive it negative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_auth::Account;
use stockroom_core::{OrderId, ProductId, UserId};
use stockroom_inventory::{Product, SizeStock};
use stockroom_orders::{LineItem, Order, OrderParts, OrderStatus, ShippingAddress};

use super::r#trait::{
    AccountLock, OrderFilter, OrderSort, ReleaseOutcome, ReserveOutcome, Store, StoreError,
    StoreTransaction,
};

const SCHEMA: &str = include_str!("../../migrations/0001_schema.sql");

const LOCK_STOCK: &str =
    "SELECT stock FROM product_sizes WHERE product_id = $1 AND label = $2 FOR UPDATE";

const ACCOUNT_COLUMNS: &str = "id, first_name, last_name, email, is_admin, created_at";

const ORDER_FILTER: &str =
    "($1::uuid IS NULL OR owner_id = $1) AND ($2::text IS NULL OR status = $2)";

const ORDER_COLUMNS: &str = "id, owner_id, items, shipping_address, status, total_cents, \
                             cancellation_reason, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        info!("database schema ready");
        Ok(())
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        fetch_product(&mut *self.tx, id).await
    }

    async fn reserve_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReserveOutcome, StoreError> {
        let Some(available) = lock_stock(&mut *self.tx, product_id, size).await? else {
            return if product_exists(&mut *self.tx, product_id).await? {
                Ok(ReserveOutcome::SizeMissing)
            } else {
                Ok(ReserveOutcome::ProductMissing)
            };
        };
        if available < quantity {
            return Ok(ReserveOutcome::Insufficient { available });
        }

        let remaining: i64 = sqlx::query_scalar(
            r#"
            UPDATE product_sizes
            SET stock = stock - $3
            WHERE product_id = $1 AND label = $2
            RETURNING stock
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(size)
        .bind(i64::from(quantity))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        Ok(ReserveOutcome::Reserved {
            remaining: stock_from_db(remaining)?,
        })
    }

    async fn release_stock(
        &mut self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ReleaseOutcome, StoreError> {
        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE product_sizes
            SET stock = stock + $3
            WHERE product_id = $1 AND label = $2
            RETURNING stock
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(size)
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("release_stock", e))?;

        if let Some(stock) = stock {
            return Ok(ReleaseOutcome::Released {
                stock: stock_from_db(stock)?,
            });
        }
        if product_exists(&mut *self.tx, product_id).await? {
            Ok(ReleaseOutcome::SizeMissing)
        } else {
            Ok(ReleaseOutcome::ProductMissing)
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, owner_id, items, shipping_address, status, total_cents,
                cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.owner().as_uuid())
        .bind(Json(order.items()))
        .bind(Json(order.shipping_address()))
        .bind(order.status().as_str())
        .bind(cents_to_db(order.total_amount())?)
        .bind(order.cancellation_reason())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("lock_order", e))?;
        row.map(Order::try_from).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, cancellation_reason = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.status().as_str())
        .bind(order.cancellation_reason())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} vanished before update",
                order.id_typed()
            )));
        }
        Ok(())
    }

    async fn lock_account(
        &mut self,
        id: UserId,
        lock: AccountLock,
    ) -> Result<Option<Account>, StoreError> {
        let strength = match lock {
            AccountLock::Shared => "FOR SHARE",
            AccountLock::Exclusive => "FOR UPDATE",
        };
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1 {strength}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_account", e))?;
        Ok(row.map(Account::from))
    }

    async fn owned_order_ids(&mut self, owner: UserId) -> Result<Vec<OrderId>, StoreError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM orders WHERE owner_id = $1 ORDER BY created_at, id")
                .bind(owner.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("owned_order_ids", e))?;
        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_account(&mut self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        fetch_product(&mut *conn, id).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_order", e))?;
        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let limit = filter.page.map(|p| i64::from(p.limit()));
        let offset = filter
            .page
            .map(|p| i64::try_from(p.offset()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE {ORDER_FILTER}
            ORDER BY {order_by}
            LIMIT $3 OFFSET $4
            "#,
            order_by = order_by(filter.sort),
        ))
        .bind(filter.owner.map(|o| *o.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn count_orders(&self, filter: OrderFilter) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {ORDER_FILTER}"))
                .bind(filter.owner.map(|o| *o.as_uuid()))
                .bind(filter.status.map(|s| s.as_str()))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_orders", e))?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count: {count}")))
    }

    async fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_account", e))?;
        Ok(row.map(Account::from))
    }

    async fn put_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("put_product", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(cents_to_db(product.price())?)
        .bind(product.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("put_product", e))?;

        sqlx::query("DELETE FROM product_sizes WHERE product_id = $1")
            .bind(product.id_typed().as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("put_product", e))?;

        for (position, size) in product.sizes().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_sizes (product_id, label, position, stock)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(product.id_typed().as_uuid())
            .bind(&size.label)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(i64::from(size.stock))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("put_product", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("put_product", e))?;
        debug!(product_id = %product.id_typed(), "product stored");
        Ok(())
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, is_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                is_admin = EXCLUDED.is_admin
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.email)
        .bind(account.is_admin)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("put_account", e))?;
        Ok(())
    }
}

async fn fetch_product(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, StoreError> {
    let row: Option<ProductRow> =
        sqlx::query_as("SELECT id, name, price_cents, updated_at FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("load_product", e))?;
    let Some(row) = row else {
        return Ok(None);
    };

    let sizes: Vec<SizeRow> = sqlx::query_as(
        "SELECT label, stock FROM product_sizes WHERE product_id = $1 ORDER BY position",
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_product", e))?;

    let sizes = sizes
        .into_iter()
        .map(|s| Ok(SizeStock::new(s.label, stock_from_db(s.stock)?)))
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Some(Product::from_parts(
        ProductId::from_uuid(row.id),
        row.name,
        cents_from_db(row.price_cents)?,
        sizes,
        row.updated_at,
    )))
}

/// Read a stock counter and hold its row lock until the transaction ends.
async fn lock_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    size: &str,
) -> Result<Option<u32>, StoreError> {
    let stock: Option<i64> = sqlx::query_scalar(LOCK_STOCK)
        .bind(product_id.as_uuid())
        .bind(size)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("lock_stock", e))?;
    stock.map(stock_from_db).transpose()
}

fn order_by(sort: OrderSort) -> &'static str {
    match sort {
        OrderSort::Newest => "created_at DESC, id DESC",
        OrderSort::Oldest => "created_at ASC, id ASC",
        OrderSort::Highest => "total_cents DESC, created_at DESC, id DESC",
        OrderSort::Lowest => "total_cents ASC, created_at DESC, id DESC",
    }
}

async fn product_exists(conn: &mut PgConnection, id: ProductId) -> Result<bool, StoreError> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("product_exists", e))
}

fn stock_from_db(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("stock out of range: {value}")))
}

fn cents_from_db(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("amount out of range: {value}")))
}

fn cents_to_db(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::backend("encode", format!("amount too large: {value}")))
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation, serialization failure, deadlock
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::backend(operation, msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::backend(operation, "connection pool closed"),
        other => StoreError::backend(operation, other.to_string()),
    }
}

struct ProductRow {
    id: Uuid,
    name: String,
    price_cents: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price_cents: row.try_get("price_cents")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

struct SizeRow {
    label: String,
    stock: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SizeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SizeRow {
            label: row.try_get("label")?,
            stock: row.try_get("stock")?,
        })
    }
}

struct OrderRow {
    id: Uuid,
    owner_id: Uuid,
    items: Json<Vec<LineItem>>,
    shipping_address: Json<ShippingAddress>,
    status: String,
    total_cents: i64,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            items: row.try_get("items")?,
            shipping_address: row.try_get("shipping_address")?,
            status: row.try_get("status")?,
            total_cents: row.try_get("total_cents")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, StoreError> {
        let status: OrderStatus = row.status.parse().map_err(|_| {
            StoreError::Corrupt(format!("order {}: status {:?}", row.id, row.status))
        })?;
        Ok(Order::restore(OrderParts {
            id: OrderId::from_uuid(row.id),
            owner: UserId::from_uuid(row.owner_id),
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            status,
            total_amount: cents_from_db(row.total_cents)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            cancellation_reason: row.cancellation_reason,
        }))
    }
}

struct AccountRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            is_admin: row.try_get("is_admin")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: UserId::from_uuid(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_ddl() {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "statement must be re-runnable: {statement}"
            );
        }
    }

    #[test]
    fn schema_forbids_negative_stock() {
        assert!(SCHEMA.contains("CHECK (stock >= 0)"));
    }

    #[test]
    fn stock_is_locked_before_the_shortfall_is_read() {
        assert!(LOCK_STOCK.ends_with("FOR UPDATE"));
    }

    #[test]
    fn every_sort_ends_on_a_unique_key() {
        for sort in [
            OrderSort::Newest,
            OrderSort::Oldest,
            OrderSort::Highest,
            OrderSort::Lowest,
        ] {
            assert!(order_by(sort).contains("id "), "{sort:?} must break ties by id");
        }
    }

    #[test]
    fn db_integers_are_range_checked() {
        assert_eq!(stock_from_db(7).unwrap(), 7);
        assert!(stock_from_db(-1).is_err());
        assert!(cents_from_db(-5).is_err());
        assert!(cents_to_db(u64::MAX).is_err());
    }
}
