use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, OrderId, ProductId, UserId};

use crate::status::{OrderStatus, StatusStateMachine};

/// Reason recorded when an administrator cancels without giving one.
pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by admin";

/// Order line: product, size, quantity and the price paid per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents), captured at purchase.
    pub unit_price: u64,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<u64> {
        self.unit_price.checked_mul(u64::from(self.quantity))
    }
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone_number: String,
}

impl ShippingAddress {
    pub fn validate(&self) -> DomainResult<()> {
        let full_name = self.full_name.trim().chars().count();
        if !(2..=100).contains(&full_name) {
            return Err(DomainError::validation(
                "full name must be between 2 and 100 characters",
            ));
        }
        if !looks_like_email(self.email.trim()) {
            return Err(DomainError::validation("please provide a valid email address"));
        }
        let address = self.address.trim().chars().count();
        if !(5..=200).contains(&address) {
            return Err(DomainError::validation(
                "address must be between 5 and 200 characters",
            ));
        }
        for (field, value) in [
            ("city", &self.city),
            ("state", &self.state),
            ("zip code", &self.zip_code),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{field} is required")));
            }
        }
        if !looks_like_phone(self.phone_number.trim()) {
            return Err(DomainError::validation("please provide a valid phone number"));
        }
        Ok(())
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

fn looks_like_phone(s: &str) -> bool {
    let body = s.strip_prefix('+').unwrap_or(s);
    let mut digits = 0usize;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '(' | ')' | '-' | '.' | ' ' => {}
            _ => return false,
        }
    }
    (10..=15).contains(&digits)
}

/// What a successful cancellation requires from the inventory side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub previous: OrderStatus,
    /// Every line item must be released back to stock.
    pub restore_stock: bool,
}

/// Storage shape of an order, used to rebuild one without re-running
/// creation checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParts {
    pub id: OrderId,
    pub owner: UserId,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub total_amount: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
}

/// A customer order.
///
/// `total_amount` is the snapshot taken at creation; it is never recomputed
/// from catalog prices afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OrderParts", into = "OrderParts")]
pub struct Order {
    id: OrderId,
    owner: UserId,
    items: Vec<LineItem>,
    shipping_address: ShippingAddress,
    status: OrderStatus,
    total_amount: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancellation_reason: Option<String>,
}

impl Order {
    /// Create a `Pending` order from line items whose prices were captured at
    /// reservation time.
    ///
    /// `total_amount` must equal the sum of the line subtotals.
    pub fn place(
        id: OrderId,
        owner: UserId,
        items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        total_amount: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        let mut computed: u64 = 0;
        for item in &items {
            if item.quantity == 0 {
                return Err(DomainError::validation("quantity must be at least 1"));
            }
            computed = item
                .subtotal()
                .and_then(|s| computed.checked_add(s))
                .ok_or_else(|| DomainError::validation("order total overflows"))?;
        }
        if computed != total_amount {
            return Err(DomainError::validation(format!(
                "totalAmount {total_amount} does not match line items total {computed}"
            )));
        }

        Ok(Self {
            id,
            owner,
            items,
            shipping_address,
            status: OrderStatus::Pending,
            total_amount,
            created_at: now,
            updated_at: now,
            cancellation_reason: None,
        })
    }

    pub fn restore(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            owner: parts.owner,
            items: parts.items,
            shipping_address: parts.shipping_address,
            status: parts.status,
            total_amount: parts.total_amount,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            cancellation_reason: parts.cancellation_reason,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Dedicated cancellation path.
    ///
    /// Rejects `Delivered` and `Cancelled` orders. The returned outcome tells
    /// the caller whether stock has to be released, per
    /// [`StatusStateMachine::cancel_restores_stock`].
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<CancelOutcome> {
        match self.status {
            OrderStatus::Delivered => {
                return Err(DomainError::conflict(
                    "cannot cancel an order that has already been delivered",
                ));
            }
            OrderStatus::Cancelled => {
                return Err(DomainError::conflict("order is already cancelled"));
            }
            _ => {}
        }
        let previous = self.status;
        StatusStateMachine::validate(previous, OrderStatus::Cancelled)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());

        self.status = OrderStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.updated_at = now;

        Ok(CancelOutcome {
            previous,
            restore_stock: StatusStateMachine::cancel_restores_stock(previous),
        })
    }

    /// Generic administrative status change. Never implies a stock release,
    /// even when `target` is `Cancelled`.
    pub fn transition_to(&mut self, target: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        StatusStateMachine::validate(self.status, target)?;
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}

impl From<OrderParts> for Order {
    fn from(parts: OrderParts) -> Self {
        Order::restore(parts)
    }
}

impl From<Order> for OrderParts {
    fn from(order: Order) -> Self {
        OrderParts {
            id: order.id,
            owner: order.owner,
            items: order.items,
            shipping_address: order.shipping_address,
            status: order.status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
            cancellation_reason: order.cancellation_reason,
        }
    }
}
