//! Order status lifecycle.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult};

/// Order status.
///
/// `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Processing")]
    Processing,
    #[serde(alias = "Shipped")]
    Shipped,
    #[serde(alias = "Delivered")]
    Delivered,
    #[serde(alias = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Capitalised form used on the HTTP surface.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "status must be one of: pending, processing, shipped, delivered, cancelled (got '{s}')"
                ))
            })
    }
}

/// Transition rules and the stock-restoration policy attached to them.
///
/// Legal moves: `Pending → Processing → Shipped → Delivered`, and
/// `{Pending, Processing, Shipped} → Cancelled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStateMachine;

impl StatusStateMachine {
    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Processing | Shipped, Cancelled)
        )
    }

    pub fn validate(from: OrderStatus, to: OrderStatus) -> DomainResult<()> {
        if from.is_terminal() {
            return Err(DomainError::conflict(format!(
                "order is {from}; no further status changes are allowed"
            )));
        }
        if !Self::can_transition(from, to) {
            return Err(DomainError::conflict(format!(
                "illegal status transition from {from} to {to}"
            )));
        }
        Ok(())
    }

    /// Whether cancelling an order currently in `from` puts its stock back.
    ///
    /// Only `Processing` and `Shipped` qualify. A `Pending` order was
    /// decremented at creation too, yet its cancellation restores nothing;
    /// this mirrors the production accounting and is kept as-is.
    pub fn cancel_restores_stock(from: OrderStatus) -> bool {
        matches!(from, OrderStatus::Processing | OrderStatus::Shipped)
    }

    /// Whether deleting the owning account puts this order's stock back.
    pub fn cascade_restores_stock(status: OrderStatus) -> bool {
        matches!(
            status,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}
