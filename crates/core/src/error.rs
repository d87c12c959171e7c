//! Domain error model.

use thiserror::Error;

use crate::id::{OrderId, ProductId, UserId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// What a [`DomainError::NotFound`] failed to locate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Product(ProductId),
    Size { product_id: ProductId, size: String },
    Order(OrderId),
    Account(UserId),
}

impl core::fmt::Display for Missing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Missing::Product(id) => write!(f, "product not found: {id}"),
            Missing::Size { product_id, size } => {
                write!(f, "size {size} not found for product {product_id}")
            }
            Missing::Order(id) => write!(f, "order not found: {id}"),
            Missing::Account(id) => write!(f, "account not found: {id}"),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// missing references, stock exhaustion, lifecycle conflicts). Storage failures
/// belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced product, size, order or account does not exist.
    #[error("{0}")]
    NotFound(Missing),

    /// The requested quantity exceeds the stock left for a size.
    #[error(
        "not enough stock for product {product_id} in size {size}. Available: {available}, Requested: {requested}"
    )]
    OutOfStock {
        product_id: ProductId,
        size: String,
        available: u32,
        requested: u32,
    },

    /// The operation is illegal in the current lifecycle state.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn missing_product(product_id: ProductId) -> Self {
        Self::NotFound(Missing::Product(product_id))
    }

    pub fn missing_size(product_id: ProductId, size: impl Into<String>) -> Self {
        Self::NotFound(Missing::Size {
            product_id,
            size: size.into(),
        })
    }

    pub fn missing_order(order_id: OrderId) -> Self {
        Self::NotFound(Missing::Order(order_id))
    }

    pub fn missing_account(user_id: UserId) -> Self {
        Self::NotFound(Missing::Account(user_id))
    }
}
