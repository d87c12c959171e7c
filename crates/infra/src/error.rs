use thiserror::Error;

use stockroom_auth::AuthzError;
use stockroom_core::{DomainError, Missing, ProductId};

use crate::store::StoreError;

/// Failure of an order or account operation, as seen by callers.
///
/// Every variant leaves storage as it was before the operation started.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or incomplete request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced product, size, order or account does not exist.
    #[error("{0}")]
    NotFound(Missing),

    /// A requested quantity exceeds what is left for that size.
    #[error(
        "not enough stock for product {product_id} in size {size}. Available: {available}, Requested: {requested}"
    )]
    OutOfStock {
        product_id: ProductId,
        size: String,
        available: u32,
        requested: u32,
    },

    /// The operation is illegal for the record's current state.
    #[error("{0}")]
    StateConflict(String),

    /// The caller may not see or touch this record.
    #[error("{0}")]
    Forbidden(String),

    /// Storage failed; the transaction was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ServiceError {
    /// Short machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::OutOfStock { .. } => "out_of_stock",
            ServiceError::StateConflict(_) => "state_conflict",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Persistence(_) => "persistence",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(missing) => ServiceError::NotFound(missing),
            DomainError::OutOfStock {
                product_id,
                size,
                available,
                requested,
            } => ServiceError::OutOfStock {
                product_id,
                size,
                available,
                requested,
            },
            DomainError::StateConflict(msg) => ServiceError::StateConflict(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Forbidden(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::OrderId;

    #[test]
    fn domain_errors_keep_their_category() {
        let id = OrderId::new();
        assert!(matches!(
            ServiceError::from(DomainError::missing_order(id)),
            ServiceError::NotFound(Missing::Order(found)) if found == id
        ));
        assert!(matches!(
            ServiceError::from(DomainError::invalid_id("x")),
            ServiceError::Validation(_)
        ));
        assert_eq!(
            ServiceError::from(DomainError::conflict("order is already cancelled")).to_string(),
            "order is already cancelled"
        );
    }

    #[test]
    fn authz_errors_are_forbidden() {
        let err = ServiceError::from(AuthzError::NotOwner);
        assert_eq!(err.code(), "forbidden");
    }
}
