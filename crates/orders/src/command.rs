//! Order placement request.

use stockroom_core::{DomainError, DomainResult, ProductId, UserId};

use crate::order::ShippingAddress;

/// One requested line: which product, which size, how many.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
}

/// Request to place an order on behalf of `owner`.
///
/// Address and total are optional here so that missing fields surface as a
/// validation failure instead of a decoding error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub owner: UserId,
    pub items: Vec<RequestedItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub total_amount: Option<u64>,
}

impl PlaceOrder {
    /// Check request shape before any stock is touched.
    pub fn validate(&self) -> DomainResult<(&ShippingAddress, u64)> {
        let (address, total) = match (&self.shipping_address, self.total_amount) {
            (Some(address), Some(total)) if !self.items.is_empty() => (address, total),
            _ => {
                return Err(DomainError::validation(
                    "please provide all required order details",
                ));
            }
        };
        for item in &self.items {
            if item.size.trim().is_empty() {
                return Err(DomainError::validation("size is required for each item"));
            }
            if item.quantity == 0 {
                return Err(DomainError::validation("quantity must be at least 1"));
            }
        }
        if total == 0 {
            return Err(DomainError::validation("total amount must be greater than 0"));
        }
        address.validate()?;
        Ok((address, total))
    }

    /// Line items sorted by `(product, size)`: the global order in which
    /// stock counters are locked, so two orders touching the same products
    /// always contend in the same sequence.
    pub fn reservation_order(&self) -> Vec<&RequestedItem> {
        let mut items: Vec<&RequestedItem> = self.items.iter().collect();
        items.sort_by(|a, b| {
            a.product_id
                .cmp(&b.product_id)
                .then_with(|| a.size.cmp(&b.size))
        });
        items
    }
}
