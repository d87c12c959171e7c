use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId};

/// Stock counter for one size of a product.
///
/// `stock` is unsigned, so it can never go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStock {
    pub label: String,
    pub stock: u32,
}

impl SizeStock {
    pub fn new(label: impl Into<String>, stock: u32) -> Self {
        Self {
            label: label.into(),
            stock,
        }
    }
}

/// Catalog product with its ordered per-size stock levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    /// Price in smallest currency unit (e.g., cents).
    price: u64,
    sizes: Vec<SizeStock>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: u64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            sizes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Builder-style helper for seeding a size.
    pub fn with_size(mut self, label: impl Into<String>, stock: u32) -> Self {
        self.sizes.push(SizeStock::new(label, stock));
        self
    }

    /// Rebuild a product from storage.
    pub fn from_parts(
        id: ProductId,
        name: String,
        price: u64,
        sizes: Vec<SizeStock>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            price,
            sizes,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn sizes(&self) -> &[SizeStock] {
        &self.sizes
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Current stock of `label`, or `None` when the product has no such size.
    pub fn stock_of(&self, label: &str) -> Option<u32> {
        self.sizes.iter().find(|s| s.label == label).map(|s| s.stock)
    }

    /// Test-and-decrement a size counter.
    ///
    /// Either the whole `quantity` is taken or nothing changes. Returns the
    /// stock left after the decrement.
    pub fn reserve(&mut self, label: &str, quantity: u32) -> DomainResult<u32> {
        ensure_positive(quantity)?;
        let id = self.id;
        let entry = self.size_mut(label)?;
        if entry.stock < quantity {
            return Err(DomainError::OutOfStock {
                product_id: id,
                size: label.to_string(),
                available: entry.stock,
                requested: quantity,
            });
        }
        entry.stock -= quantity;
        let remaining = entry.stock;
        self.updated_at = Utc::now();
        Ok(remaining)
    }

    /// Increment a size counter by `quantity`. Returns the new stock.
    pub fn release(&mut self, label: &str, quantity: u32) -> DomainResult<u32> {
        ensure_positive(quantity)?;
        let entry = self.size_mut(label)?;
        entry.stock = entry
            .stock
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("stock counter overflow"))?;
        let stock = entry.stock;
        self.updated_at = Utc::now();
        Ok(stock)
    }

    fn size_mut(&mut self, label: &str) -> DomainResult<&mut SizeStock> {
        let id = self.id;
        self.sizes
            .iter_mut()
            .find(|s| s.label == label)
            .ok_or_else(|| DomainError::missing_size(id, label))
    }
}

fn ensure_positive(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sneaker(stock: u32) -> Product {
        Product::new(ProductId::new(), "Runner", 12_000)
            .with_size("9", stock)
            .with_size("10", 4)
    }

    #[test]
    fn reserve_decrements_only_the_named_size() {
        let mut p = sneaker(10);
        assert_eq!(p.reserve("9", 3).unwrap(), 7);
        assert_eq!(p.stock_of("9"), Some(7));
        assert_eq!(p.stock_of("10"), Some(4));
    }

    #[test]
    fn reserve_can_deplete_exactly() {
        let mut p = sneaker(5);
        assert_eq!(p.reserve("9", 5).unwrap(), 0);

        let err = p.reserve("9", 1).unwrap_err();
        assert_eq!(
            err,
            DomainError::OutOfStock {
                product_id: p.id_typed(),
                size: "9".to_string(),
                available: 0,
                requested: 1,
            }
        );
        assert_eq!(p.stock_of("9"), Some(0));
    }

    #[test]
    fn unknown_size_is_not_found() {
        let mut p = sneaker(5);
        let err = p.reserve("13", 1).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        let err = p.release("13", 1).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut p = sneaker(5);
        assert!(matches!(p.reserve("9", 0), Err(DomainError::Validation(_))));
        assert!(matches!(p.release("9", 0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn release_overflow_leaves_counter_untouched() {
        let mut p = Product::new(ProductId::new(), "Runner", 1).with_size("9", u32::MAX);
        assert!(p.release("9", 1).is_err());
        assert_eq!(p.stock_of("9"), Some(u32::MAX));
    }

    proptest! {
        #[test]
        fn granted_reservations_never_exceed_initial_stock(
            initial in 0u32..50,
            requests in proptest::collection::vec(1u32..8, 0..30),
        ) {
            let mut p = Product::new(ProductId::new(), "Runner", 1).with_size("9", initial);
            let mut granted = 0u32;
            for q in requests {
                let before = p.stock_of("9").unwrap();
                match p.reserve("9", q) {
                    Ok(left) => {
                        granted += q;
                        prop_assert_eq!(left, before - q);
                    }
                    Err(_) => prop_assert_eq!(p.stock_of("9").unwrap(), before),
                }
            }
            prop_assert!(granted <= initial);
            prop_assert_eq!(p.stock_of("9").unwrap(), initial - granted);
        }

        #[test]
        fn release_reverses_reserve(initial in 1u32..100, take in 1u32..100) {
            let mut p = Product::new(ProductId::new(), "Runner", 1).with_size("9", initial);
            if p.reserve("9", take).is_ok() {
                p.release("9", take).unwrap();
            }
            prop_assert_eq!(p.stock_of("9"), Some(initial));
        }
    }
}
