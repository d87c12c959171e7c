//! Inventory domain module.
//!
//! This crate contains the per-size stock counters of catalog products and the
//! rules for decrementing/incrementing them, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod product;

pub use product::{Product, SizeStock};
