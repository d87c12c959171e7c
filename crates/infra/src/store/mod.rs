//! Transactional storage for products, orders and accounts.
//!
//! Every multi-record mutation runs inside a [`StoreTransaction`]: its writes
//! become visible to other readers only on [`StoreTransaction::commit`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    commit_or_rollback, AccountLock, OrderFilter, OrderSort, PageRequest, ReleaseOutcome,
    ReserveOutcome, Store, StoreError, StoreTransaction,
};
