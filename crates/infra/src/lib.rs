//! Infrastructure layer: storage backends, transactional services, config.

pub mod account_cascade;
pub mod config;
pub mod error;
pub mod ledger;
pub mod order_service;
pub mod store;


pub use account_cascade::{AccountCascadeCoordinator, CascadeReport, Compensation};
pub use config::{AppConfig, ConfigError};
pub use error::ServiceError;
pub use ledger::InventoryLedger;
pub use order_service::{CancelReceipt, OrderPage, OrderService};
pub use store::{
    InMemoryStore, OrderFilter, OrderSort, PageRequest, PostgresStore, Store, StoreError,
};
