//! Orders domain module.
//!
//! Order records, line items captured at purchase time, and the status
//! lifecycle. Pure domain logic (no IO, no HTTP, no storage).

pub mod command;
pub mod order;
pub mod status;

pub use command::{PlaceOrder, RequestedItem};
pub use order::{
    CancelOutcome, DEFAULT_CANCELLATION_REASON, LineItem, Order, OrderParts, ShippingAddress,
};
pub use status::{OrderStatus, StatusStateMachine};
