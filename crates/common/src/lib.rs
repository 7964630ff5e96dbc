//! Shared types for the top-up storefront workspace.

pub mod types;

pub use types::{OrderId, OrderItemId, PaymentId, TransactionId, UserId};
