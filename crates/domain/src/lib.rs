//! Domain layer for the top-up checkout system.
//!
//! This crate provides:
//! - Order, payment and transaction records with their status machines
//! - Value objects (money, order numbers, customer identity, game account)
//! - The [`OrderAggregate`] that owns every status change

mod macros;

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;
pub mod transaction;

pub use aggregate::{NewOrder, OrderAggregate};
pub use catalog::{CheckoutProduct, GameRef};
pub use error::DomainError;
pub use money::Money;
pub use order::{
    CustomerIdentity, GameAccount, Order, OrderItem, OrderNumber, OrderStatus, ProductId,
    TransactionCode,
};
pub use payment::{NewPayment, Payment, PaymentChannel, PaymentStatus};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
