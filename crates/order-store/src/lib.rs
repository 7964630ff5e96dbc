//! Persistence for order aggregates and the checkout catalog.
//!
//! Every read-modify-write of an order goes through [`OrderStore::lock_order`],
//! which hands out an exclusive [`OrderTx`] for that order.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCatalogStore, InMemoryOrderStore, InMemoryOrderTx};
pub use postgres::{PostgresCatalogStore, PostgresOrderStore, PostgresOrderTx};
pub use store::{CatalogStore, OrderStore, OrderTx};
