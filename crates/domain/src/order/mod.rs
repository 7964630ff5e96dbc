//! Order records and value objects.

mod record;
mod state;
mod value_objects;

pub use record::{Order, OrderItem};
pub use state::OrderStatus;
pub use value_objects::{
    CustomerIdentity, GameAccount, OrderNumber, ProductId, TransactionCode,
};
