//! Fulfillment transaction record and statuses.

mod record;
mod state;

pub use record::Transaction;
pub use state::{TransactionKind, TransactionStatus};
