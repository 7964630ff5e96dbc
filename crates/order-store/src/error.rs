use common::OrderId;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A unique key is already taken (order number, transaction code).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into domain values.
    #[error("Corrupt stored data: {0}")]
    Corrupt(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A value does not fit the column it is written to.
    #[error("Value {value} does not fit column {column}")]
    OutOfRange { column: &'static str, value: u64 },

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if re-reading state and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
