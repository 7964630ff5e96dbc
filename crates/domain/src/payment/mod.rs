//! Payment record, statuses and channels.

mod channel;
mod record;
mod state;

pub use channel::PaymentChannel;
pub use record::{NewPayment, Payment};
pub use state::PaymentStatus;
