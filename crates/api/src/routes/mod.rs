//! Route handlers and the shared application state.

pub mod accounts;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use saga::{FulfillmentProvider, OrderManager, PaymentGateway, ReconciliationEngine};

/// Gateway adapter chosen at startup.
pub type Gateway = Arc<dyn PaymentGateway>;

/// Fulfillment provider adapter chosen at startup.
pub type Provider = Arc<dyn FulfillmentProvider>;

/// Shared application state accessible from all handlers.
pub struct AppState<S, C> {
    pub manager: OrderManager<S, C, Gateway>,
    pub engine: ReconciliationEngine<S, Gateway, Provider>,
    pub provider: Provider,
}
