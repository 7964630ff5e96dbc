//! Order fulfillment saga for game top-ups.
//!
//! This crate takes an order from checkout to delivery:
//! 1. Checkout: create the order, open a payment with the gateway
//! 2. Payment: reconcile gateway notifications and polls
//! 3. Fulfillment: place the order with the provider and track delivery
//!
//! Each step is a locked read-modify-write of one order. The composite
//! [`SagaState`] is derived from the order, payment and transaction statuses.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod services;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryPolicy, SagaConfig};
pub use engine::{Outcome, Reconciled, ReconciliationEngine};
pub use error::SagaError;
pub use manager::{CheckoutReceipt, CheckoutRequest, OrderManager};
pub use services::{
    CatalogService, FulfillmentProvider, GatewayError, GatewayNotification, GatewayStatus,
    GatewayStatusReport, GatewayToken, InMemoryFulfillmentProvider, InMemoryPaymentGateway,
    PaymentGateway, PlaceBehavior, PlaceOrderRequest, PlacedOrder, ProviderError, ProviderStatus,
    ProviderStatusReport, SnapGatewayClient, TopUpProviderClient, VerifiedAccount,
};
pub use state::SagaState;
