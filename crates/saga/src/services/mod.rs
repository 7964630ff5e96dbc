//! External service traits, HTTP clients and in-memory implementations.

pub mod catalog;
pub mod gateway;
pub mod provider;
pub mod snap;
pub mod topup;

pub use catalog::CatalogService;
pub use gateway::{
    CustomerDetails, GatewayError, GatewayNotification, GatewayStatus, GatewayStatusReport,
    GatewayToken, InMemoryPaymentGateway, ItemDetail, PaymentGateway, TokenRequest,
    compute_admin_fee, format_gross_amount, notification_signature, parse_gross_amount,
};
pub use provider::{
    FulfillmentProvider, InMemoryFulfillmentProvider, PlaceBehavior, PlaceOrderRequest,
    PlacedOrder, ProviderError, ProviderStatus, ProviderStatusReport, VerifiedAccount,
};
pub use snap::SnapGatewayClient;
pub use topup::{TopUpProviderClient, request_signature};
