//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use order_store::StoreError;
use saga::{GatewayError, ProviderError, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request the saga never saw.
    BadRequest(String),
    /// Domain validation or transition error.
    Domain(DomainError),
    /// Saga operation error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Saga(err) => (saga_status(&err), err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InvalidStateTransition { .. } | DomainError::InvariantViolation { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::InvalidQuantity(_)
        | DomainError::InvalidPrice(_)
        | DomainError::AmountOverflow(_)
        | DomainError::InvalidGameData(_)
        | DomainError::InvalidCustomer(_)
        | DomainError::UnknownValue { .. } => StatusCode::BAD_REQUEST,
        DomainError::MissingPayment(_) | DomainError::MissingTransaction(_) => {
            StatusCode::CONFLICT
        }
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::ProductUnavailable(_)
        | SagaError::InvalidQuantity(_)
        | SagaError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
        SagaError::OrderNotFound(_) | SagaError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        SagaError::OrderNotReady(_) | SagaError::Store(StoreError::Conflict(_)) => {
            StatusCode::CONFLICT
        }
        SagaError::Domain(err) => domain_status(err),
        SagaError::Gateway(GatewayError::InvalidSignature) => StatusCode::UNAUTHORIZED,
        SagaError::Gateway(GatewayError::Unavailable(_))
        | SagaError::Provider(ProviderError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::Gateway(GatewayError::Rejected { .. } | GatewayError::InvalidResponse(_))
        | SagaError::Provider(ProviderError::Rejected(_) | ProviderError::InvalidResponse(_)) => {
            StatusCode::BAD_GATEWAY
        }
        SagaError::Provider(ProviderError::AccountVerificationFailed(_)) => {
            StatusCode::BAD_REQUEST
        }
        SagaError::OrderCreationFailed(_)
        | SagaError::Store(_)
        | SagaError::InconsistentState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Money, ProductId};

    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_validation_errors_are_bad_request() {
        assert_eq!(
            status_of(SagaError::ProductUnavailable(ProductId::new("x"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(SagaError::InvalidQuantity(0)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(SagaError::AmountMismatch {
                expected: Money::new(10),
                actual: Money::new(9),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::InvalidCustomer("no email".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_state_conflicts() {
        let transition = DomainError::InvalidStateTransition {
            entity: "order",
            from: "COMPLETED".to_string(),
            to: "CANCELLED".to_string(),
        };
        assert_eq!(status_of(SagaError::Domain(transition)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(SagaError::OrderNotReady("unpaid".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SagaError::Store(StoreError::Conflict("dup".to_string()))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_not_found() {
        assert_eq!(
            status_of(SagaError::OrderNotFound("TU1".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(SagaError::Store(StoreError::NotFound(OrderId::new()))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_upstream_errors() {
        assert_eq!(
            status_of(SagaError::Gateway(GatewayError::InvalidSignature)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(SagaError::Gateway(GatewayError::Unavailable("down".to_string()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SagaError::Provider(ProviderError::Rejected("no".to_string()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SagaError::Provider(ProviderError::AccountVerificationFailed(
                "unknown id".to_string()
            ))),
            StatusCode::BAD_REQUEST
        );
    }
}
