//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{OrderError, ValidationError};
use lifecycle::LifecycleError;
use order_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid caller identity.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Lifecycle operation error.
    Lifecycle(LifecycleError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> (StatusCode, String) {
    let status = match &err {
        LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Forbidden(_) => StatusCode::FORBIDDEN,
        LifecycleError::StoreNotFound(_)
        | LifecycleError::ServiceNotFound(_)
        | LifecycleError::ServiceNotInStore { .. }
        | LifecycleError::OrderNotFound(_)
        | LifecycleError::AttachmentNotFound { .. }
        | LifecycleError::PickupTokenNotFound => StatusCode::NOT_FOUND,
        LifecycleError::PickupTokenExpired { .. } => StatusCode::GONE,
        LifecycleError::InvalidStatusTransition { .. } | LifecycleError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        LifecycleError::InvalidOrder(OrderError::InvariantViolation(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LifecycleError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Attachment(_) | LifecycleError::Blob(_) => StatusCode::BAD_GATEWAY,
        LifecycleError::Store(StoreError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
        LifecycleError::Catalog(_) | LifecycleError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Lifecycle(LifecycleError::Validation(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderId;
    use domain::OrderStatus;

    fn status_of(err: LifecycleError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_lifecycle_errors_map_to_status_codes() {
        assert_eq!(
            status_of(LifecycleError::Validation(ValidationError::InvalidQuantity {
                quantity: 0
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LifecycleError::Forbidden("no".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(LifecycleError::PickupTokenNotFound),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LifecycleError::PickupTokenExpired {
                expired_at: Utc::now()
            }),
            StatusCode::GONE
        );
        assert_eq!(
            status_of(LifecycleError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Ready
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LifecycleError::Conflict(OrderId::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LifecycleError::Store(StoreError::NotFound(OrderId::new()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized("missing x-user-id".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
