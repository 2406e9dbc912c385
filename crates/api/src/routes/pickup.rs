//! Pickup confirmation endpoint.
//!
//! Reached by scanning the QR code shown to the customer, so it carries no
//! caller identity. Possession of an unexpired token is the authorization.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use order_store::OrderRepository;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupResponse {
    pub order_id: String,
    pub status: String,
    pub payment_status: String,
    pub pickup_verified_at: Option<DateTime<Utc>>,
}

/// GET|POST /orders/pickup/{token}/confirm
#[tracing::instrument(skip_all)]
pub async fn confirm<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
) -> Result<Json<PickupResponse>, ApiError> {
    let order = state.controller.confirm_pickup(token.trim()).await?;
    Ok(Json(PickupResponse {
        order_id: order.id().to_string(),
        status: order.status().to_string(),
        payment_status: order.payment_status().to_string(),
        pickup_verified_at: order.pickup_verified_at(),
    }))
}
