//! Order placement, listing, status and attachment endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use common::{FileId, OrderId, ServiceId, StoreId};
use domain::{
    AttachmentRef, OptionSelection, Order, OrderItem, OrderStatus, PaymentStatus, Quantity,
    SelectedOption, StatusUpdate, ValidationError,
};
use lifecycle::{CreateOrder, OrderController, Page, PresenceDirectory, UploadedFile};
use order_store::OrderRepository;
use serde::{Deserialize, Serialize};

use crate::auth::Authenticated;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R: OrderRepository> {
    pub controller: OrderController<R>,
    pub presence: PresenceDirectory,
}

// -- Request types --

/// Raw create request as it arrives over JSON or multipart.
///
/// `quantity` and `selectedOptions` stay untyped until `validate`, since
/// multipart delivers them as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderForm {
    pub store_id: Option<String>,
    pub service_id: Option<String>,
    pub quantity: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub selected_options: Option<serde_json::Value>,
    pub currency: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn parse_id<T: FromStr>(raw: &str, field: &'static str) -> Result<T, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::invalid(field, format!("'{raw}' is not a valid id")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CreateOrderForm {
    /// Checks every field and produces the typed request.
    pub fn validate(self) -> Result<CreateOrder, ValidationError> {
        let store_id: StoreId = parse_id(required(&self.store_id, "storeId")?, "storeId")?;
        let service_id: ServiceId =
            parse_id(required(&self.service_id, "serviceId")?, "serviceId")?;

        let quantity = match self.quantity {
            None | Some(serde_json::Value::Null) => {
                return Err(ValidationError::MissingField("quantity"));
            }
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| ValidationError::invalid("quantity", "must be an integer"))?,
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::invalid("quantity", "must be an integer"))?,
            Some(_) => return Err(ValidationError::invalid("quantity", "must be an integer")),
        };
        let quantity = Quantity::new(quantity)?;

        let selected_options = match self.selected_options {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => Vec::new(),
            Some(serde_json::Value::String(s)) => serde_json::from_str(&s)
                .map_err(|e| ValidationError::invalid("selectedOptions", e.to_string()))?,
            Some(value) => serde_json::from_value::<Vec<OptionSelection>>(value)
                .map_err(|e| ValidationError::invalid("selectedOptions", e.to_string()))?,
        };

        Ok(CreateOrder {
            store_id,
            service_id,
            quantity,
            selected_options,
            notes: non_blank(self.notes),
            currency: non_blank(self.currency),
        })
    }
}

/// Create request body plus any uploaded files.
pub struct CreateOrderPayload {
    pub form: CreateOrderForm,
    pub files: Vec<UploadedFile>,
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart field: {e}")))
}

impl CreateOrderPayload {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = CreateOrderForm::default();
        let mut files = Vec::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "files" | "file" => {
                    let filename = field.file_name().map(str::to_string);
                    let mime_type = field.content_type().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?;
                    files.push(UploadedFile {
                        filename,
                        mime_type,
                        data: data.to_vec(),
                    });
                }
                "storeId" => form.store_id = Some(field_text(field).await?),
                "serviceId" => form.service_id = Some(field_text(field).await?),
                "quantity" => {
                    form.quantity = Some(serde_json::Value::String(field_text(field).await?));
                }
                "notes" => form.notes = Some(field_text(field).await?),
                "selectedOptions" => {
                    form.selected_options =
                        Some(serde_json::Value::String(field_text(field).await?));
                }
                "currency" => form.currency = Some(field_text(field).await?),
                other => tracing::debug!(field = other, "ignoring unknown multipart field"),
            }
        }

        Ok(Self { form, files })
    }
}

impl<S: Send + Sync> FromRequest<S> for CreateOrderPayload {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else {
            let Json(form) = Json::<CreateOrderForm>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self {
                form,
                files: Vec::new(),
            })
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

impl StatusUpdateRequest {
    pub fn validate(self) -> Result<StatusUpdate, ValidationError> {
        let status = non_blank(self.status)
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| ValidationError::invalid("status", e))?;
        let payment_status = non_blank(self.payment_status)
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()
            .map_err(|e| ValidationError::invalid("paymentStatus", e))?;

        StatusUpdate::new(status, payment_status)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreOrdersParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOptionResponse {
    pub variant_label: String,
    pub option_index: usize,
    pub option_name: String,
    pub price_delta: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub service_id: String,
    pub service_name: String,
    pub unit: String,
    pub quantity: u32,
    pub selected_options: Vec<SelectedOptionResponse>,
    pub unit_price: i64,
    pub total_price: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub file_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupCredentialResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub store_id: String,
    pub status: String,
    pub payment_status: String,
    pub items: Vec<OrderItemResponse>,
    pub notes: Option<String>,
    pub attachments: Vec<AttachmentResponse>,
    pub subtotal: i64,
    pub currency: String,
    pub pickup_credential: Option<PickupCredentialResponse>,
    pub pickup_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<&SelectedOption> for SelectedOptionResponse {
    fn from(option: &SelectedOption) -> Self {
        Self {
            variant_label: option.variant_label.clone(),
            option_index: option.option_index,
            option_name: option.option_name.clone(),
            price_delta: option.price_delta.cents(),
        }
    }
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            service_id: item.service_id.to_string(),
            service_name: item.service_name.clone(),
            unit: item.unit.clone(),
            quantity: item.quantity.get(),
            selected_options: item.selected_options.iter().map(Into::into).collect(),
            unit_price: item.unit_price.cents(),
            total_price: item.total_price.cents(),
            currency: item.currency.clone(),
        }
    }
}

impl From<&AttachmentRef> for AttachmentResponse {
    fn from(attachment: &AttachmentRef) -> Self {
        Self {
            file_id: attachment.file_id.to_string(),
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            size: attachment.size,
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            customer_id: order.customer_id().to_string(),
            store_id: order.store_id().to_string(),
            status: order.status().to_string(),
            payment_status: order.payment_status().to_string(),
            items: order.items().iter().map(Into::into).collect(),
            notes: order.notes().map(str::to_string),
            attachments: order.attachments().iter().map(Into::into).collect(),
            subtotal: order.subtotal().cents(),
            currency: order.currency().to_string(),
            pickup_credential: order.pickup_credential().map(|c| PickupCredentialResponse {
                token: c.token.clone(),
                expires_at: c.expires_at,
            }),
            pickup_verified_at: order.pickup_verified_at(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            version: order.version().as_i64(),
        }
    }
}

fn order_list(orders: &[Order]) -> Json<Vec<OrderResponse>> {
    Json(orders.iter().map(OrderResponse::from).collect())
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip_all, fields(caller_id = %caller.user_id))]
pub async fn create<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    payload: CreateOrderPayload,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let request = payload.form.validate()?;
    let order = state
        .controller
        .create_order(&caller, request, payload.files)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/mine
pub async fn mine<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let page = Page::new(params.limit, params.offset);
    let orders = state.controller.list_customer_orders(&caller, page).await?;
    Ok(order_list(&orders))
}

/// GET /orders/store/{store_id}
pub async fn store_orders<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    Path(store_id): Path<String>,
    Query(params): Query<StoreOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let store_id: StoreId = parse_id(&store_id, "storeId")?;
    let status = non_blank(params.status)
        .map(|s| s.parse::<OrderStatus>())
        .transpose()
        .map_err(|e| ValidationError::invalid("status", e))?;
    let page = Page::new(params.limit, params.offset);

    let orders = state
        .controller
        .list_store_orders(&caller, store_id, status, page)
        .await?;
    Ok(order_list(&orders))
}

/// GET /orders/{id}
pub async fn get<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "id")?;
    let order = state.controller.get_order(&caller, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip_all, fields(caller_id = %caller.user_id))]
pub async fn update_status<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "id")?;
    let update = req.validate()?;
    let order = state
        .controller
        .update_status(&caller, order_id, update)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// Quoted `filename` parameter restricted to printable ASCII.
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// GET /orders/{id}/files/{file_id}
pub async fn download_file<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let order_id: OrderId = parse_id(&id, "id")?;
    let file_id: FileId = parse_id(&file_id, "fileId")?;

    let (attachment, data) = state
        .controller
        .open_attachment(&caller, order_id, file_id)
        .await?;

    let content_type = HeaderValue::from_str(&attachment.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_DISPOSITION, content_disposition(&attachment.filename)),
        ],
        data,
    )
        .into_response())
}
