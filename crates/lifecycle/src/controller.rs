//! Order lifecycle controller.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use common::{FileId, OrderId, ServiceId, StoreId};
use domain::{
    AttachmentRef, Caller, NewOrder, OptionSelection, Order, OrderItem, OrderStatus, Quantity,
    StatusChange, StatusUpdate, Store, pricing,
};
use order_store::{OrderQuery, OrderRepository, StoreError, UpdateCondition};

use crate::attachments::{AttachmentIntake, UploadedFile};
use crate::error::{LifecycleError, Result};
use crate::services::{
    BlobError, BlobStore, Catalog, Clock, Delivery, Notification, NotificationKind, Publisher,
    SystemClock,
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// Tunables for the controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    /// How long a pickup credential stays valid after the order becomes ready.
    pub pickup_ttl: Duration,
    /// Re-reads allowed when a status update loses a version race.
    pub max_update_retries: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pickup_ttl: Duration::hours(48),
            max_update_retries: 3,
        }
    }
}

/// A validated order request.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub store_id: StoreId,
    pub service_id: ServiceId,
    pub quantity: Quantity,
    pub selected_options: Vec<OptionSelection>,
    pub notes: Option<String>,
    /// Overrides the service's currency when set.
    pub currency: Option<String>,
}

/// Listing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// Builds a page, clamping the limit to `1..=MAX_PAGE_SIZE`.
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Orchestrates order creation, status changes and pickup confirmation.
///
/// Every operation commits its order write first and only then publishes
/// notifications through `notify`, which never fails the operation.
pub struct OrderController<R: OrderRepository> {
    repo: R,
    catalog: Arc<dyn Catalog>,
    attachments: AttachmentIntake,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
}

impl<R: OrderRepository> OrderController<R> {
    /// Creates a controller with the system clock and default settings.
    pub fn new(
        repo: R,
        catalog: Arc<dyn Catalog>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            repo,
            catalog,
            attachments: AttachmentIntake::new(blobs),
            publisher,
            clock: Arc::new(SystemClock),
            settings: ControllerSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Places an order for one priced service selection.
    ///
    /// Attachments are stored before the order is inserted; if the insert
    /// fails they are deleted again.
    #[tracing::instrument(
        skip(self, request, files),
        fields(customer_id = %caller.user_id, store_id = %request.store_id, files = files.len())
    )]
    pub async fn create_order(
        &self,
        caller: &Caller,
        request: CreateOrder,
        files: Vec<UploadedFile>,
    ) -> Result<Order> {
        let started = Instant::now();

        if !caller.can_place_orders() {
            return Err(LifecycleError::Forbidden(format!(
                "role '{}' may not place orders",
                caller.role
            )));
        }

        let store = self
            .catalog
            .store(request.store_id)
            .await?
            .ok_or(LifecycleError::StoreNotFound(request.store_id))?;
        let service = self
            .catalog
            .service(request.service_id)
            .await?
            .ok_or(LifecycleError::ServiceNotFound(request.service_id))?;
        if !service.belongs_to(store.id) {
            return Err(LifecycleError::ServiceNotInStore {
                service_id: service.id,
                store_id: store.id,
            });
        }

        let quote = pricing::price(&service, &request.selected_options, request.quantity)?;
        let currency = request
            .currency
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| service.currency.clone());
        let item = OrderItem {
            service_id: service.id,
            service_name: service.name.clone(),
            unit: service.unit.clone(),
            currency,
            quantity: request.quantity,
            selected_options: quote.selected_options,
            unit_price: quote.unit_price,
            total_price: quote.line_total,
        };

        let attachments = self.attachments.store(files).await?;

        let now = self.clock.now();
        let mut order = match Order::place(NewOrder {
            id: OrderId::new(),
            customer_id: caller.user_id,
            store_id: store.id,
            items: vec![item],
            notes: request.notes,
            attachments: attachments.clone(),
            placed_at: now,
        }) {
            Ok(order) => order,
            Err(e) => {
                self.attachments.discard(&attachments).await;
                return Err(e.into());
            }
        };

        match self.repo.insert(&order).await {
            Ok(version) => order.set_version(version),
            Err(e) => {
                self.attachments.discard(&attachments).await;
                return Err(e.into());
            }
        }

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id(),
            subtotal = order.subtotal().cents(),
            attachments = order.attachments().len(),
            "order created"
        );

        self.notify(Notification::new(
            store.owner_id,
            NotificationKind::NewOrder,
            order.id(),
            "New order",
            format!(
                "{} x {} ordered, total {} {}",
                order.items()[0].quantity,
                service.name,
                order.subtotal(),
                order.currency()
            ),
            now,
        ));

        Ok(order)
    }

    /// Applies an operator status update.
    ///
    /// The write is a version compare-and-swap. On conflict the order is
    /// re-read and the update re-applied, up to `max_update_retries` times.
    #[tracing::instrument(skip(self), fields(caller_id = %caller.user_id))]
    pub async fn update_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order> {
        let mut order = self.load(order_id).await?;
        if !self.manages_store(caller, order.store_id()).await? {
            return Err(LifecycleError::Forbidden(
                "only store staff may update an order".to_string(),
            ));
        }

        let mut retries = 0;
        let (order, change) = loop {
            let now = self.clock.now();
            let change = order.apply_status_update(update, now, self.settings.pickup_ttl)?;

            match self
                .repo
                .update(&order, UpdateCondition::loaded_at(&order))
                .await
            {
                Ok(version) => {
                    order.set_version(version);
                    break (order, change);
                }
                Err(StoreError::ConcurrencyConflict { actual, .. })
                    if retries < self.settings.max_update_retries =>
                {
                    retries += 1;
                    tracing::debug!(retries, %actual, "status update lost version race, retrying");
                    order = self.load(order_id).await?;
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::warn!(retries, "status update retries exhausted");
                    return Err(LifecycleError::Conflict(order_id));
                }
                Err(e) => return Err(e.into()),
            }
        };

        metrics::counter!("order_status_updates_total", "status" => change.status.as_str())
            .increment(1);
        tracing::info!(
            order_id = %order.id(),
            from = %change.previous_status,
            to = %change.status,
            payment = %change.payment_status,
            credential_issued = change.credential_issued,
            "order status updated"
        );

        self.notify(Notification::new(
            order.customer_id(),
            NotificationKind::StatusUpdated,
            order.id(),
            "Order status updated",
            describe_change(order.id(), &change),
            order.updated_at(),
        ));

        Ok(order)
    }

    /// Confirms pickup with a scanned token.
    ///
    /// The write only succeeds if the stored credential still carries the
    /// token and is unexpired, so at most one concurrent scan completes. The
    /// write is also pinned to the loaded version: if another update landed
    /// first, the order is re-read and the confirmation re-applied, up to
    /// `max_update_retries` times.
    #[tracing::instrument(skip(self, token))]
    pub async fn confirm_pickup(&self, token: &str) -> Result<Order> {
        let token = token.trim();
        if token.is_empty() {
            record_pickup("not_found");
            return Err(LifecycleError::PickupTokenNotFound);
        }

        let Some(mut order) = self.repo.find_by_pickup_token(token).await? else {
            record_pickup("not_found");
            return Err(LifecycleError::PickupTokenNotFound);
        };

        let mut retries = 0;
        let now = loop {
            let now = self.clock.now();
            if let Err(e) = order.confirm_pickup(token, now) {
                let err = LifecycleError::from(e);
                record_pickup(match err {
                    LifecycleError::PickupTokenExpired { .. } => "expired",
                    _ => "not_found",
                });
                return Err(err);
            }

            let condition = UpdateCondition::PickupToken {
                token: token.to_string(),
                valid_at: now,
                expected: order.version(),
            };
            match self.repo.update(&order, condition).await {
                Ok(version) => {
                    order.set_version(version);
                    break now;
                }
                Err(StoreError::CredentialChanged { .. }) => {
                    record_pickup("not_found");
                    tracing::info!(order_id = %order.id(), "pickup token consumed by a concurrent request");
                    return Err(LifecycleError::PickupTokenNotFound);
                }
                Err(StoreError::ConcurrencyConflict { actual, .. })
                    if retries < self.settings.max_update_retries =>
                {
                    retries += 1;
                    tracing::debug!(retries, %actual, "pickup lost version race, retrying");
                    order = self.load(order.id()).await?;
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::warn!(retries, "pickup retries exhausted");
                    return Err(LifecycleError::Conflict(order.id()));
                }
                Err(e) => return Err(e.into()),
            }
        };

        record_pickup("confirmed");
        tracing::info!(order_id = %order.id(), "pickup confirmed");

        self.notify(Notification::new(
            order.customer_id(),
            NotificationKind::PickedUp,
            order.id(),
            "Order picked up",
            format!("Order {} was handed over. Thank you!", short_id(order.id())),
            now,
        ));
        match self.catalog.store(order.store_id()).await {
            Ok(Some(store)) => self.notify(Notification::new(
                store.owner_id,
                NotificationKind::PickupConfirmed,
                order.id(),
                "Pickup confirmed",
                format!(
                    "Order {} was collected and marked paid",
                    short_id(order.id())
                ),
                now,
            )),
            Ok(None) => {
                tracing::warn!(store_id = %order.store_id(), "store missing, owner not notified")
            }
            Err(e) => tracing::warn!(error = %e, "catalog lookup failed, owner not notified"),
        }

        Ok(order)
    }

    /// Fetches an order visible to the caller.
    #[tracing::instrument(skip(self), fields(caller_id = %caller.user_id))]
    pub async fn get_order(&self, caller: &Caller, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        self.authorize_read(caller, &order).await?;
        Ok(order)
    }

    /// Lists the caller's own orders, newest first.
    pub async fn list_customer_orders(&self, caller: &Caller, page: Page) -> Result<Vec<Order>> {
        let query = OrderQuery::for_customer(caller.user_id)
            .limit(page.limit)
            .offset(page.offset);
        Ok(self.repo.query(query).await?)
    }

    /// Lists a store's orders, newest first. Store staff only.
    pub async fn list_store_orders(
        &self,
        caller: &Caller,
        store_id: StoreId,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Vec<Order>> {
        let store = self
            .catalog
            .store(store_id)
            .await?
            .ok_or(LifecycleError::StoreNotFound(store_id))?;
        if !store.is_managed_by(caller) {
            return Err(LifecycleError::Forbidden(
                "only store staff may list store orders".to_string(),
            ));
        }

        let mut query = OrderQuery::for_store(store_id)
            .limit(page.limit)
            .offset(page.offset);
        if let Some(status) = status {
            query = query.status(status);
        }
        Ok(self.repo.query(query).await?)
    }

    /// Loads one attachment of an order visible to the caller.
    pub async fn open_attachment(
        &self,
        caller: &Caller,
        order_id: OrderId,
        file_id: FileId,
    ) -> Result<(AttachmentRef, Vec<u8>)> {
        let order = self.get_order(caller, order_id).await?;
        let attachment = order
            .attachment(file_id)
            .cloned()
            .ok_or(LifecycleError::AttachmentNotFound { order_id, file_id })?;

        match self.attachments.open(file_id).await {
            Ok(blob) => Ok((attachment, blob.data)),
            Err(BlobError::NotFound(_)) => {
                tracing::warn!(%order_id, %file_id, "attachment referenced but missing from blob store");
                Err(LifecycleError::AttachmentNotFound { order_id, file_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.repo
            .get(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))
    }

    /// Admins manage every store, even one missing from the catalog.
    async fn manages_store(&self, caller: &Caller, store_id: StoreId) -> Result<bool> {
        if caller.is_admin() {
            return Ok(true);
        }
        let store: Option<Store> = self.catalog.store(store_id).await?;
        Ok(store.is_some_and(|s| s.is_managed_by(caller)))
    }

    async fn authorize_read(&self, caller: &Caller, order: &Order) -> Result<()> {
        if order.customer_id() == caller.user_id
            || self.manages_store(caller, order.store_id()).await?
        {
            return Ok(());
        }
        Err(LifecycleError::Forbidden(
            "order belongs to another customer".to_string(),
        ))
    }

    /// Best-effort publish. Never fails the caller.
    fn notify(&self, notification: Notification) {
        let recipient = notification.recipient;
        let kind = notification.kind.as_str();
        match self.publisher.publish(notification) {
            Ok(Delivery::Delivered(connections)) => {
                tracing::debug!(%recipient, kind, connections, "notification delivered")
            }
            Ok(Delivery::Offline) => {
                tracing::debug!(%recipient, kind, "recipient offline, notification dropped")
            }
            Err(e) => {
                metrics::counter!("notification_publish_failures_total").increment(1);
                tracing::warn!(%recipient, kind, error = %e, "failed to publish notification");
            }
        }
    }
}

fn record_pickup(outcome: &'static str) {
    metrics::counter!("pickup_confirmations_total", "outcome" => outcome).increment(1);
}

fn short_id(order_id: OrderId) -> String {
    order_id.to_string().chars().take(8).collect()
}

fn describe_change(order_id: OrderId, change: &StatusChange) -> String {
    let id = short_id(order_id);
    if change.status != change.previous_status {
        let mut text = format!("Order {id} is now {}", change.status);
        if change.credential_issued {
            text.push_str(". Show your pickup code at the counter");
        }
        text
    } else if change.credential_issued {
        format!("A new pickup code was issued for order {id}")
    } else if change.payment_status != change.previous_payment_status {
        format!("Payment for order {id} is now {}", change.payment_status)
    } else {
        format!("Order {id} was updated")
    }
}
