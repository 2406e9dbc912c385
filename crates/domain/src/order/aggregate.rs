//! Order aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{FileId, OrderId, StoreId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::{
    AttachmentRef, Money, OrderError, OrderItem, OrderStatus, PaymentStatus, PickupCredential,
    Version,
};

/// Everything needed to place a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub customer_id: UserId,
    pub store_id: StoreId,
    pub items: Vec<OrderItem>,
    pub notes: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub placed_at: DateTime<Utc>,
}

/// A requested change to one or both status axes.
///
/// Construction guarantees at least one axis is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    status: Option<OrderStatus>,
    payment_status: Option<PaymentStatus>,
}

impl StatusUpdate {
    pub fn new(
        status: Option<OrderStatus>,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Self, ValidationError> {
        if status.is_none() && payment_status.is_none() {
            return Err(ValidationError::EmptyStatusUpdate);
        }
        Ok(Self {
            status,
            payment_status,
        })
    }

    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            payment_status: None,
        }
    }

    pub fn payment(payment_status: PaymentStatus) -> Self {
        Self {
            status: None,
            payment_status: Some(payment_status),
        }
    }

    pub fn target_status(&self) -> Option<OrderStatus> {
        self.status
    }

    pub fn target_payment_status(&self) -> Option<PaymentStatus> {
        self.payment_status
    }
}

/// Summary of what a status update changed, used for notifications and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    pub previous_payment_status: PaymentStatus,
    pub payment_status: PaymentStatus,
    pub credential_issued: bool,
}

/// Order aggregate root.
///
/// Invariants held at every observable state:
/// - `subtotal` equals the sum of item totals
/// - a pickup credential exists if and only if the status is `Ready`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: UserId,
    store_id: StoreId,
    items: Vec<OrderItem>,
    notes: Option<String>,
    attachments: Vec<AttachmentRef>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    subtotal: Money,
    currency: String,
    pickup_credential: Option<PickupCredential>,
    pickup_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Record version assigned by the repository.
    #[serde(default)]
    version: Version,
}

impl Order {
    /// Places a new order in `Pending` / `Unpaid`.
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        let first = new.items.first().ok_or(OrderError::NoItems)?;
        let currency = first.currency.clone();

        if let Some(other) = new.items.iter().find(|i| i.currency != currency) {
            return Err(OrderError::CurrencyMismatch {
                expected: currency,
                found: other.currency.clone(),
            });
        }

        let subtotal = Money::checked_sum(new.items.iter().map(|i| i.total_price))
            .ok_or(OrderError::AmountOverflow)?;
        let notes = new.notes.filter(|n| !n.trim().is_empty());

        Ok(Self {
            id: new.id,
            customer_id: new.customer_id,
            store_id: new.store_id,
            items: new.items,
            notes,
            attachments: new.attachments,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            subtotal,
            currency,
            pickup_credential: None,
            pickup_verified_at: None,
            created_at: new.placed_at,
            updated_at: new.placed_at,
            version: Version::initial(),
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        &self.attachments
    }

    /// Looks up an attachment belonging to this order.
    pub fn attachment(&self, file_id: FileId) -> Option<&AttachmentRef> {
        self.attachments.iter().find(|a| a.file_id == file_id)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn pickup_credential(&self) -> Option<&PickupCredential> {
        self.pickup_credential.as_ref()
    }

    pub fn pickup_verified_at(&self) -> Option<DateTime<Utc>> {
        self.pickup_verified_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the record version. Called by the repository after a write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Applies an operator status update.
    ///
    /// Entering `Ready` issues a fresh credential valid for `pickup_ttl`,
    /// replacing any previous one. Entering `Completed` clears the credential
    /// and stamps `pickup_verified_at` if no scan happened. Leaving `Ready` for
    /// any other status drops the credential.
    pub fn apply_status_update(
        &mut self,
        update: StatusUpdate,
        now: DateTime<Utc>,
        pickup_ttl: Duration,
    ) -> Result<StatusChange, OrderError> {
        let previous_status = self.status;
        let previous_payment_status = self.payment_status;
        let mut credential_issued = false;

        if let Some(target) = update.target_status() {
            if !self.status.can_transition_to(target) {
                return Err(OrderError::InvalidStatusTransition {
                    from: self.status,
                    to: target,
                });
            }

            match target {
                OrderStatus::Ready => {
                    self.pickup_credential = Some(PickupCredential::issue(now, pickup_ttl));
                    self.pickup_verified_at = None;
                    credential_issued = true;
                }
                OrderStatus::Completed => {
                    self.pickup_credential = None;
                    if self.pickup_verified_at.is_none() {
                        self.pickup_verified_at = Some(now);
                    }
                }
                _ => {
                    self.pickup_credential = None;
                }
            }
            self.status = target;
        }

        if let Some(payment_status) = update.target_payment_status() {
            self.payment_status = payment_status;
        }

        self.updated_at = now;

        Ok(StatusChange {
            previous_status,
            status: self.status,
            previous_payment_status,
            payment_status: self.payment_status,
            credential_issued,
        })
    }

    /// Confirms pickup with a scanned credential.
    ///
    /// Sets both status axes together: `Completed` and `Paid`.
    pub fn confirm_pickup(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), OrderError> {
        let credential = self
            .pickup_credential
            .as_ref()
            .filter(|c| c.matches(token))
            .ok_or(OrderError::PickupTokenMismatch)?;

        if credential.is_expired(now) {
            return Err(OrderError::PickupTokenExpired {
                expired_at: credential.expires_at,
            });
        }

        self.status = OrderStatus::Completed;
        self.payment_status = PaymentStatus::Paid;
        self.pickup_verified_at = Some(now);
        self.pickup_credential = None;
        self.updated_at = now;
        Ok(())
    }

    /// Verifies the aggregate invariants.
    pub fn check_invariants(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::InvariantViolation(
                "order has no items".to_string(),
            ));
        }

        let sum = Money::checked_sum(self.items.iter().map(|i| i.total_price));
        if sum != Some(self.subtotal) {
            return Err(OrderError::InvariantViolation(format!(
                "subtotal {} does not match item total",
                self.subtotal
            )));
        }

        for item in &self.items {
            if item.unit_price.checked_multiply(item.quantity.get()) != Some(item.total_price) {
                return Err(OrderError::InvariantViolation(format!(
                    "item {} total does not equal unit price times quantity",
                    item.service_id
                )));
            }
        }

        let has_credential = self.pickup_credential.is_some();
        let is_ready = self.status == OrderStatus::Ready;
        if has_credential != is_ready {
            return Err(OrderError::InvariantViolation(format!(
                "pickup credential present={has_credential} but status is {}",
                self.status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Quantity, SelectedOption};
    use common::ServiceId;

    fn item(unit_cents: i64, quantity: u32) -> OrderItem {
        let unit_price = Money::from_cents(unit_cents);
        OrderItem {
            service_id: ServiceId::new(),
            service_name: "Poster".to_string(),
            unit: "sheet".to_string(),
            currency: "USD".to_string(),
            quantity: Quantity::new(i64::from(quantity)).unwrap(),
            selected_options: vec![SelectedOption {
                variant_label: "Size".to_string(),
                option_index: 0,
                option_name: "A2".to_string(),
                price_delta: Money::zero(),
            }],
            unit_price,
            total_price: unit_price.checked_multiply(quantity).unwrap(),
        }
    }

    fn new_order(items: Vec<OrderItem>) -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            customer_id: UserId::new(),
            store_id: StoreId::new(),
            items,
            notes: Some("double sided".to_string()),
            attachments: vec![],
            placed_at: Utc::now(),
        }
    }

    fn ttl() -> Duration {
        Duration::hours(48)
    }

    #[test]
    fn place_computes_subtotal_and_initial_state() {
        let order = Order::place(new_order(vec![item(120, 3), item(50, 2)])).unwrap();

        assert_eq!(order.subtotal().cents(), 460);
        assert_eq!(order.currency(), "USD");
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert!(order.pickup_credential().is_none());
        assert_eq!(order.version(), Version::initial());
        order.check_invariants().unwrap();
    }

    #[test]
    fn place_requires_items() {
        let result = Order::place(new_order(vec![]));
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn place_rejects_mixed_currencies() {
        let mut other = item(100, 1);
        other.currency = "EUR".to_string();
        let result = Order::place(new_order(vec![item(100, 1), other]));
        assert!(matches!(result, Err(OrderError::CurrencyMismatch { .. })));
    }

    #[test]
    fn place_rejects_subtotal_overflow() {
        let mut huge = item(100, 1);
        huge.unit_price = Money::from_cents(i64::MAX);
        huge.total_price = Money::from_cents(i64::MAX);

        let result = Order::place(new_order(vec![huge, item(100, 1)]));
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
    }

    #[test]
    fn blank_notes_are_dropped() {
        let mut new = new_order(vec![item(100, 1)]);
        new.notes = Some("   ".to_string());
        let order = Order::place(new).unwrap();
        assert!(order.notes().is_none());
    }

    #[test]
    fn entering_ready_issues_credential() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();

        let change = order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();

        assert!(change.credential_issued);
        assert_eq!(change.previous_status, OrderStatus::Pending);
        let credential = order.pickup_credential().unwrap();
        assert_eq!(credential.expires_at, now + ttl());
        order.check_invariants().unwrap();
    }

    #[test]
    fn reentering_ready_replaces_credential() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();

        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        let first = order.pickup_credential().unwrap().token.clone();

        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        let second = order.pickup_credential().unwrap().token.clone();

        assert_ne!(first, second);
        assert!(matches!(
            order.confirm_pickup(&first, now),
            Err(OrderError::PickupTokenMismatch)
        ));
    }

    #[test]
    fn completing_without_scan_clears_credential_and_stamps_verification() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();

        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Completed), now, ttl())
            .unwrap();

        assert!(order.pickup_credential().is_none());
        assert_eq!(order.pickup_verified_at(), Some(now));
        order.check_invariants().unwrap();
    }

    #[test]
    fn cancelling_ready_order_drops_credential() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();

        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Cancelled), now, ttl())
            .unwrap();

        assert!(order.pickup_credential().is_none());
        order.check_invariants().unwrap();
    }

    #[test]
    fn invalid_transition_leaves_order_untouched() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();
        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Cancelled), now, ttl())
            .unwrap();
        let before = order.clone();

        let result = order.apply_status_update(
            StatusUpdate::new(Some(OrderStatus::Processing), Some(PaymentStatus::Paid)).unwrap(),
            now,
            ttl(),
        );

        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Processing
            })
        ));
        assert_eq!(order, before);
    }

    #[test]
    fn payment_only_update_keeps_status() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();

        let change = order
            .apply_status_update(StatusUpdate::payment(PaymentStatus::Paid), Utc::now(), ttl())
            .unwrap();

        assert_eq!(change.status, OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn empty_status_update_is_rejected() {
        assert_eq!(
            StatusUpdate::new(None, None),
            Err(ValidationError::EmptyStatusUpdate)
        );
    }

    #[test]
    fn confirm_pickup_completes_and_marks_paid() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();
        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        let token = order.pickup_credential().unwrap().token.clone();

        let scanned_at = now + Duration::hours(1);
        order.confirm_pickup(&token, scanned_at).unwrap();

        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.pickup_verified_at(), Some(scanned_at));
        assert!(order.pickup_credential().is_none());
        order.check_invariants().unwrap();

        assert!(matches!(
            order.confirm_pickup(&token, scanned_at),
            Err(OrderError::PickupTokenMismatch)
        ));
    }

    #[test]
    fn confirm_pickup_after_expiry_fails_without_mutation() {
        let mut order = Order::place(new_order(vec![item(100, 1)])).unwrap();
        let now = Utc::now();
        order
            .apply_status_update(StatusUpdate::status(OrderStatus::Ready), now, ttl())
            .unwrap();
        let token = order.pickup_credential().unwrap().token.clone();
        let before = order.clone();

        let result = order.confirm_pickup(&token, now + ttl() + Duration::seconds(1));

        assert!(matches!(result, Err(OrderError::PickupTokenExpired { .. })));
        assert_eq!(order, before);
    }

    #[test]
    fn check_invariants_detects_tampered_subtotal() {
        let order = Order::place(new_order(vec![item(100, 2)])).unwrap();
        let mut json = serde_json::to_value(&order).unwrap();
        json["subtotal"] = serde_json::json!(1);
        let tampered: Order = serde_json::from_value(json).unwrap();

        assert!(matches!(
            tampered.check_invariants(),
            Err(OrderError::InvariantViolation(_))
        ));
    }

    #[test]
    fn attachment_lookup_by_file_id() {
        let file_id = FileId::new();
        let mut new = new_order(vec![item(100, 1)]);
        new.attachments = vec![AttachmentRef {
            file_id,
            filename: "poster.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 1024,
        }];
        let order = Order::place(new).unwrap();

        assert_eq!(order.attachment(file_id).unwrap().filename, "poster.pdf");
        assert!(order.attachment(FileId::new()).is_none());
    }
}
