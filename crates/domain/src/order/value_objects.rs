//! Value objects for the order domain.

use common::{FileId, ServiceId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Money amount in minor currency units to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    /// Amount in minor units (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder.
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Sums amounts, or `None` if any partial sum overflows.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

/// An order quantity, between one and `Quantity::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a single line item may carry.
    pub const MAX: u32 = 1_000_000;

    /// Validates a raw quantity. Anything outside `1..=MAX` is rejected.
    pub fn new(raw: i64) -> Result<Self, ValidationError> {
        match u32::try_from(raw) {
            Ok(q) if (1..=Self::MAX).contains(&q) => Ok(Self(q)),
            _ => Err(ValidationError::InvalidQuantity { quantity: raw }),
        }
    }

    pub fn one() -> Self {
        Self(1)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Quantity::new(i64::from(value))
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record version, used for optimistic concurrency control.
///
/// The repository assigns version 1 on insert and increments it on every
/// successful update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a record that has not been stored yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version assigned on insert.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variant option chosen for a line item, resolved against the catalog at
/// order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub variant_label: String,
    pub option_index: usize,
    pub option_name: String,
    pub price_delta: Money,
}

/// One service selection within an order.
///
/// `service_name` and `unit` are snapshots taken when the order was placed;
/// later catalog edits do not change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub service_id: ServiceId,
    pub service_name: String,
    pub unit: String,
    pub currency: String,
    pub quantity: Quantity,
    pub selected_options: Vec<SelectedOption>,
    pub unit_price: Money,
    pub total_price: Money,
}

/// Opaque pointer to an uploaded file in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_id: FileId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!(a.checked_add(b), Some(Money::from_cents(1500)));
        assert_eq!(a.checked_multiply(3), Some(Money::from_cents(3000)));
        assert_eq!(Money::checked_sum([a, b, b]), Some(Money::from_cents(2000)));
        assert_eq!(Money::checked_sum([]), Some(Money::zero()));
    }

    #[test]
    fn test_money_arithmetic_reports_overflow() {
        let large = Money::from_cents(5_000_000_000);

        assert_eq!(large.checked_multiply(u32::MAX), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::checked_sum([Money::from_cents(i64::MAX), large]), None);
    }

    #[test]
    fn test_money_serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_cents(360)).unwrap();
        assert_eq!(json, "360");
    }

    #[test]
    fn test_quantity_rejects_values_below_one() {
        assert!(Quantity::new(1).is_ok());
        assert_eq!(
            Quantity::new(0),
            Err(ValidationError::InvalidQuantity { quantity: 0 })
        );
        assert!(Quantity::new(-5).is_err());
        assert!(Quantity::new(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_quantity_is_capped() {
        assert_eq!(Quantity::new(i64::from(Quantity::MAX)).unwrap().get(), Quantity::MAX);
        assert_eq!(
            Quantity::new(i64::from(Quantity::MAX) + 1),
            Err(ValidationError::InvalidQuantity {
                quantity: i64::from(Quantity::MAX) + 1
            })
        );
        assert!(serde_json::from_str::<Quantity>("4294967295").is_err());
    }

    #[test]
    fn test_quantity_deserialization_enforces_minimum() {
        assert_eq!(serde_json::from_str::<Quantity>("3").unwrap().get(), 3);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_version_sequence() {
        assert_eq!(Version::initial().next(), Version::first());
        assert_eq!(Version::first().next().as_i64(), 2);
    }
}
