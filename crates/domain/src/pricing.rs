//! Pricing engine.
//!
//! Pure functions from a catalog service, the customer's option selection and
//! a quantity to a unit price and line total. Prices are always computed
//! here, never taken from the caller.

use serde::{Deserialize, Serialize};

use crate::catalog::ServiceEntry;
use crate::error::ValidationError;
use crate::order::{Money, Quantity, SelectedOption};

/// A customer's choice of one option within a variant group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSelection {
    pub variant_label: String,
    pub option_index: usize,
    /// Display name sent by the client; used only when the option cannot be
    /// resolved against the catalog.
    #[serde(default)]
    pub option_name: Option<String>,
}

impl OptionSelection {
    pub fn new(variant_label: impl Into<String>, option_index: usize) -> Self {
        Self {
            variant_label: variant_label.into(),
            option_index,
            option_name: None,
        }
    }
}

/// Result of pricing one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub unit_price: Money,
    pub line_total: Money,
    pub selected_options: Vec<SelectedOption>,
}

/// Resolves a selection against the service's variant definitions.
///
/// Unknown labels or out-of-range indexes resolve to a zero delta but keep
/// their label, index and client-supplied name for audit.
pub fn resolve_option(service: &ServiceEntry, selection: &OptionSelection) -> SelectedOption {
    let resolved = service
        .variant(&selection.variant_label)
        .and_then(|group| group.option(selection.option_index));

    match resolved {
        Some(option) => SelectedOption {
            variant_label: selection.variant_label.clone(),
            option_index: selection.option_index,
            option_name: option.name.clone(),
            price_delta: option.price_delta,
        },
        None => {
            tracing::debug!(
                service_id = %service.id,
                variant = %selection.variant_label,
                index = selection.option_index,
                "selected option not found in catalog, pricing with zero delta"
            );
            SelectedOption {
                variant_label: selection.variant_label.clone(),
                option_index: selection.option_index,
                option_name: selection.option_name.clone().unwrap_or_default(),
                price_delta: Money::zero(),
            }
        }
    }
}

/// Prices a selection.
///
/// `unit_price = base_price + Σ deltas`, `line_total = unit_price × quantity`.
/// A catalog whose prices cannot be represented for this quantity is
/// rejected rather than wrapped.
pub fn price(
    service: &ServiceEntry,
    selections: &[OptionSelection],
    quantity: Quantity,
) -> Result<PriceQuote, ValidationError> {
    let selected_options: Vec<SelectedOption> = selections
        .iter()
        .map(|s| resolve_option(service, s))
        .collect();

    let unit_price = Money::checked_sum(
        std::iter::once(service.base_price).chain(selected_options.iter().map(|o| o.price_delta)),
    )
    .ok_or_else(|| overflow("unit price"))?;
    let line_total = unit_price
        .checked_multiply(quantity.get().max(1))
        .ok_or_else(|| overflow("line total"))?;

    Ok(PriceQuote {
        unit_price,
        line_total,
        selected_options,
    })
}

fn overflow(what: &str) -> ValidationError {
    ValidationError::invalid("quantity", format!("{what} exceeds the supported amount"))
}
