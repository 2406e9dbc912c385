//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fulfilment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Ready ──► Completed
///    │            │            │
///    └────────────┴────────────┴──► Cancelled
/// ```
///
/// Forward moves may skip states, and re-entering the current state is
/// allowed (re-entering `Ready` re-issues the pickup credential).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order placed, not yet picked up by the shop.
    #[default]
    Pending,

    /// The shop is printing the order.
    Processing,

    /// Ready for pickup; a pickup credential is active.
    Ready,

    /// Handed over to the customer (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Position along the fulfilment path. Cancelled sits outside it.
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Ready => 2,
            OrderStatus::Completed => 3,
            OrderStatus::Cancelled => u8::MAX,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if an order in this state may move to `target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            OrderStatus::Cancelled => true,
            _ => target.rank() >= self.rank(),
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// Payment status. An independent axis set by an external actor; only pickup
/// confirmation couples it to `OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_state_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Unpaid);
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
    }

    #[test]
    fn test_ready_can_be_reentered() {
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Ready));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_can_cancel_from_non_terminal_states() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for target in ALL {
            assert!(!OrderStatus::Completed.can_transition_to(target));
            assert!(!OrderStatus::Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn test_string_round_trip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert_eq!("paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
    }

    #[test]
    fn test_serialization_uses_lowercase_names() {
        let json = serde_json::to_string(&OrderStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        let status: PaymentStatus = serde_json::from_str("\"refunded\"").unwrap();
        assert_eq!(status, PaymentStatus::Refunded);
    }
}
