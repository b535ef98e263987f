//! Order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// State transitions:
/// ```text
/// PENDING ──► CONFIRMED ──► CANCELLED
///    │                          ▲
///    └──────────────────────────┘
/// ```
///
/// `CONFIRMED ──► CANCELLED` happens when a saga compensates its confirm step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, saga not finished yet.
    #[default]
    Pending,

    /// Stock reserved and order confirmed.
    Confirmed,

    /// Rolled back (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if moving to `target` is allowed.
    ///
    /// Setting the current status again is accepted as a no-op.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if *self == target {
            return true;
        }
        match target {
            OrderStatus::Pending => false,
            OrderStatus::Confirmed => self.can_confirm(),
            OrderStatus::Cancelled => self.can_cancel(),
        }
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
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
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}
