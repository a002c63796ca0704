//! Delivery statuses, the transition table, and the order-level rollup.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a single line item.
///
/// `Pending → Confirmed → Shipped → OutForDelivery → Delivered`, with
/// `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineStatus {
    Pending,
    Confirmed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl LineStatus {
    pub const ALL: [LineStatus; 6] = [
        LineStatus::Pending,
        LineStatus::Confirmed,
        LineStatus::Shipped,
        LineStatus::OutForDelivery,
        LineStatus::Delivered,
        LineStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, LineStatus::Delivered | LineStatus::Cancelled)
    }

    /// Position along the delivery path. `Cancelled` sits off the path.
    pub fn progress(self) -> Option<u8> {
        match self {
            LineStatus::Pending => Some(0),
            LineStatus::Confirmed => Some(1),
            LineStatus::Shipped => Some(2),
            LineStatus::OutForDelivery => Some(3),
            LineStatus::Delivered => Some(4),
            LineStatus::Cancelled => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineStatus::Pending => "Pending",
            LineStatus::Confirmed => "Confirmed",
            LineStatus::Shipped => "Shipped",
            LineStatus::OutForDelivery => "OutForDelivery",
            LineStatus::Delivered => "Delivered",
            LineStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown status name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown status '{}' (expected one of: Pending, Confirmed, Shipped, OutForDelivery, Delivered, Cancelled)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for LineStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; spaces, dashes and underscores are ignored so
    /// "Out for Delivery" and "out_for_delivery" both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "pending" => Ok(LineStatus::Pending),
            "confirmed" => Ok(LineStatus::Confirmed),
            "shipped" => Ok(LineStatus::Shipped),
            "outfordelivery" => Ok(LineStatus::OutForDelivery),
            "delivered" => Ok(LineStatus::Delivered),
            "cancelled" | "canceled" => Ok(LineStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Order-level status, derived from the line statuses.
///
/// Mirrors `LineStatus` plus `PartiallyDelivered`: every line is terminal but
/// some were delivered and some cancelled. That mixed outcome is reported as
/// is instead of being coerced into either terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    PartiallyDelivered,
}

impl OrderStatus {
    /// No line of the order can change any more.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::PartiallyDelivered
        )
    }
}

impl From<LineStatus> for OrderStatus {
    fn from(value: LineStatus) -> Self {
        match value {
            LineStatus::Pending => OrderStatus::Pending,
            LineStatus::Confirmed => OrderStatus::Confirmed,
            LineStatus::Shipped => OrderStatus::Shipped,
            LineStatus::OutForDelivery => OrderStatus::OutForDelivery,
            LineStatus::Delivered => OrderStatus::Delivered,
            LineStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::PartiallyDelivered => f.write_str("PartiallyDelivered"),
            OrderStatus::Pending => f.write_str("Pending"),
            OrderStatus::Confirmed => f.write_str("Confirmed"),
            OrderStatus::Shipped => f.write_str("Shipped"),
            OrderStatus::OutForDelivery => f.write_str("OutForDelivery"),
            OrderStatus::Delivered => f.write_str("Delivered"),
            OrderStatus::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Derive the order status from its line statuses.
///
/// - any non-terminal line: the least-advanced non-terminal status
/// - all `Delivered`: `Delivered`
/// - all `Cancelled`: `Cancelled`
/// - all terminal, mixed: `PartiallyDelivered`
/// - no lines: `Pending`
pub fn rollup<I>(statuses: I) -> OrderStatus
where
    I: IntoIterator<Item = LineStatus>,
{
    let mut least_open: Option<LineStatus> = None;
    let mut delivered = 0usize;
    let mut cancelled = 0usize;

    for status in statuses {
        match status {
            LineStatus::Delivered => delivered += 1,
            LineStatus::Cancelled => cancelled += 1,
            open => {
                least_open = Some(match least_open {
                    Some(current) if current.progress() <= open.progress() => current,
                    _ => open,
                });
            }
        }
    }

    match (least_open, delivered, cancelled) {
        (Some(open), _, _) => open.into(),
        (None, 0, 0) => OrderStatus::Pending,
        (None, _, 0) => OrderStatus::Delivered,
        (None, 0, _) => OrderStatus::Cancelled,
        (None, _, _) => OrderStatus::PartiallyDelivered,
    }
}

/// How strictly status changes are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any non-terminal status may move to any status (skips, repeats and
    /// backwards moves included). Terminal statuses never move.
    #[default]
    Permissive,
    /// Only strictly forward moves along the delivery path, or cancellation.
    Monotonic,
}

impl TransitionPolicy {
    /// `Err` carries the reason the move is refused.
    pub fn check(self, from: LineStatus, to: LineStatus) -> Result<(), &'static str> {
        if from.is_terminal() {
            return Err("status is terminal");
        }
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Monotonic => {
                if to == LineStatus::Cancelled {
                    return Ok(());
                }
                match (from.progress(), to.progress()) {
                    (Some(f), Some(t)) if t > f => Ok(()),
                    _ => Err("monotonic policy only allows forward moves"),
                }
            }
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "monotonic" | "strict" => Ok(TransitionPolicy::Monotonic),
            other => Err(format!("unknown transition policy '{other}'")),
        }
    }
}
