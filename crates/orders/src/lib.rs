//! Order aggregate and fulfillment state machine.
//!
//! Pure domain logic: placing an order from already-reserved lines, moving
//! line items through delivery statuses, and rolling line statuses up into
//! an order status. No IO, no HTTP, no storage.

pub mod error;
pub mod ids;
pub mod order;
pub mod shipping;
pub mod status;

pub use error::OrderDomainError;
pub use ids::{IdGenerator, LineOrderId, OrderId, RandomIdGenerator, SequentialIdGenerator};
pub use order::{
    ChangeLineStatus, ChangeOrderStatus, LineItem, LineStatusChanged, NewLine, Order, OrderCommand,
    OrderEvent, OrderPlaced, PlaceOrder, TrackingEntry,
};
pub use shipping::{AddressType, ShippingSnapshot};
pub use status::{LineStatus, OrderStatus, TransitionPolicy, rollup};
