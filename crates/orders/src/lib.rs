//! Orders domain module.
//!
//! Order records, the validated `PlaceOrder` command and the error taxonomy
//! of a placement attempt. No IO lives here; stores in `eshop-infra` run the
//! actual transaction.

pub mod order;
pub mod placement;

pub use order::{Order, OrderDetails, OrderItem, OrderItemDetails, OrderStatus};
pub use placement::{
    OrderLine, PlaceOrder, PlaceOrderError, PlacedOrder, PlacementPolicy, PlacementState,
};
