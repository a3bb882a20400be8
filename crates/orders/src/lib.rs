//! Orders domain module (event-sourced).
//!
//! An order is placed in one shot: header plus every line in a single command
//! whose events form one atomic append. Totals are computed here, from the
//! lines, so the sum invariant holds by construction. Pure domain logic only.

pub mod order;

pub use order::{
    CancelOrder, MarkFulfilled, Order, OrderCancelled, OrderCommand, OrderEvent, OrderFulfilled,
    OrderId, OrderLine, OrderLineAdded, OrderPlaced, OrderSource, OrderStatus, PlaceOrder,
    PricedLine,
};
