//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: reconstructed from the event stream at any time
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: safe for at-least-once delivery

pub mod order_book;
pub mod stock_levels;

pub use order_book::{OrderBookProjection, OrderLineReadModel, OrderReadModel};
pub use stock_levels::{StockLevelReadModel, StockLevelsProjection};
