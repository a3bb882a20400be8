//! Infrastructure layer: event store, command dispatch, stock ledger, order
//! placement, and read models.
//!
//! Domain crates stay pure; everything that composes them (persistence,
//! optimistic concurrency, the compensated placement transaction, read
//! models) lives here behind swappable traits.

pub mod command_dispatcher;
pub mod event_store;
pub mod lookup;
pub mod placement;
pub mod projections;
pub mod read_model;
pub mod stock_ledger;

#[cfg(test)]
mod integration_tests;
