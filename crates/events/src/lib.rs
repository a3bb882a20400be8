//! Event mechanics shared across the workspace (no business rules).
//!
//! Domain crates define their own typed events; this crate carries the
//! machinery around them: the `Event` trait, the tenant-scoped envelope, and
//! the pub/sub bus abstraction with its in-memory implementation.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
