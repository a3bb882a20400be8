//! HTTP API: server, routing, and request/response mapping.
//!
//! Authentication/session handling is an upstream collaborator; this layer
//! trusts the gateway-injected tenant and user headers and maps HTTP onto the
//! placement engine, the scoring engine, and the thin command routes that
//! drive them.

pub mod app;
pub mod context;
pub mod middleware;
