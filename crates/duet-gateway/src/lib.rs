//! Realtime layer: who is online, and pushing events to them.
//!
//! The registry is process-local. Running more than one server process
//! behind a load balancer would need the map moved to a shared store.

pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod registry;

pub use dispatcher::{Delivery, Dispatcher};
pub use registry::{ConnectionId, ConnectionRegistry, UserId};
