//! Generic event bus capability
//!
//! Raw socket events are fanned out here before any store forwarding,
//! synchronously, in the transport's own dispatch context.

use tracing::debug;

use crate::event::SocketEvent;

/// Fire-and-forget publish/subscribe sink for raw socket events
pub trait EventBus: Send + Sync {
    /// Emit a named event. Return values are never consumed.
    fn emit(&self, name: &str, event: &SocketEvent);
}

/// Default bus that republishes events to the tracing subscriber
#[derive(Debug, Default)]
pub struct TracingBus;

impl EventBus for TracingBus {
    fn emit(&self, name: &str, event: &SocketEvent) {
        debug!(name, ?event, "socket event");
    }
}
