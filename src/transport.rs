//! Transport capability
//!
//! The relay owns a live duplex-socket abstraction through these traits.
//! The wire protocol itself (framing, handshake) lives behind them.

use serde_json::Value;

use crate::error::RelayError;
use crate::event::{Lifecycle, SocketEvent};

/// Callback bound to one lifecycle slot.
///
/// The `Result` lets payload decode errors propagate back to the
/// transport driver instead of being swallowed inside the router.
pub type EventCallback = Box<dyn FnMut(SocketEvent) -> Result<(), RelayError> + Send>;

/// The four assignable lifecycle-callback slots of a transport
pub struct EventSlots {
    pub on_open: EventCallback,
    pub on_message: EventCallback,
    pub on_error: EventCallback,
    pub on_close: EventCallback,
}

impl EventSlots {
    /// Slots that drop every event
    pub fn noop() -> Self {
        Self {
            on_open: Box::new(|_| Ok(())),
            on_message: Box::new(|_| Ok(())),
            on_error: Box::new(|_| Ok(())),
            on_close: Box::new(|_| Ok(())),
        }
    }

    /// Invoke the slot matching a lifecycle signal
    pub fn invoke(&mut self, lifecycle: Lifecycle, event: SocketEvent) -> Result<(), RelayError> {
        match lifecycle {
            Lifecycle::Open => (self.on_open)(event),
            Lifecycle::Message => (self.on_message)(event),
            Lifecycle::Error => (self.on_error)(event),
            Lifecycle::Close => (self.on_close)(event),
        }
    }
}

impl std::fmt::Debug for EventSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSlots").finish_non_exhaustive()
    }
}

/// A live duplex-socket handle
pub trait Transport: Send {
    /// Send a text frame
    fn send(&mut self, text: &str) -> Result<(), RelayError>;

    /// Send a structured payload natively, when the transport supports it.
    /// Transports without the capability keep the default implementation;
    /// the relay synthesizes serialization on top of `send` in JSON mode.
    fn send_structured(&mut self, _payload: &Value) -> Result<(), RelayError> {
        Err(RelayError::StructuredSendUnsupported)
    }

    /// Whether `send_structured` is natively available
    fn has_structured_send(&self) -> bool {
        false
    }

    /// Close the socket
    fn close(&mut self);

    /// Assign the lifecycle callbacks, replacing any previous binding.
    /// Called once per (re)connect; binding must be idempotent.
    fn bind(&mut self, slots: EventSlots);
}

/// Creates transport handles bound to an endpoint.
///
/// Construction never fails synchronously: connection failures are
/// reported through the handle's `error` and `close` lifecycle events.
pub trait TransportFactory: Send + Sync {
    fn connect(&self, endpoint: &str, subprotocol: Option<&str>) -> Box<dyn Transport>;
}
