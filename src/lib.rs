//! ws-relay
//!
//! Connection-lifecycle manager for a single WebSocket client:
//! establishes a socket, re-establishes it after unexpected closure
//! under a bounded-retry policy, and republishes every lifecycle event
//! through a generic event bus and an optional state store.
//!
//! The transport, bus, store and retry timer are injected capabilities,
//! so the core runs deterministically under test fakes and a manual
//! clock. A production transport backed by tokio-tungstenite lives in
//! [`ws`].

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod relay;
pub mod store;
pub mod timer;
pub mod transport;
pub mod ws;

pub use bus::{EventBus, TracingBus};
pub use config::{LoggingConfig, PayloadFormat, RelayConfig, TransportSecurity};
pub use error::RelayError;
pub use event::{Lifecycle, MessageData, SocketEvent};
pub use relay::{DefaultForward, RelayBuilder, RetryPhase, SocketRelay, StoreEventFilter};
pub use store::{Store, StoreMethod};
pub use timer::{RetryTimer, TimerGuard, TokioRetryTimer};
pub use transport::{EventSlots, Transport, TransportFactory};
pub use ws::WsTransportFactory;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
