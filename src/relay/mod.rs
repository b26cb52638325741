//! Connection manager
//!
//! Owns the transport handle, the reconnection state machine and the
//! injected capabilities (bus, store, timer, transport factory). The
//! event router re-wires each new transport handle back into here.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, TracingBus};
use crate::config::{RelayConfig, TransportSecurity};
use crate::error::RelayError;
use crate::event::SocketEvent;
use crate::store::Store;
use crate::timer::{RetryTimer, TokioRetryTimer};
use crate::transport::{Transport, TransportFactory};
use crate::ws::WsTransportFactory;

mod retry;
mod router;
mod translate;

pub use retry::{RetryDecision, RetryPhase, RetryState};
pub use translate::{default_forward, forward, DefaultForward, StoreEventFilter, CANONICAL_PREFIX};

/// Shared relay state, reachable from router callbacks and timer tasks
pub(crate) struct RelayInner {
    pub(crate) config: RelayConfig,
    pub(crate) bus: Arc<dyn EventBus>,
    pub(crate) store: Option<Arc<dyn Store>>,
    pub(crate) filter: Option<StoreEventFilter>,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) timer: Arc<dyn RetryTimer>,
    /// The externally-visible live transport slot, replaced on reconnect
    pub(crate) transport: Mutex<Option<Box<dyn Transport>>>,
    pub(crate) retry: Mutex<RetryState>,
}

/// A managed WebSocket client connection.
///
/// Construction opens the transport; dropping the relay drops the
/// transport handle and detaches all wiring.
pub struct SocketRelay {
    inner: Arc<RelayInner>,
}

impl SocketRelay {
    /// Start building a relay for the given configuration
    pub fn builder(config: RelayConfig) -> RelayBuilder {
        RelayBuilder {
            config,
            security: TransportSecurity::default(),
            bus: None,
            store: None,
            filter: None,
            factory: None,
            timer: None,
        }
    }

    /// Send a text frame over the live transport
    pub fn send(&self, text: &str) -> Result<(), RelayError> {
        let mut slot = self.inner.transport.lock();
        let transport = slot.as_mut().ok_or(RelayError::NotConnected)?;
        transport.send(text)
    }

    /// Send a structured payload.
    ///
    /// Uses the transport's native structured send when available;
    /// otherwise, in JSON mode, serializes to text and sends that.
    pub fn send_json(&self, payload: &Value) -> Result<(), RelayError> {
        let mut slot = self.inner.transport.lock();
        let transport = slot.as_mut().ok_or(RelayError::NotConnected)?;
        if transport.has_structured_send() {
            transport.send_structured(payload)
        } else if self.inner.config.json_mode() {
            let text = serde_json::to_string(payload).map_err(RelayError::PayloadEncode)?;
            transport.send(&text)
        } else {
            Err(RelayError::StructuredSendUnsupported)
        }
    }

    /// Close the live transport. With reconnection enabled the close
    /// event will trigger the retry machinery like any other closure.
    pub fn close(&self) {
        if let Some(transport) = self.inner.transport.lock().as_mut() {
            transport.close();
        }
    }

    /// Run a closure against the current live transport handle
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut dyn Transport) -> R) -> Option<R> {
        self.inner.transport.lock().as_mut().map(|t| f(t.as_mut()))
    }

    /// Current phase of the reconnection state machine
    pub fn phase(&self) -> RetryPhase {
        self.inner.retry.lock().phase()
    }

    /// Reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.retry.lock().attempts()
    }
}

/// Builder wiring capabilities into a [`SocketRelay`]
pub struct RelayBuilder {
    config: RelayConfig,
    security: TransportSecurity,
    bus: Option<Arc<dyn EventBus>>,
    store: Option<Arc<dyn Store>>,
    filter: Option<StoreEventFilter>,
    factory: Option<Arc<dyn TransportFactory>>,
    timer: Option<Arc<dyn RetryTimer>>,
}

impl RelayBuilder {
    /// Transport security of the embedding context, used to resolve
    /// scheme-relative endpoints (`//host/path`)
    pub fn security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    /// Event bus receiving every raw lifecycle event
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// State store receiving translated events
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Per-event hook replacing the default store translation
    pub fn store_event_filter(mut self, filter: StoreEventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Transport factory (defaults to the tokio-tungstenite transport)
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Retry timer (defaults to the tokio clock)
    pub fn timer(mut self, timer: Arc<dyn RetryTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Open the transport and return the live relay
    pub fn connect(self) -> SocketRelay {
        let mut config = self.config;
        config.normalize_endpoint(self.security);
        config.resolve_method_names();

        let inner = Arc::new(RelayInner {
            config,
            bus: self.bus.unwrap_or_else(|| Arc::new(TracingBus)),
            store: self.store,
            filter: self.filter,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(WsTransportFactory)),
            timer: self.timer.unwrap_or_else(|| Arc::new(TokioRetryTimer)),
            transport: Mutex::new(None),
            retry: Mutex::new(RetryState::new()),
        });

        open(&inner);
        SocketRelay { inner }
    }
}

/// Create a transport for the configured endpoint, attach the event
/// router and publish the handle into the externally-visible slot.
///
/// Never fails synchronously: construction problems surface through the
/// transport's own error/close lifecycle events.
pub(crate) fn open(inner: &Arc<RelayInner>) {
    debug!(endpoint = %inner.config.endpoint, "opening transport");
    let mut transport = inner
        .factory
        .connect(&inner.config.endpoint, inner.config.subprotocol.as_deref());
    router::attach(inner, transport.as_mut());
    *inner.transport.lock() = Some(transport);
}

/// Advance the retry state machine for one close event
pub(crate) fn schedule_reconnect(inner: &Arc<RelayInner>) {
    let decision = inner
        .retry
        .lock()
        .begin_attempt(inner.config.max_reconnection_attempts);

    match decision {
        RetryDecision::Arm { attempt } => {
            let delay = Duration::from_millis(inner.config.reconnection_delay_ms);
            debug!(attempt, delay_ms = inner.config.reconnection_delay_ms, "arming reconnect timer");

            let weak = Arc::downgrade(inner);
            let guard = inner.timer.schedule(
                delay,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        run_reconnect(&inner);
                    }
                }),
            );
            inner.retry.lock().arm(guard);
        }
        RetryDecision::Exhaust => {
            warn!(
                max_attempts = ?inner.config.max_reconnection_attempts,
                "reconnect attempts exhausted"
            );
            notify(inner, "reconnect_error", "SOCKET_RECONNECT_ERROR", SocketEvent::ReconnectFailed);
        }
        RetryDecision::AlreadyExhausted => {}
    }
}

/// Timer fired: announce the attempt, reopen the transport and rebind
/// the router to the fresh handle.
fn run_reconnect(inner: &Arc<RelayInner>) {
    let attempt = {
        let mut retry = inner.retry.lock();
        retry.fired();
        retry.attempts()
    };

    info!(attempt, endpoint = %inner.config.endpoint, "reconnecting");
    notify(
        inner,
        "reconnect",
        "SOCKET_RECONNECT",
        SocketEvent::ReconnectAttempt { attempt },
    );
    open(inner);
}

/// Emit a relay-generated notification on the bus and, when a store is
/// configured, through the translation protocol.
fn notify(inner: &Arc<RelayInner>, bus_name: &str, canonical: &str, event: SocketEvent) {
    inner.bus.emit(bus_name, &event);
    if let Some(store) = &inner.store {
        if let Err(err) = translate::forward(
            &inner.config,
            store.as_ref(),
            inner.filter.as_ref(),
            canonical,
            &event,
        ) {
            error!(error = %err, canonical, "store forwarding failed");
        }
    }
}
