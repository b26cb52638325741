//! Event router
//!
//! Pure wiring: binds the four lifecycle slots on the current transport
//! handle. Re-invoked after every successful open because a fresh
//! transport is a distinct object whose slots must be re-assigned.

use std::sync::{Arc, Weak};

use crate::event::Lifecycle;
use crate::transport::{EventCallback, EventSlots, Transport};

use super::{translate, RelayInner};

/// Bind the relay's lifecycle handling onto a transport handle
pub(crate) fn attach(inner: &Arc<RelayInner>, transport: &mut dyn Transport) {
    transport.bind(EventSlots {
        on_open: lifecycle_callback(inner, Lifecycle::Open),
        on_message: lifecycle_callback(inner, Lifecycle::Message),
        on_error: lifecycle_callback(inner, Lifecycle::Error),
        on_close: lifecycle_callback(inner, Lifecycle::Close),
    });
}

/// Build the callback for one lifecycle slot.
///
/// Per firing, strictly in order: bus emission, store forwarding, then
/// retry bookkeeping (open resets the counter, close schedules a
/// retry). Holds only a weak reference so a dropped relay detaches.
fn lifecycle_callback(inner: &Arc<RelayInner>, lifecycle: Lifecycle) -> EventCallback {
    let weak: Weak<RelayInner> = Arc::downgrade(inner);
    Box::new(move |event| {
        let Some(inner) = weak.upgrade() else {
            return Ok(());
        };

        // 1. Bus emission always precedes store forwarding
        inner.bus.emit(lifecycle.name(), &event);

        // 2. Store forwarding; decode errors propagate to the driver
        let forwarded = match &inner.store {
            Some(store) => translate::forward(
                &inner.config,
                store.as_ref(),
                inner.filter.as_ref(),
                lifecycle.canonical(),
                &event,
            ),
            None => Ok(()),
        };

        // 3./4. Retry bookkeeping
        match lifecycle {
            Lifecycle::Open => inner
                .retry
                .lock()
                .mark_connected(inner.config.reconnection),
            Lifecycle::Close if inner.config.reconnection => super::schedule_reconnect(&inner),
            _ => {}
        }

        forwarded
    })
}
