//! WebSocket transport backed by tokio-tungstenite
//!
//! Each connect spawns a driver task that performs the handshake and
//! pumps frames both ways, mapping socket activity onto the four
//! lifecycle slots. Handler errors (payload decode failures in JSON
//! mode) are logged here and the connection is kept alive.

use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::error::RelayError;
use crate::event::{Lifecycle, MessageData, SocketEvent};
use crate::transport::{EventSlots, Transport, TransportFactory};

/// Creates tokio-tungstenite transports
#[derive(Debug, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn connect(&self, endpoint: &str, subprotocol: Option<&str>) -> Box<dyn Transport> {
        let slots = Arc::new(Mutex::new(EventSlots::noop()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (bound_tx, bound_rx) = oneshot::channel();

        tokio::spawn(drive(
            endpoint.to_string(),
            subprotocol.map(str::to_string),
            slots.clone(),
            outbound_rx,
            bound_rx,
        ));

        Box::new(WsTransport {
            outbound: outbound_tx,
            slots,
            bound: Some(bound_tx),
        })
    }
}

/// Live transport handle; frames queue through the driver task
pub struct WsTransport {
    outbound: UnboundedSender<Message>,
    slots: Arc<Mutex<EventSlots>>,
    bound: Option<oneshot::Sender<()>>,
}

impl Transport for WsTransport {
    fn send(&mut self, text: &str) -> Result<(), RelayError> {
        self.outbound
            .send(Message::text(text))
            .map_err(|_| RelayError::NotConnected)
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    fn bind(&mut self, slots: EventSlots) {
        *self.slots.lock() = slots;
        if let Some(bound) = self.bound.take() {
            let _ = bound.send(());
        }
    }
}

/// Build the handshake request, attaching the subprotocol header
fn build_request(endpoint: &str, subprotocol: Option<&str>) -> Result<Request> {
    let mut request = endpoint.into_client_request()?;
    if let Some(proto) = subprotocol {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(proto)?);
    }
    Ok(request)
}

/// Connection driver: handshake, then pump frames until closure.
///
/// Failures never surface synchronously; they arrive as `error` and
/// `close` lifecycle events, mirroring the browser socket contract the
/// relay's retry machinery expects.
async fn drive(
    endpoint: String,
    subprotocol: Option<String>,
    slots: Arc<Mutex<EventSlots>>,
    mut outbound: UnboundedReceiver<Message>,
    bound: oneshot::Receiver<()>,
) {
    // Hold off until the lifecycle slots are bound: a fast handshake
    // failure must not fire into the initial no-op slots.
    if bound.await.is_err() {
        // Handle dropped before binding; nobody is listening
        return;
    }

    let request = match build_request(&endpoint, subprotocol.as_deref()) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, endpoint, "invalid connection request");
            fire(&slots, Lifecycle::Error, SocketEvent::Errored { message: err.to_string() });
            fire(
                &slots,
                Lifecycle::Close,
                SocketEvent::Closed { code: None, reason: err.to_string() },
            );
            return;
        }
    };

    let stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            error!(error = %err, endpoint, "connection failed");
            fire(&slots, Lifecycle::Error, SocketEvent::Errored { message: err.to_string() });
            fire(
                &slots,
                Lifecycle::Close,
                SocketEvent::Closed { code: None, reason: err.to_string() },
            );
            return;
        }
    };

    info!(endpoint, "connected");
    fire(&slots, Lifecycle::Open, SocketEvent::Opened);

    let (mut write, mut read) = stream.split();
    let mut close_code = None;
    let mut close_reason = String::new();

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    fire(
                        &slots,
                        Lifecycle::Message,
                        SocketEvent::MessageReceived { data: MessageData::Text(text.to_string()) },
                    );
                }
                Some(Ok(Message::Binary(data))) => {
                    fire(
                        &slots,
                        Lifecycle::Message,
                        SocketEvent::MessageReceived { data: MessageData::Binary(data.to_vec()) },
                    );
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_code = Some(u16::from(frame.code));
                        close_reason = frame.reason.to_string();
                    }
                    debug!(endpoint, code = ?close_code, "received close frame");
                    break;
                }
                // Pongs are produced by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!(error = %err, endpoint, "read error");
                    close_reason = err.to_string();
                    fire(&slots, Lifecycle::Error, SocketEvent::Errored { message: err.to_string() });
                    break;
                }
                None => break,
            },
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if let Err(err) = write.send(message).await {
                        error!(error = %err, endpoint, "send failed");
                        fire(&slots, Lifecycle::Error, SocketEvent::Errored { message: err.to_string() });
                        break;
                    }
                }
                None => {
                    // Transport handle dropped; close out gracefully
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    info!(endpoint, "disconnected");
    fire(
        &slots,
        Lifecycle::Close,
        SocketEvent::Closed { code: close_code, reason: close_reason },
    );
}

/// Invoke one lifecycle slot, logging handler failures.
///
/// A failed handler here means a malformed structured payload; dropping
/// the connection for it is the integration layer's call, and this one
/// keeps the socket open.
fn fire(slots: &Arc<Mutex<EventSlots>>, lifecycle: Lifecycle, event: SocketEvent) {
    if let Err(err) = slots.lock().invoke(lifecycle, event) {
        error!(error = %err, %lifecycle, "lifecycle handler failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EventCallback;

    fn recording_slots(tx: UnboundedSender<(Lifecycle, SocketEvent)>) -> EventSlots {
        let slot = move |lifecycle: Lifecycle| -> EventCallback {
            let tx = tx.clone();
            Box::new(move |event| {
                let _ = tx.send((lifecycle, event));
                Ok(())
            })
        };
        EventSlots {
            on_open: slot(Lifecycle::Open),
            on_message: slot(Lifecycle::Message),
            on_error: slot(Lifecycle::Error),
            on_close: slot(Lifecycle::Close),
        }
    }

    #[tokio::test]
    async fn test_fast_failure_waits_for_slot_binding() {
        let mut transport = WsTransportFactory.connect("not a url", None);

        // Give the driver task every chance to run ahead of the binding;
        // it must hold its error/close events until the slots exist.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.bind(recording_slots(tx));

        let (lifecycle, _) = rx.recv().await.expect("error event");
        assert_eq!(lifecycle, Lifecycle::Error);
        let (lifecycle, event) = rx.recv().await.expect("close event");
        assert_eq!(lifecycle, Lifecycle::Close);
        assert!(matches!(event, SocketEvent::Closed { code: None, .. }));
    }

    #[test]
    fn test_build_request_plain() {
        let request = build_request("ws://localhost:9001/ws", None).unwrap();
        assert_eq!(request.uri().path(), "/ws");
        assert!(!request.headers().contains_key("Sec-WebSocket-Protocol"));
    }

    #[test]
    fn test_build_request_with_subprotocol() {
        let request = build_request("wss://example.com/socket", Some("graphql-ws")).unwrap();
        assert_eq!(
            request.headers().get("Sec-WebSocket-Protocol").unwrap(),
            "graphql-ws"
        );
    }

    #[test]
    fn test_build_request_rejects_bad_endpoint() {
        assert!(build_request("not a url", None).is_err());
    }
}
