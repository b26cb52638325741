//! Store translation protocol
//!
//! Decides which store method to call, with which target name, given a
//! canonical `SOCKET_*` event. JSON message bodies are decoded into a
//! three-variant directive (mutation / action / plain) that steers the
//! routing.

use serde::Deserialize;
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::event::SocketEvent;
use crate::store::{Store, StoreMethod};

/// Canonical name prefix; anything else is ignored by the protocol
pub const CANONICAL_PREFIX: &str = "SOCKET_";

/// Callback performing the default translation, handed to a filter
pub type DefaultForward<'a> = &'a dyn Fn(&str, &SocketEvent) -> Result<(), RelayError>;

/// Per-event interception hook. When configured, it runs instead of the
/// default translation and may transform, suppress or delegate.
pub type StoreEventFilter =
    Box<dyn Fn(&str, &SocketEvent, DefaultForward<'_>) -> Result<(), RelayError> + Send + Sync>;

/// Structured directive carried by a JSON message body
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum StoreDirective {
    Mutation {
        mutation: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        payload: Option<Value>,
    },
    Action {
        action: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        payload: Option<Value>,
    },
}

/// Forward one event to the store, honoring a configured filter
pub fn forward(
    config: &RelayConfig,
    store: &dyn Store,
    filter: Option<&StoreEventFilter>,
    name: &str,
    event: &SocketEvent,
) -> Result<(), RelayError> {
    match filter {
        Some(intercept) => intercept(name, event, &|name, event| {
            default_forward(config, store, name, event)
        }),
        None => default_forward(config, store, name, event),
    }
}

/// The default translation: prefix guard, JSON directive decode, method
/// name mapping, store invocation.
pub fn default_forward(
    config: &RelayConfig,
    store: &dyn Store,
    name: &str,
    event: &SocketEvent,
) -> Result<(), RelayError> {
    // Only lifecycle-derived names are ever processed
    if !name.starts_with(CANONICAL_PREFIX) {
        return Ok(());
    }

    let mut method = config.store_method;
    let mut target = name.to_string();
    let mut payload = event.raw_payload();

    if config.json_mode() {
        if let Some(text) = event.text() {
            // A server that claims a structured protocol but sends
            // malformed data violates the contract; propagate.
            let body: Value =
                serde_json::from_str(text).map_err(RelayError::PayloadDecode)?;

            match serde_json::from_value::<StoreDirective>(body.clone()) {
                Ok(StoreDirective::Mutation {
                    mutation,
                    namespace,
                    payload: inner,
                }) => {
                    method = StoreMethod::Commit;
                    target = namespaced(namespace.as_deref(), &mutation);
                    payload = inner.unwrap_or(body);
                }
                Ok(StoreDirective::Action {
                    action,
                    namespace,
                    payload: inner,
                }) => {
                    method = StoreMethod::Dispatch;
                    target = namespaced(namespace.as_deref(), &action);
                    payload = inner.unwrap_or(body);
                }
                // Plain message: defaults stand, the body is the payload
                Err(_) => payload = body,
            }
        }
    }

    if let Some(map) = &config.method_names {
        if let Some(mapped) = map.get(&target) {
            target = mapped.clone();
        }
    }

    method.invoke(store, &target, payload);
    Ok(())
}

/// Join a namespace to a handler name, omitting empty namespaces
fn namespaced(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayloadFormat;
    use crate::event::MessageData;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<(StoreMethod, String, Value)>>,
    }

    impl Store for RecordingStore {
        fn commit(&self, target: &str, payload: Value) {
            self.calls
                .lock()
                .push((StoreMethod::Commit, target.to_string(), payload));
        }
        fn dispatch(&self, target: &str, payload: Value) {
            self.calls
                .lock()
                .push((StoreMethod::Dispatch, target.to_string(), payload));
        }
    }

    fn json_config() -> RelayConfig {
        let mut config = RelayConfig::new("ws://localhost/ws");
        config.payload_format = Some(PayloadFormat::Json);
        config
    }

    fn text_event(text: &str) -> SocketEvent {
        SocketEvent::MessageReceived {
            data: MessageData::Text(text.to_string()),
        }
    }

    #[test]
    fn test_mutation_routes_to_commit_with_namespace() {
        let config = json_config();
        let store = RecordingStore::default();

        let event = text_event(r#"{"mutation":"setUser","namespace":"auth","payload":{"id":7}}"#);
        default_forward(&config, &store, "SOCKET_MESSAGE", &event).unwrap();

        let calls = store.calls.lock();
        assert_eq!(
            *calls,
            vec![(
                StoreMethod::Commit,
                "auth/setUser".to_string(),
                json!({"id": 7})
            )]
        );
    }

    #[test]
    fn test_action_without_namespace_dispatches_whole_body() {
        let config = json_config();
        let store = RecordingStore::default();

        let event = text_event(r#"{"action":"login"}"#);
        default_forward(&config, &store, "SOCKET_MESSAGE", &event).unwrap();

        let calls = store.calls.lock();
        assert_eq!(
            *calls,
            vec![(
                StoreMethod::Dispatch,
                "login".to_string(),
                json!({"action": "login"})
            )]
        );
    }

    #[test]
    fn test_method_name_map_substitutes_target() {
        let mut config = json_config();
        config.method_names = Some(HashMap::from([(
            "auth/setUser".to_string(),
            "AUTH_SET_USER".to_string(),
        )]));
        let store = RecordingStore::default();

        let event = text_event(r#"{"mutation":"setUser","namespace":"auth","payload":{"id":7}}"#);
        default_forward(&config, &store, "SOCKET_MESSAGE", &event).unwrap();

        let calls = store.calls.lock();
        assert_eq!(
            *calls,
            vec![(
                StoreMethod::Commit,
                "AUTH_SET_USER".to_string(),
                json!({"id": 7})
            )]
        );
    }

    #[test]
    fn test_plain_body_keeps_defaults() {
        let config = json_config();
        let store = RecordingStore::default();

        let event = text_event(r#"{"status":"ok"}"#);
        default_forward(&config, &store, "SOCKET_MESSAGE", &event).unwrap();

        let calls = store.calls.lock();
        assert_eq!(
            *calls,
            vec![(
                StoreMethod::Commit,
                "SOCKET_MESSAGE".to_string(),
                json!({"status": "ok"})
            )]
        );
    }

    #[test]
    fn test_non_canonical_name_is_noop() {
        let config = json_config();
        let store = RecordingStore::default();

        default_forward(&config, &store, "CUSTOM_EVENT", &text_event("{}")).unwrap();
        assert!(store.calls.lock().is_empty());
    }

    #[test]
    fn test_malformed_json_propagates() {
        let config = json_config();
        let store = RecordingStore::default();

        let result = default_forward(&config, &store, "SOCKET_MESSAGE", &text_event("{not json"));
        assert!(matches!(result, Err(RelayError::PayloadDecode(_))));
        assert!(store.calls.lock().is_empty());
    }

    #[test]
    fn test_raw_mode_forwards_event_verbatim() {
        let config = RelayConfig::new("ws://localhost/ws");
        let store = RecordingStore::default();

        let event = text_event(r#"{"mutation":"ignored"}"#);
        default_forward(&config, &store, "SOCKET_MESSAGE", &event).unwrap();

        let calls = store.calls.lock();
        assert_eq!(calls.len(), 1);
        let (method, target, payload) = &calls[0];
        // Without JSON mode the body is not interpreted
        assert_eq!(*method, StoreMethod::Commit);
        assert_eq!(target, "SOCKET_MESSAGE");
        assert_eq!(payload["event"], "message_received");
    }

    #[test]
    fn test_non_object_body_is_plain() {
        let config = json_config();
        let store = RecordingStore::default();

        default_forward(&config, &store, "SOCKET_MESSAGE", &text_event("42")).unwrap();

        let calls = store.calls.lock();
        assert_eq!(
            *calls,
            vec![(StoreMethod::Commit, "SOCKET_MESSAGE".to_string(), json!(42))]
        );
    }

    #[test]
    fn test_filter_can_suppress_and_delegate() {
        let config = json_config();
        let store = RecordingStore::default();

        let filter: StoreEventFilter = Box::new(
            |name: &str, event: &SocketEvent, forward_default: DefaultForward<'_>| {
                if name == "SOCKET_ERROR" {
                    return Ok(()); // suppressed
                }
                forward_default(name, event)
            },
        );

        forward(
            &config,
            &store,
            Some(&filter),
            "SOCKET_ERROR",
            &SocketEvent::Errored {
                message: "boom".to_string(),
            },
        )
        .unwrap();
        assert!(store.calls.lock().is_empty());

        forward(
            &config,
            &store,
            Some(&filter),
            "SOCKET_MESSAGE",
            &text_event(r#"{"action":"login"}"#),
        )
        .unwrap();
        assert_eq!(store.calls.lock().len(), 1);
    }

    #[test]
    fn test_reconnect_notification_payloads() {
        let config = json_config();
        let store = RecordingStore::default();

        default_forward(
            &config,
            &store,
            "SOCKET_RECONNECT",
            &SocketEvent::ReconnectAttempt { attempt: 2 },
        )
        .unwrap();
        default_forward(&config, &store, "SOCKET_RECONNECT_ERROR", &SocketEvent::ReconnectFailed)
            .unwrap();

        let calls = store.calls.lock();
        assert_eq!(calls[0], (StoreMethod::Commit, "SOCKET_RECONNECT".to_string(), json!(2)));
        assert_eq!(
            calls[1],
            (StoreMethod::Commit, "SOCKET_RECONNECT_ERROR".to_string(), json!(true))
        );
    }
}
