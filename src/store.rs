//! Application state store capability

use serde::Deserialize;
use serde_json::Value;

/// External state container with two named invocation methods.
///
/// The relay never interprets what a commit or dispatch does; it only
/// routes translated events to one of the two.
pub trait Store: Send + Sync {
    /// Apply a state mutation
    fn commit(&self, target: &str, payload: Value);
    /// Trigger an asynchronous action
    fn dispatch(&self, target: &str, payload: Value);
}

/// Which store method unmatched targets route through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMethod {
    /// Route through `Store::commit` (the default)
    #[default]
    Commit,
    /// Route through `Store::dispatch`
    Dispatch,
}

impl StoreMethod {
    /// Invoke the selected method on a store
    pub fn invoke(self, store: &dyn Store, target: &str, payload: Value) {
        match self {
            StoreMethod::Commit => store.commit(target, payload),
            StoreMethod::Dispatch => store.dispatch(target, payload),
        }
    }
}
