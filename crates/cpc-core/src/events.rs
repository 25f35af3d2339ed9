//! Host-facing events.
//!
//! Every event the panel sends (after dispatch) and every event CPC
//! synthesizes locally reaches the host through one replaceable
//! [`HostEventHandler`].

use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

/// Receives every dispatched or synthesized event.
pub trait HostEventHandler: Send + Sync {
    fn on_event(&self, event: Value);
}

impl<F> HostEventHandler for F
where
    F: Fn(Value) + Send + Sync,
{
    fn on_event(&self, event: Value) {
        self(event)
    }
}

/// Ids of the events CPC fabricates itself.
pub struct SyntheticEvent;

impl SyntheticEvent {
    pub const INIT: &'static str = "cpc-init";
    pub const ONLOAD: &'static str = "cpc-onload";
    pub const PROFILE_CHANGE: &'static str = "cpc-profileChange";
    pub const READY_STATE: &'static str = "cpc-readyState";

    /// Window messaging with the panel is up and the user is known.
    pub fn init(current_user: Value) -> Value {
        status_event(Self::INIT, "init", current_user)
    }

    /// The panel page finished loading in its frame.
    pub fn onload() -> Value {
        status_event(
            Self::ONLOAD,
            "onload",
            Value::String("Communication Panel loaded in iframe".to_string()),
        )
    }

    /// A presence profile was applied through the REST interface.
    pub fn profile_changed(profile: Value) -> Value {
        status_event(Self::PROFILE_CHANGE, "profile", profile)
    }

    /// The ready state was switched through the REST interface.
    pub fn ready_state_changed(work_status: &str) -> Value {
        status_event(
            Self::READY_STATE,
            "work_status",
            Value::String(work_status.to_string()),
        )
    }

    /// A synthesized operation failed; `error` carries the detail.
    pub fn failed(id: &str, error: Value) -> Value {
        json!({ "id": id, "error": error })
    }
}

fn status_event(id: &str, attribute: &str, value: Value) -> Value {
    json!({
        "id": id,
        "type": "status",
        "payload": {
            "attribute": attribute,
            "value": value,
        }
    })
}

/// Handler slot shared by the dispatcher and the public API.
#[derive(Clone)]
pub struct EventSink {
    handler: Arc<RwLock<Arc<dyn HostEventHandler>>>,
}

impl EventSink {
    pub fn new(handler: Arc<dyn HostEventHandler>) -> Self {
        Self {
            handler: Arc::new(RwLock::new(handler)),
        }
    }

    /// Replace the host handler; later events go to the new one.
    pub fn replace(&self, handler: Arc<dyn HostEventHandler>) {
        let mut slot = self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = handler;
    }

    /// Deliver an event to the current host handler.
    pub fn emit(&self, event: Value) {
        // Clone the handler out so a handler may call `replace` re-entrantly.
        let handler = self
            .handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        handler.on_event(event);
    }
}
