//! Wire format between CPC and the Communication Panel.
//!
//! Outbound actions are `{id, type: "action", payload}` envelopes whose
//! payload names the calling operation (`cpcFn`), the panel command and a
//! command specific value. Inbound messages are `{type, id?, payload}`
//! objects; [`classify`] decides which dispatcher route they take.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PanelConfig;

/// Message `type` values used on the wire.
pub struct MessageType;

impl MessageType {
    pub const ACTION: &'static str = "action";
    pub const INIT: &'static str = "init";
    pub const RESPONSE: &'static str = "response";
    pub const STATE: &'static str = "state";
}

/// `payload.attribute` values of `state` messages with dedicated routes.
pub struct StateAttribute;

impl StateAttribute {
    pub const ACTIVE_INTERACTION: &'static str = "activeInteraction";
    pub const STATUS: &'static str = "status";
    pub const CHANNEL_STATUS: &'static str = "channel_status";
}

/// Payload of an outbound action before it is given an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest<V = Value> {
    /// Name of the public operation that issued the action; prefixes the action id.
    pub cpc_fn: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<V>,
}

impl<V> ActionRequest<V> {
    pub fn new(cpc_fn: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            cpc_fn: cpc_fn.into(),
            command: command.into(),
            interaction_id: None,
            value: None,
        }
    }

    pub fn with_interaction(mut self, interaction_id: Option<String>) -> Self {
        self.interaction_id = interaction_id;
        self
    }

    pub fn with_value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }
}

/// Envelope posted to the panel for every action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl ActionEnvelope {
    pub fn new(id: String, payload: Value) -> Self {
        Self {
            id,
            kind: MessageType::ACTION.to_string(),
            payload,
        }
    }
}

/// Init request the panel caches and answers once the user has logged in.
pub fn init_request() -> Value {
    json!({
        "id": PanelConfig::INIT_REQUEST_ID,
        "type": MessageType::INIT,
        "payload": false,
    })
}

/// A correlated response message from the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerResponse(pub Value);

impl PeerResponse {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Value {
        self.0.get("payload").unwrap_or(&Value::Null)
    }

    /// `payload.value`, where the panel puts the command result.
    pub fn value(&self) -> &Value {
        self.payload().get("value").unwrap_or(&Value::Null)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Dispatcher route of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// First init answer from the panel (empty value).
    Init,
    /// Answer to a previously sent action.
    Response { id: String },
    ActiveInteraction,
    Status,
    ChannelStatus,
    /// Anything else goes to the host unmodified.
    Passthrough,
}

/// Classify an inbound message by `type` and, for state messages, `payload.attribute`.
pub fn classify(data: &Value) -> Route {
    let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
    let payload = data.get("payload");

    match kind {
        MessageType::INIT if payload.map(has_empty_value).unwrap_or(false) => Route::Init,
        MessageType::RESPONSE => match data.get("id").and_then(Value::as_str) {
            Some(id) => Route::Response { id: id.to_string() },
            None => Route::Passthrough,
        },
        MessageType::STATE => {
            let attribute = payload
                .and_then(|p| p.get("attribute"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            match attribute {
                StateAttribute::ACTIVE_INTERACTION => Route::ActiveInteraction,
                StateAttribute::STATUS => Route::Status,
                StateAttribute::CHANNEL_STATUS => Route::ChannelStatus,
                _ => Route::Passthrough,
            }
        }
        _ => Route::Passthrough,
    }
}

fn has_empty_value(payload: &Value) -> bool {
    match payload.get("value") {
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

/// Legacy SAP C4C style messages (`payload.type == "MESSAGE"`) are not CPC traffic.
pub fn is_legacy_message(data: &Value) -> bool {
    data.get("payload")
        .and_then(|p| p.get("type"))
        .and_then(Value::as_str)
        == Some("MESSAGE")
}
