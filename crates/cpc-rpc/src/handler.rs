//! JSON-RPC request handlers.

use crate::params::{
    get_channel_param, get_str_param, parse_params, require_bool_param, require_str_param,
};
use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use cpc_core::{CommunicationPanel, CpcError, EmailRequest, SmsRequest, WhatsAppRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    match dispatch_method(&state.panel, method, &params).await {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

/// Panel results are `false` when the command did not go through.
fn or_false(result: Option<Value>) -> Value {
    result.unwrap_or(Value::Bool(false))
}

fn interaction_id(params: &Value) -> Option<&str> {
    get_str_param(params, "interaction_id", "interactionId")
}

/// Route one RPC method to the panel.
pub(crate) async fn dispatch_method(
    panel: &CommunicationPanel,
    method: &str,
    params: &Value,
) -> cpc_core::Result<Value> {
    match method {
        "get_status" => Ok(json!({
            "initialized": panel.is_initialized(),
            "frame": panel.frame(),
            "tenant_base_url": panel.tenant_base_url().as_str(),
            "active_interaction": panel.active_interaction().to_value(),
            "ongoing_interactions": panel.ongoing_interactions().len(),
        })),

        // ========================================
        // Panel commands
        // ========================================
        "call_out" => {
            let to = require_str_param(params, "to", "to")?;
            let from = get_str_param(params, "from", "from");
            Ok(or_false(panel.call_out(to, from).await))
        }

        "call_state" => {
            let action = require_str_param(params, "action", "action")?;
            Ok(or_false(panel.call_state(action, interaction_id(params)).await))
        }

        "consult" => {
            let to = require_str_param(params, "to", "to")?;
            Ok(or_false(panel.consult(to, interaction_id(params)).await))
        }

        "dtmf" => {
            let tone = require_str_param(params, "tone", "tone")?;
            Ok(or_false(panel.dtmf(tone, interaction_id(params)).await))
        }

        "get_details" => {
            let subject = require_str_param(params, "subject", "subject")?;
            Ok(or_false(panel.get_details(subject).await))
        }

        "get_current_user_queues" => {
            let channel = get_channel_param(params)?;
            Ok(or_false(
                panel.get_current_user_queues(channel).await.map(Value::from),
            ))
        }

        "interaction" => {
            let action = require_str_param(params, "action", "action")?;
            Ok(or_false(panel.interaction(action, interaction_id(params)).await))
        }

        "join_calls" => Ok(or_false(panel.join_calls().await)),

        "message" => {
            let content = require_str_param(params, "content", "content")?;
            Ok(or_false(panel.message(content, interaction_id(params)).await))
        }

        "send_email" => {
            let email: EmailRequest = parse_params(params)?;
            Ok(or_false(panel.send_email(email).await))
        }

        "send_sms" => {
            let sms: SmsRequest = parse_params(params)?;
            Ok(or_false(panel.send_sms(sms).await))
        }

        "start_whatsapp_chat" => {
            let chat: WhatsAppRequest = parse_params(params)?;
            Ok(or_false(panel.start_whatsapp_chat(chat).await))
        }

        "transfer" => {
            let to = require_str_param(params, "to", "to")?;
            Ok(or_false(panel.transfer(to, interaction_id(params)).await))
        }

        // ========================================
        // Presence and REST
        // ========================================
        "set_presence" => {
            let profile = require_str_param(params, "profile", "profile")?;
            Ok(or_false(panel.set_presence(profile).await))
        }

        "set_ready" => {
            let ready = require_bool_param(params, "ready", "ready")?;
            Ok(or_false(panel.set_ready(ready).await))
        }

        "request" => {
            let api = require_str_param(params, "api", "api")?;
            let http_method = require_str_param(params, "method", "method")?;
            let resource = require_str_param(params, "resource", "resource")?;
            let body = params.get("body").filter(|b| !b.is_null()).cloned();
            Ok(or_false(panel.request(api, http_method, resource, body).await))
        }

        // ========================================
        // Session state
        // ========================================
        "has_ongoing_interaction" => {
            let channel = get_channel_param(params)?;
            Ok(Value::Bool(panel.has_ongoing_interaction(channel)))
        }

        "ongoing_interactions" => {
            serde_json::to_value(panel.ongoing_interactions()).map_err(CpcError::from)
        }

        "active_interaction" => Ok(panel.active_interaction().to_value()),

        "current_user" => Ok(panel.current_user().unwrap_or(Value::Null)),

        "tenant_base_url" => Ok(Value::String(panel.tenant_base_url().to_string())),

        "unload" => Ok(Value::Bool(panel.unload().await)),

        _ => Err(CpcError::MethodNotFound(method.to_string())),
    }
}
