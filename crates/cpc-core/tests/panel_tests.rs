//! End-to-end tests of the panel handle against a scripted in-memory panel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use cpc_core::{
    ActiveInteraction, ChannelPeer, ChannelType, CommunicationPanel, CpcError, FrameSpec,
    HostEventHandler, LoadConfig, MountTarget, PostedMessage, SmsRequest, WindowMessage,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

const TENANT: &str = "https://tenant.example.com";
const ORIGIN: &str = "https://tenant.example.com";
const CHAT_ID: &str = "cccccccccccccccccccccccccccccccc";

#[derive(Default)]
struct RecordingMount {
    mounted: Mutex<Vec<FrameSpec>>,
    unmounted: Mutex<Vec<String>>,
}

impl MountTarget for RecordingMount {
    fn mount(&self, frame: &FrameSpec) -> cpc_core::Result<()> {
        self.mounted.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn unmount(&self, frame_id: &str) -> cpc_core::Result<()> {
        self.unmounted.lock().unwrap().push(frame_id.to_string());
        Ok(())
    }
}

struct FailingMount;

impl MountTarget for FailingMount {
    fn mount(&self, _frame: &FrameSpec) -> cpc_core::Result<()> {
        Err(CpcError::Mount {
            message: "parent element not found".to_string(),
        })
    }

    fn unmount(&self, _frame_id: &str) -> cpc_core::Result<()> {
        Ok(())
    }
}

type Events = Arc<Mutex<Vec<Value>>>;

fn recorder() -> (Arc<dyn HostEventHandler>, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let handler: Arc<dyn HostEventHandler> = {
        let events = events.clone();
        Arc::new(move |event: Value| events.lock().unwrap().push(event))
    };
    (handler, events)
}

/// Answer every action the way a logged in panel would.
fn spawn_fake_panel(
    mut outbound: mpsc::UnboundedReceiver<PostedMessage>,
    panel: &CommunicationPanel,
    origin: &'static str,
) -> Arc<Mutex<Vec<Value>>> {
    let sink = panel.message_sink();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        while let Some(posted) = outbound.recv().await {
            let message = posted.message;
            log.lock().unwrap().push(message.clone());

            let reply = match message["type"].as_str() {
                Some("init") => json!({"type": "init", "payload": {"value": ""}}),
                Some("action") => {
                    let payload = &message["payload"];
                    let value = match (payload["command"].as_str(), payload["value"].as_str()) {
                        (Some("detail"), Some("user")) => {
                            json!({"id": "agent-1", "name": "Agent One", "presence": "p"})
                        }
                        (Some("detail"), Some("queues")) => json!([
                            {"type": "phone", "addresses": [{"address": "+35810100"}]},
                            {"type": "chat", "addresses": [{"address": "chat@example.com"}]}
                        ]),
                        _ => json!({"echo": payload.clone()}),
                    };
                    json!({"id": message["id"], "type": "response", "payload": {"value": value}})
                }
                _ => continue,
            };
            sink.deliver(WindowMessage::new(origin, reply));
        }
    });
    seen
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn loaded_panel() -> (CommunicationPanel, Events, Arc<Mutex<Vec<Value>>>) {
    let (handler, events) = recorder();
    let config = LoadConfig::builder(TENANT, handler, Arc::new(RecordingMount::default()))
        .min_width(360)
        .build()
        .unwrap();
    let panel = CommunicationPanel::load(config).await.unwrap();

    let (peer, outbound) = ChannelPeer::new();
    let seen = spawn_fake_panel(outbound, &panel, ORIGIN);
    panel.frame_loaded(Arc::new(peer)).unwrap();

    wait_until(|| panel.current_user().is_some()).await;
    (panel, events, seen)
}

#[tokio::test]
async fn test_load_mounts_frame() {
    let (handler, _) = recorder();
    let mount = Arc::new(RecordingMount::default());
    let config = LoadConfig::builder(TENANT, handler, mount.clone())
        .deny_popout(true)
        .build()
        .unwrap();

    let panel = CommunicationPanel::load(config).await.unwrap();

    let mounted = mount.mounted.lock().unwrap();
    assert_eq!(mounted.len(), 1);
    assert_eq!(mounted[0].id, "CPC-frame");
    assert_eq!(mounted[0].allow, "microphone");
    assert_eq!(
        mounted[0].src.as_str(),
        "https://tenant.example.com/ecf/latest/communicationpanel/embedded.html?salesforce=true&denyPopout=true"
    );
    assert_eq!(panel.tenant_base_url().as_str(), "https://tenant.example.com/");
    assert!(!panel.is_initialized());
}

#[tokio::test]
async fn test_mount_failure_aborts_load() {
    let (handler, _) = recorder();
    let config = LoadConfig::builder(TENANT, handler, Arc::new(FailingMount))
        .build()
        .unwrap();
    let err = CommunicationPanel::load(config).await.unwrap_err();
    assert!(matches!(err, CpcError::Mount { .. }));
}

#[tokio::test]
async fn test_handshake_emits_onload_and_init() {
    let (panel, events, seen) = loaded_panel().await;

    assert_eq!(seen.lock().unwrap()[0]["id"], "initRequest");
    wait_until(|| events.lock().unwrap().iter().any(|e| e["id"] == "cpc-init")).await;

    let events = events.lock().unwrap();
    assert_eq!(events[0]["id"], "cpc-onload");
    let init = events.iter().find(|e| e["id"] == "cpc-init").unwrap();
    assert_eq!(init["payload"]["value"]["name"], "Agent One");
    assert!(panel.is_initialized());
}

#[tokio::test]
async fn test_commands_round_trip() {
    let (panel, _, seen) = loaded_panel().await;

    let response = panel.dtmf("5", None).await.unwrap();
    assert_eq!(response["type"], "response");
    assert_eq!(response["payload"]["value"]["echo"]["command"], "dtmf");
    assert_eq!(response["payload"]["value"]["echo"]["value"]["content"], "5");

    let response = panel
        .send_sms(SmsRequest {
            to: "+358401234567".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response["payload"]["value"]["echo"]["value"]["channel"], "sms");

    let sent: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str().map(str::to_string))
        .collect();
    assert!(sent.iter().any(|id| id.starts_with("dtmf-action-")));
    assert!(sent.iter().any(|id| id.starts_with("sendSMS-action-")));
}

#[tokio::test]
async fn test_invalid_input_never_sent() {
    let (panel, _, seen) = loaded_panel().await;
    let before = seen.lock().unwrap().len();

    assert!(panel.dtmf("Z", None).await.is_none());
    assert!(panel.get_details("everything").await.is_none());
    assert!(panel.join_calls().await.is_none());
    assert!(panel.request("XYZ", "GET", "/users", None).await.is_none());

    assert_eq!(seen.lock().unwrap().len(), before);
}

#[tokio::test]
async fn test_call_out_checks_source_queue() {
    let (panel, _, _) = loaded_panel().await;

    let queues = panel
        .get_current_user_queues(Some(ChannelType::Phone))
        .await
        .unwrap();
    assert_eq!(queues.len(), 1);

    assert!(panel.call_out("+358401234567", Some("+35899999")).await.is_none());
    let response = panel
        .call_out("+358401234567", Some("+35810100"))
        .await
        .unwrap();
    assert_eq!(
        response["payload"]["value"]["echo"]["value"],
        json!({"channel": "phone", "to": "+358401234567", "from": "+35810100"})
    );
}

#[tokio::test]
async fn test_status_events_track_ongoing_interactions() {
    let (panel, events, _) = loaded_panel().await;
    let sink = panel.message_sink();
    let state = |attribute: &str, value: Value, interaction: Value| {
        json!({"type": "state", "payload": {"attribute": attribute, "value": value, "interaction": interaction}})
    };

    sink.deliver(WindowMessage::new(
        ORIGIN,
        state("status", json!("incoming"), json!({"id": CHAT_ID, "channel_type": "chat"})),
    ));
    sink.deliver(WindowMessage::new(
        ORIGIN,
        state("activeInteraction", json!({"id": CHAT_ID}), Value::Null),
    ));
    wait_until(|| panel.active_interaction().id() == Some(CHAT_ID)).await;

    assert!(panel.has_ongoing_interaction(None));
    assert!(panel.has_ongoing_interaction(Some(ChannelType::Chat)));
    assert!(!panel.has_ongoing_interaction(Some(ChannelType::Phone)));
    assert_eq!(panel.ongoing_interactions().len(), 1);

    // Active interaction now resolves implicit ids.
    let response = panel.interaction("accept", None).await.unwrap();
    assert_eq!(
        response["payload"]["value"]["echo"]["interactionId"],
        CHAT_ID
    );

    sink.deliver(WindowMessage::new(
        ORIGIN,
        state("status", json!("handled"), json!({"id": CHAT_ID})),
    ));
    wait_until(|| !panel.has_ongoing_interaction(None)).await;
    wait_until(|| panel.active_interaction() == ActiveInteraction::Unset).await;

    let events = events.lock().unwrap();
    let handled = events
        .iter()
        .find(|e| e["payload"]["value"] == "handled")
        .unwrap();
    assert_eq!(handled["payload"]["interaction"]["channel_type"], "chat");
    assert!(handled["payload"]["interaction"]["date_incoming"].is_string());
}

#[tokio::test]
async fn test_messages_from_other_origins_are_ignored() {
    let (panel, events, _) = loaded_panel().await;
    let count = events.lock().unwrap().len();

    panel.message_sink().deliver(WindowMessage::new(
        "https://evil.example.com",
        json!({"type": "state", "payload": {"attribute": "work_status", "value": "ready"}}),
    ));
    panel.message_sink().deliver(WindowMessage::new(
        ORIGIN,
        json!({"type": "state", "payload": {"attribute": "work_status", "value": "ready"}}),
    ));

    wait_until(|| events.lock().unwrap().len() > count).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let events = events.lock().unwrap();
    assert_eq!(events.len(), count + 1);
    assert_eq!(events[count]["payload"]["value"], "ready");
}

#[tokio::test]
async fn test_replaced_handler_receives_later_events() {
    let (panel, first, _) = loaded_panel().await;
    let (handler, second) = recorder();
    let before = first.lock().unwrap().len();

    panel.set_event_handler(handler);
    panel.message_sink().deliver(WindowMessage::new(
        ORIGIN,
        json!({"type": "state", "payload": {"attribute": "work_status", "value": "paused"}}),
    ));

    wait_until(|| !second.lock().unwrap().is_empty()).await;
    assert_eq!(first.lock().unwrap().len(), before);
}

async fn auth_server() -> (String, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let login = {
        let calls = calls.clone();
        move || {
            calls.lock().unwrap().push("POST".to_string());
            std::future::ready(axum::http::StatusCode::OK)
        }
    };
    let logout = {
        let calls = calls.clone();
        move || {
            calls.lock().unwrap().push("DELETE".to_string());
            std::future::ready(axum::http::StatusCode::OK)
        }
    };
    let app = Router::new().route("/ecfs/authentication/", post(login).delete(logout));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), calls)
}

#[tokio::test]
async fn test_inline_login_then_unload() {
    let (base, calls) = auth_server().await;
    let (handler, _) = recorder();
    let mount = Arc::new(RecordingMount::default());
    let config = LoadConfig::builder(base, handler, mount.clone())
        .basic_credentials("agent", "secret")
        .build()
        .unwrap();

    let panel = CommunicationPanel::load(config).await.unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["POST"]);
    assert!(!format!("{:?}", panel).contains("secret"));

    assert!(panel.unload().await);
    assert_eq!(*calls.lock().unwrap(), vec!["POST", "DELETE"]);
    assert_eq!(*mount.unmounted.lock().unwrap(), vec!["CPC-frame"]);
    assert!(!panel.session().transport().is_attached());
}

#[tokio::test]
async fn test_failed_login_still_loads() {
    let (handler, _) = recorder();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mount = Arc::new(RecordingMount::default());
    let config = LoadConfig::builder(format!("http://{}", addr), handler, mount)
        .oauth_token("token")
        .build()
        .unwrap();
    assert!(CommunicationPanel::load(config).await.is_ok());
}
