//! Routing of inbound panel messages.
//!
//! | type     | attribute         | route                                          |
//! |----------|-------------------|------------------------------------------------|
//! | init     |                   | fetch user, emit `cpc-init`                    |
//! | response |                   | complete the pending action, else drop         |
//! | state    | activeInteraction | update pointer, forward only on change         |
//! | state    | status            | merge into cache, forward merged interaction   |
//! | state    | channel_status    | forward only when enabled                      |
//! | *        | *                 | forward unmodified                             |
//!
//! One listener task dispatches messages in arrival order, so merges for the
//! same interaction never overlap.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::commands::DetailSubject;
use crate::events::SyntheticEvent;
use crate::interactions::InteractionStatus;
use crate::protocol::{classify, Route};
use crate::session::{ActiveInteraction, Session};
use crate::transport::WindowMessage;

/// Routes accepted panel messages for one session.
#[derive(Clone)]
pub struct EventDispatcher {
    session: Arc<Session>,
}

impl EventDispatcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Run the single inbound listener until every sender is gone.
    pub fn spawn_listener(self, mut rx: mpsc::UnboundedReceiver<WindowMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Some(data) = self.session.transport().accept(message) {
                    self.dispatch(data);
                }
            }
            debug!("Window message listener stopped");
        })
    }

    /// Route one message that already passed the transport filter.
    pub fn dispatch(&self, data: Value) {
        debug!("message: {}", data);
        if self.session.mark_initialized() {
            debug!("First message received from CP, session initialized");
        }

        match classify(&data) {
            Route::Init => self.on_init(),
            Route::Response { id } => {
                self.session.correlator().record_response(&id, data);
            }
            Route::ActiveInteraction => self.on_active_interaction(data),
            Route::Status => self.on_status(data),
            Route::ChannelStatus => {
                if self.session.channel_status_enabled() {
                    self.session.events().emit(data);
                } else {
                    debug!("Ignoring channel_status update");
                }
            }
            Route::Passthrough => self.session.events().emit(data),
        }
    }

    /// The user lookup runs as its own task: its response arrives through this dispatcher.
    fn on_init(&self) {
        let session = self.session.clone();
        tokio::spawn(async move {
            match session.send_action(DetailSubject::User.request()).await {
                Ok(response) => {
                    let user = response.value().clone();
                    session.set_current_user(Some(user.clone()));
                    session.events().emit(SyntheticEvent::init(user));
                }
                Err(e) => error!("Could not fetch current user details: {}", e),
            }
        });
    }

    fn on_active_interaction(&self, mut data: Value) {
        let id = data
            .pointer("/payload/value/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let active = ActiveInteraction::from_id(id.as_deref());

        if !self.session.set_active_interaction(active.clone()) {
            return;
        }
        match active.id() {
            Some(id) => debug!("Active & in-view interaction changed to [{}]", id),
            None => debug!("Active & in-view interaction: None"),
        }
        if let Some(payload) = data.get_mut("payload").and_then(Value::as_object_mut) {
            payload.insert("value".to_string(), active.to_value());
        }
        self.session.events().emit(data);
    }

    fn on_status(&self, mut data: Value) {
        let status = data
            .pointer("/payload/value")
            .and_then(Value::as_str)
            .and_then(InteractionStatus::parse);
        let fields = match data.pointer("/payload/interaction") {
            Some(Value::Object(fields)) => fields.clone(),
            _ => {
                warn!("Status event without interaction, forwarding as is: {}", data);
                self.session.events().emit(data);
                return;
            }
        };

        let merged = self.session.interactions().merge(status, fields);
        let outcome = match merged {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Could not merge status event, forwarding as is: {}", e);
                self.session.events().emit(data);
                return;
            }
        };

        if let Some(payload) = data.get_mut("payload").and_then(Value::as_object_mut) {
            payload.insert("interaction".to_string(), outcome.interaction.to_value());
        }
        self.session.events().emit(data);

        if outcome.remaining == 0 {
            self.session
                .set_active_interaction(ActiveInteraction::Unset);
        }
    }
}
