//! Per-session context shared by the dispatcher and the command surface.
//!
//! One `Session` owns the transport, the action correlator, the interaction
//! cache and the small amount of session state the panel drives. Several
//! sessions can live side by side in one process.

use std::sync::{Mutex, MutexGuard, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::correlator::ActionCorrelator;
use crate::error::{CpcError, Result};
use crate::events::EventSink;
use crate::interactions::InteractionCache;
use crate::protocol::{ActionRequest, PeerResponse};
use crate::transport::TransportAdapter;

/// Interaction currently in view in the panel.
///
/// `Unset` means nothing has been reported yet or the last interaction
/// just ended; `None` means the panel explicitly reported that no
/// interaction is active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveInteraction {
    #[default]
    Unset,
    None,
    Id(String),
}

impl ActiveInteraction {
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            Some(id) if !id.is_empty() => ActiveInteraction::Id(id.to_string()),
            _ => ActiveInteraction::None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ActiveInteraction::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Wire form: the id, or `null` when there is none.
    pub fn to_value(&self) -> Value {
        match self {
            ActiveInteraction::Id(id) => Value::String(id.clone()),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    initialized: bool,
    active: ActiveInteraction,
    current_user: Option<Value>,
}

/// Explicit session context passed to the correlator and cache operations.
pub struct Session {
    transport: TransportAdapter,
    correlator: ActionCorrelator,
    interactions: Mutex<InteractionCache>,
    state: RwLock<SessionState>,
    events: EventSink,
    channel_status_enabled: bool,
}

impl Session {
    pub fn new(events: EventSink, channel_status_enabled: bool) -> Self {
        Self {
            transport: TransportAdapter::new(),
            correlator: ActionCorrelator::new(),
            interactions: Mutex::new(InteractionCache::new()),
            state: RwLock::new(SessionState::default()),
            events,
            channel_status_enabled,
        }
    }

    pub fn transport(&self) -> &TransportAdapter {
        &self.transport
    }

    pub fn correlator(&self) -> &ActionCorrelator {
        &self.correlator
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn channel_status_enabled(&self) -> bool {
        self.channel_status_enabled
    }

    /// Lock the interaction cache. Never hold the guard across an `.await`.
    pub fn interactions(&self) -> MutexGuard<'_, InteractionCache> {
        self.interactions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_initialized(&self) -> bool {
        self.read(|s| s.initialized)
    }

    /// Mark the session initialized; returns true on the first call only.
    pub fn mark_initialized(&self) -> bool {
        self.write(|s| !std::mem::replace(&mut s.initialized, true))
    }

    pub fn active_interaction(&self) -> ActiveInteraction {
        self.read(|s| s.active.clone())
    }

    /// Store a new active interaction; returns false when nothing changed.
    pub fn set_active_interaction(&self, active: ActiveInteraction) -> bool {
        self.write(|s| {
            if s.active == active {
                false
            } else {
                s.active = active;
                true
            }
        })
    }

    pub fn current_user(&self) -> Option<Value> {
        self.read(|s| s.current_user.clone())
    }

    /// Id of the logged in user, once known.
    pub fn current_user_id(&self) -> Option<String> {
        self.read(|s| {
            s.current_user
                .as_ref()
                .and_then(|u| u.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    pub fn set_current_user(&self, user: Option<Value>) {
        self.write(|s| s.current_user = user);
    }

    /// Update one field of the cached user profile.
    pub fn update_current_user(&self, field: &str, value: Value) {
        self.write(|s| {
            if let Some(Value::Object(user)) = s.current_user.as_mut() {
                user.insert(field.to_string(), value);
            }
        });
    }

    /// Send an action to the panel and wait for its response.
    ///
    /// Refuses to send until the panel has spoken first.
    pub async fn send_action<V: Serialize>(
        &self,
        request: ActionRequest<V>,
    ) -> Result<PeerResponse> {
        if !self.is_initialized() {
            warn!(
                "CPC is not initialized to interact with Communication Panel. Make sure load() was called and the user is logged in ({})",
                request.cpc_fn
            );
            return Err(CpcError::NotInitialized);
        }
        self.correlator.send_action(&self.transport, request).await
    }

    /// Drop everything tied to the loaded frame.
    pub fn reset(&self) {
        debug!("Resetting session state");
        self.transport.detach();
        self.correlator.abandon_all();
        self.interactions().clear();
        self.write(|s| *s = SessionState::default());
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.state.read().unwrap_or_else(|p| p.into_inner()))
    }

    fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.write().unwrap_or_else(|p| p.into_inner()))
    }
}
