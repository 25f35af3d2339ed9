//! Action correlation over the fire-and-forget window channel.
//!
//! Every action gets an id of the form `<cpcFn>-action-<n>`, is registered
//! as pending and posted to the panel. The dispatcher hands matching
//! `response` messages to [`ActionCorrelator::record_response`], which
//! completes the waiting caller through a oneshot slot. The caller waits in
//! at most [`ActionConfig::MAX_WAITS`] cycles of [`ActionConfig::WAIT_INTERVAL`]
//! and gives up afterwards.
//!
//! # Thread Safety
//!
//! The pending map sits behind a `std::sync::Mutex` that is never held across
//! an `.await`, so any number of actions may be in flight from any task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::config::ActionConfig;
use crate::error::{CpcError, Result};
use crate::protocol::{ActionEnvelope, ActionRequest, PeerResponse};
use crate::transport::TransportAdapter;

/// An action waiting for its response.
struct PendingAction {
    envelope: ActionEnvelope,
    responder: oneshot::Sender<Value>,
}

/// Tracks in-flight actions and matches responses to them.
#[derive(Default)]
pub struct ActionCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingAction>>,
}

/// Removes the pending entry when the waiting caller finishes or is dropped.
struct Deregister<'a> {
    pending: &'a Mutex<HashMap<String, PendingAction>>,
    id: String,
}

impl Drop for Deregister<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.id);
    }
}

impl ActionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post an action and wait for the correlated response.
    ///
    /// Fails without sending when the request does not serialize to JSON,
    /// and with [`CpcError::ActionTimeout`] when no response arrives within
    /// the wait budget. Initialization is checked by the owning session.
    pub async fn send_action<V: Serialize>(
        &self,
        transport: &TransportAdapter,
        request: ActionRequest<V>,
    ) -> Result<PeerResponse> {
        let payload = serde_json::to_value(&request).map_err(|e| {
            warn!("Provided payload is invalid. Aborting action: {}", e);
            CpcError::InvalidPayload {
                message: e.to_string(),
            }
        })?;

        let counter = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}{}{}", request.cpc_fn, ActionConfig::ID_INFIX, counter);
        let envelope = ActionEnvelope::new(id.clone(), payload);
        let message = serde_json::to_value(&envelope)?;

        let (tx, mut rx) = oneshot::channel();
        self.lock().insert(
            id.clone(),
            PendingAction {
                envelope,
                responder: tx,
            },
        );
        let guard = Deregister {
            pending: &self.pending,
            id: id.clone(),
        };

        debug!("Sending action: {}", message);
        transport.send(&message)?;

        let mut waits = 0;
        loop {
            waits += 1;
            match tokio::time::timeout(ActionConfig::WAIT_INTERVAL, &mut rx).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Action=[{}], Response=[{}] after {} waits",
                        message, response, waits
                    );
                    return Ok(PeerResponse(response));
                }
                Ok(Err(_)) => {
                    // Entry removed without a response: the session was torn down.
                    return Err(CpcError::PeerDetached);
                }
                Err(_) if waits >= ActionConfig::MAX_WAITS => break,
                Err(_) => continue,
            }
        }

        drop(guard);
        // A response recorded between the last wait and deregistration still counts.
        if let Ok(response) = rx.try_recv() {
            return Ok(PeerResponse(response));
        }

        error!("No response for action: {}", message);
        Err(CpcError::ActionTimeout {
            action_id: id,
            waited: ActionConfig::timeout(),
        })
    }

    /// Attach a response to its pending action. Unknown ids are dropped.
    pub fn record_response(&self, id: &str, response: Value) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(pending) => {
                debug!(
                    "Got response for action [{}] ({})",
                    id, pending.envelope.payload["command"]
                );
                let _ = pending.responder.send(response);
                true
            }
            None => {
                debug!("Dropping response for unknown action [{}]", id);
                false
            }
        }
    }

    /// Whether an action with this id is still waiting.
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Ids of in-flight actions, sorted (for diagnostics).
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of actions issued so far in this session.
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Fail every waiting action immediately.
    pub fn abandon_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            warn!("Abandoning {} pending actions", drained.len());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingAction>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}
