//! Transport between the host and the embedded Communication Panel.
//!
//! The DOM is not ours: the host supplies a [`MountTarget`] that creates the
//! frame and, once it has loaded, a [`PeerWindow`] that can post messages into
//! it. Inbound window messages are fed back through a [`MessageSink`].
//!
//! # Architecture
//!
//! - **Outbound**: [`TransportAdapter::send`] posts to the attached peer, pinned to its origin
//! - **Inbound**: [`TransportAdapter::accept`] filters by origin and shape before dispatch
//! - **Channel**: in-memory peer used by tests and by the stdio bridge

pub mod channel;

pub use channel::{ChannelPeer, PostedMessage};

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::PanelConfig;
use crate::error::{CpcError, Result};
use crate::protocol::is_legacy_message;

/// Posts messages into the peer's browsing context.
pub trait PeerWindow: Send + Sync {
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<()>;
}

/// Description of the frame the host must create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub id: String,
    pub src: Url,
    pub allow: String,
}

impl FrameSpec {
    pub fn for_panel(src: Url) -> Self {
        Self {
            id: PanelConfig::FRAME_ID.to_string(),
            src,
            allow: PanelConfig::FRAME_ALLOW.to_string(),
        }
    }
}

/// Where the panel frame gets attached in the host application.
pub trait MountTarget: Send + Sync {
    /// Create and attach the frame. The host reports completion through
    /// `CommunicationPanel::frame_loaded`.
    fn mount(&self, frame: &FrameSpec) -> Result<()>;

    /// Remove a previously mounted frame.
    fn unmount(&self, frame_id: &str) -> Result<()>;
}

/// Mount target for hosts that create and remove the frame themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMount;

impl MountTarget for NullMount {
    fn mount(&self, _frame: &FrameSpec) -> Result<()> {
        Ok(())
    }

    fn unmount(&self, _frame_id: &str) -> Result<()> {
        Ok(())
    }
}

/// A window message as received by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMessage {
    pub origin: String,
    pub data: Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Cloneable entry point for inbound window messages.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::UnboundedSender<WindowMessage>,
}

impl MessageSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WindowMessage>) -> Self {
        Self { tx }
    }

    /// Hand a window message to the listener. Returns false once the session is gone.
    pub fn deliver(&self, message: WindowMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

struct AttachedPeer {
    window: Arc<dyn PeerWindow>,
    origin: String,
}

/// The single outbound channel and inbound filter for one session.
#[derive(Default)]
pub struct TransportAdapter {
    peer: RwLock<Option<AttachedPeer>>,
}

impl TransportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the loaded frame; the peer origin is derived once from its URL.
    pub fn attach(&self, window: Arc<dyn PeerWindow>, peer_url: &Url) -> Result<String> {
        let origin = peer_url.origin();
        if !origin.is_tuple() {
            return Err(CpcError::Config {
                message: format!("Peer URL {} has an opaque origin", peer_url),
            });
        }
        let origin = origin.ascii_serialization();

        let mut peer = self.peer.write().unwrap_or_else(|p| p.into_inner());
        *peer = Some(AttachedPeer {
            window,
            origin: origin.clone(),
        });
        debug!("Listening for window messages from {}", origin);
        Ok(origin)
    }

    pub fn detach(&self) {
        let mut peer = self.peer.write().unwrap_or_else(|p| p.into_inner());
        *peer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.peer
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn origin(&self) -> Option<String> {
        self.peer
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|p| p.origin.clone())
    }

    /// Post a payload to the peer. Dropped with a warning before attachment.
    pub fn send(&self, payload: &Value) -> Result<()> {
        debug!("sendToCommunicationPanel: {}", payload);
        let peer = self.peer.read().unwrap_or_else(|p| p.into_inner());
        match peer.as_ref() {
            Some(peer) => peer.window.post_message(payload, &peer.origin),
            None => {
                warn!("Cannot send before iframe is loaded & ready");
                Err(CpcError::PeerDetached)
            }
        }
    }

    /// Inbound filter: only JSON objects from the peer origin pass.
    pub fn accept(&self, message: WindowMessage) -> Option<Value> {
        let expected = self.origin()?;
        if message.origin != expected {
            return None;
        }
        if !message.data.is_object() || is_legacy_message(&message.data) {
            return None;
        }
        Some(message.data)
    }
}
