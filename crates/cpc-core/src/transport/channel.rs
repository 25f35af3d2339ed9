//! In-memory peer window backed by a tokio channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::PeerWindow;
use crate::error::{CpcError, Result};

/// A message posted to the peer together with its target origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub target_origin: String,
    pub message: Value,
}

/// Peer window that forwards every posted message into a channel.
#[derive(Debug, Clone)]
pub struct ChannelPeer {
    tx: mpsc::UnboundedSender<PostedMessage>,
}

impl ChannelPeer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PeerWindow for ChannelPeer {
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<()> {
        self.tx
            .send(PostedMessage {
                target_origin: target_origin.to_string(),
                message: message.clone(),
            })
            .map_err(|_| CpcError::PeerDetached)
    }
}
