//! JSON-lines relay between the bridge and the host shell that owns the frame.
//!
//! stdout carries everything the shell must act on: messages to post into
//! the panel frame, mount/unmount requests, host events and the RPC port.
//! stdin carries what the shell observes: the frame finished loading, and
//! window messages received from the panel.

use std::sync::Arc;

use cpc_core::{
    CommunicationPanel, CpcError, FrameSpec, HostEventHandler, MountTarget, PeerWindow,
    WindowMessage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Line written to the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BridgeLine {
    #[serde(rename_all = "camelCase")]
    Post { target_origin: String, message: Value },
    Mount { frame: FrameSpec },
    #[serde(rename_all = "camelCase")]
    Unmount { frame_id: String },
    Event { event: Value },
    RpcPort { port: u16 },
}

/// Line read from the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ShellLine {
    /// The panel frame finished loading.
    Loaded,
    /// A window message the frame posted to its parent.
    Message { origin: String, data: Value },
}

/// Queue of lines for the stdout writer task.
#[derive(Debug, Clone)]
pub struct LineWriter {
    tx: mpsc::UnboundedSender<BridgeLine>,
}

impl LineWriter {
    /// Spawn the task that serializes lines onto `out`.
    pub fn spawn<W>(mut out: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<BridgeLine>();
        let handle = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let mut text = match serde_json::to_string(&line) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Could not encode bridge line: {}", e);
                        continue;
                    }
                };
                text.push('\n');
                if let Err(e) = out.write_all(text.as_bytes()).await {
                    error!("Shell output closed: {}", e);
                    break;
                }
                let _ = out.flush().await;
            }
        });
        (Self { tx }, handle)
    }

    pub fn write(&self, line: BridgeLine) -> bool {
        self.tx.send(line).is_ok()
    }
}

/// Peer window living in the shell; posts become `post` lines.
pub struct StdioPeer {
    writer: LineWriter,
}

impl StdioPeer {
    pub fn new(writer: LineWriter) -> Self {
        Self { writer }
    }
}

impl PeerWindow for StdioPeer {
    fn post_message(&self, message: &Value, target_origin: &str) -> cpc_core::Result<()> {
        let line = BridgeLine::Post {
            target_origin: target_origin.to_string(),
            message: message.clone(),
        };
        if self.writer.write(line) {
            Ok(())
        } else {
            Err(CpcError::PeerDetached)
        }
    }
}

/// Mount target that asks the shell to create and remove the frame.
pub struct StdioMount {
    writer: LineWriter,
}

impl StdioMount {
    pub fn new(writer: LineWriter) -> Self {
        Self { writer }
    }

    fn request(&self, line: BridgeLine) -> cpc_core::Result<()> {
        if self.writer.write(line) {
            Ok(())
        } else {
            Err(CpcError::Mount {
                message: "shell output is closed".to_string(),
            })
        }
    }
}

impl MountTarget for StdioMount {
    fn mount(&self, frame: &FrameSpec) -> cpc_core::Result<()> {
        self.request(BridgeLine::Mount {
            frame: frame.clone(),
        })
    }

    fn unmount(&self, frame_id: &str) -> cpc_core::Result<()> {
        self.request(BridgeLine::Unmount {
            frame_id: frame_id.to_string(),
        })
    }
}

/// Host event handler that forwards every event as an `event` line.
pub fn event_forwarder(writer: LineWriter) -> Arc<dyn HostEventHandler> {
    Arc::new(move |event: Value| {
        writer.write(BridgeLine::Event { event });
    })
}

/// Read shell lines until EOF.
pub async fn run_reader<R>(
    reader: R,
    panel: Arc<CommunicationPanel>,
    writer: LineWriter,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let sink = panel.message_sink();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ShellLine>(&line) {
            Ok(ShellLine::Loaded) => {
                let peer = Arc::new(StdioPeer::new(writer.clone()));
                if let Err(e) = panel.frame_loaded(peer) {
                    error!("Could not attach panel frame: {}", e);
                }
            }
            Ok(ShellLine::Message { origin, data }) => {
                debug!("Window message from {}", origin);
                sink.deliver(WindowMessage::new(origin, data));
            }
            Err(e) => warn!("Ignoring malformed shell line: {}", e),
        }
    }

    info!("Shell input closed");
    Ok(())
}
