//! CPC Core - Headless Communication Panel Control.
//!
//! Embeds the Communication Panel (a contact-center widget living in its own
//! frame) into a host application and exposes its capabilities as typed,
//! awaited commands. The frame itself belongs to the host: the library asks
//! for it through [`MountTarget`], posts into it through [`PeerWindow`] and
//! receives its window messages through [`MessageSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cpc_core::{CommunicationPanel, LoadConfig, NullMount};
//!
//! #[tokio::main]
//! async fn main() -> cpc_core::Result<()> {
//!     let handler = Arc::new(|event: serde_json::Value| println!("{}", event));
//!     let config = LoadConfig::builder("https://tenant.example.com", handler, Arc::new(NullMount))
//!         .oauth_token(std::env::var("CPC_TOKEN").unwrap_or_default())
//!         .build()?;
//!
//!     let panel = CommunicationPanel::load(config).await?;
//!     // Host creates the frame from `panel.frame()`, then:
//!     // panel.frame_loaded(window)?;
//!     // feed window messages into `panel.message_sink()`.
//!
//!     if let Some(user) = panel.get_details("user").await {
//!         println!("Logged in as {}", user["payload"]["value"]["name"]);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod commands;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod interactions;
pub mod logging;
pub mod network;
pub mod presence;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod transport;

mod panel;

// Re-export commonly used types
pub use commands::{
    CallStateAction, Command, DetailSubject, DtmfTone, EmailRequest, InteractionAction,
    SmsRequest, WhatsAppRequest,
};
pub use config::{Authentication, BasicCredentials, LoadConfig, LoadConfigBuilder};
pub use error::{CpcError, Result};
pub use events::{HostEventHandler, SyntheticEvent};
pub use interactions::{ChannelType, Interaction, InteractionId, InteractionStatus, Timestamp};
pub use panel::CommunicationPanel;
pub use rest::{RestApi, RestOutcome};
pub use session::{ActiveInteraction, Session};
pub use transport::{
    ChannelPeer, FrameSpec, MessageSink, MountTarget, NullMount, PeerWindow, PostedMessage,
    WindowMessage,
};
