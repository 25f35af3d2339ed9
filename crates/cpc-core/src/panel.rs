//! The host-facing Communication Panel handle.
//!
//! [`CommunicationPanel::load`] authenticates (optionally), asks the host to
//! mount the panel frame and starts the inbound listener. Once the host
//! reports the frame as loaded through [`CommunicationPanel::frame_loaded`],
//! the init handshake runs and the command methods become usable.
//!
//! Command methods never return errors: invalid input and failed actions are
//! logged and come back as `None`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::Authenticator;
use crate::commands::{Command, EmailRequest, SmsRequest, WhatsAppRequest};
use crate::config::{Authentication, LoadConfig, NetworkConfig};
use crate::dispatcher::EventDispatcher;
use crate::error::Result;
use crate::events::{EventSink, HostEventHandler, SyntheticEvent};
use crate::interactions::{ChannelType, Interaction};
use crate::network::HttpClient;
use crate::presence;
use crate::protocol::{init_request, PeerResponse};
use crate::rest::{parse_method, RestApi, RestClient};
use crate::session::{ActiveInteraction, Session};
use crate::transport::{FrameSpec, MessageSink, PeerWindow};

/// A loaded Communication Panel and its session.
pub struct CommunicationPanel {
    config: LoadConfig,
    session: Arc<Session>,
    authenticator: Authenticator,
    rest: RestClient,
    frame: FrameSpec,
    sink: MessageSink,
    listener: JoinHandle<()>,
}

impl fmt::Debug for CommunicationPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationPanel")
            .field("config", &self.config)
            .field("frame", &self.frame)
            .field("initialized", &self.session.is_initialized())
            .finish()
    }
}

impl Drop for CommunicationPanel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl CommunicationPanel {
    /// Load the Communication Panel into the host.
    ///
    /// A failed inline login does not abort loading: the panel then shows its
    /// own login screen. Configuration and mount failures do.
    pub async fn load(mut config: LoadConfig) -> Result<Self> {
        let http = HttpClient::new()?;
        let authenticator = Authenticator::new(http.clone(), config.auth_url()?);

        if let Some(authentication) = &config.authentication {
            if let Err(e) = authenticator.authenticate(authentication).await {
                warn!("Inline authentication failed, continuing to load: {}", e);
            }
        }
        if let Some(Authentication::Basic(credentials)) = config.authentication.as_mut() {
            credentials.scrub();
        }

        let frame = FrameSpec::for_panel(config.panel_url()?);
        debug!(
            "Embedding Communication Panel from [{}]. Debug=[{}]",
            frame.src, config.enable_debug_log
        );

        let session = Arc::new(Session::new(
            EventSink::new(config.event_handler.clone()),
            config.enable_channel_status_updates,
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = EventDispatcher::new(session.clone()).spawn_listener(rx);

        if let Err(e) = config.mount.mount(&frame) {
            error!("Could not load Communication Panel into frame: {}", e);
            listener.abort();
            return Err(e);
        }

        Ok(Self {
            rest: RestClient::new(http, config.tenant_base_url.clone()),
            config,
            session,
            authenticator,
            frame,
            sink: MessageSink::new(tx),
            listener,
        })
    }

    /// Where the host delivers window messages received from the panel.
    pub fn message_sink(&self) -> MessageSink {
        self.sink.clone()
    }

    /// The frame the host was asked to mount.
    pub fn frame(&self) -> &FrameSpec {
        &self.frame
    }

    /// Called by the host once the panel frame has loaded.
    pub fn frame_loaded(&self, window: Arc<dyn PeerWindow>) -> Result<()> {
        let origin = self.session.transport().attach(window, &self.frame.src)?;
        info!(
            "Loaded. Panel origin [{}]. Configuration=[{:?}]",
            origin, self.config
        );
        self.session.events().emit(SyntheticEvent::onload());
        self.init()
    }

    /// Send the init request. The panel caches it and answers once the user has logged in.
    pub fn init(&self) -> Result<()> {
        info!("Sending init command");
        self.session.transport().send(&init_request())
    }

    /// Log the user out and remove the panel frame.
    ///
    /// This ignores ongoing interactions; check [`Self::has_ongoing_interaction`] first if needed.
    pub async fn unload(&self) -> bool {
        if self.authenticator.logout().await.is_err() {
            return false;
        }
        tokio::time::sleep(NetworkConfig::LOGOUT_SETTLE_DELAY).await;

        if let Err(e) = self.config.mount.unmount(&self.frame.id) {
            error!("Could not remove Communication Panel frame: {}", e);
            return false;
        }
        self.session.reset();
        info!("Communication Panel frame removed - Unload complete");
        true
    }

    /// Replace the host event handler.
    pub fn set_event_handler(&self, handler: Arc<dyn HostEventHandler>) {
        self.session.events().replace(handler);
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_initialized()
    }

    /// Tenant base URL, with trailing slash.
    pub fn tenant_base_url(&self) -> &Url {
        &self.config.tenant_base_url
    }

    pub fn current_user(&self) -> Option<Value> {
        self.session.current_user()
    }

    pub fn active_interaction(&self) -> ActiveInteraction {
        self.session.active_interaction()
    }

    /// Whether any interaction (optionally of one channel) is ongoing.
    pub fn has_ongoing_interaction(&self, channel: Option<ChannelType>) -> bool {
        self.session.interactions().has_any(channel)
    }

    /// Snapshot of the ongoing interactions.
    pub fn ongoing_interactions(&self) -> Vec<Interaction> {
        self.session.interactions().snapshot()
    }

    /// Start a phone call, optionally from one of the user's phone queue numbers.
    pub async fn call_out(&self, to: &str, from: Option<&str>) -> Option<Value> {
        let command = self.validated(Command::call_out(to, from))?;
        if let Some(from) = from {
            let queues = self
                .get_current_user_queues(Some(ChannelType::Phone))
                .await
                .unwrap_or_default();
            if !queues.iter().any(|queue| has_address(queue, from)) {
                warn!("callOut: Must provide [sourceQueueNumber] to which User has rights for");
                return None;
            }
        }
        info!("Calling [{}] from: [{}]", to, from.unwrap_or("default"));
        self.send(command).await
    }

    pub async fn call_state(&self, action: &str, interaction_id: Option<&str>) -> Option<Value> {
        let active = self.session.active_interaction();
        let command = self.validated(Command::call_state(action, interaction_id, &active))?;
        self.send(command).await
    }

    pub async fn consult(&self, to: &str, interaction_id: Option<&str>) -> Option<Value> {
        let active = self.session.active_interaction();
        let command = self.validated(Command::consult(to, interaction_id, &active))?;
        self.send(command).await
    }

    pub async fn dtmf(&self, tone: &str, interaction_id: Option<&str>) -> Option<Value> {
        let command = self.validated(Command::dtmf(tone, interaction_id))?;
        self.send(command).await
    }

    pub async fn get_details(&self, subject: &str) -> Option<Value> {
        let command = self.validated(Command::get_details(subject))?;
        info!("Getting details of [{}]", subject);
        self.send(command).await
    }

    /// The user's queues, optionally only those of one channel type.
    pub async fn get_current_user_queues(&self, channel: Option<ChannelType>) -> Option<Vec<Value>> {
        let response = PeerResponse(self.get_details("queues").await?);
        let queues = response.value().as_array()?.clone();
        Some(match channel {
            Some(channel) => queues
                .into_iter()
                .filter(|queue| queue.get("type").and_then(Value::as_str) == Some(channel.as_str()))
                .collect(),
            None => queues,
        })
    }

    pub async fn interaction(&self, action: &str, interaction_id: Option<&str>) -> Option<Value> {
        let active = self.session.active_interaction();
        let command = self.validated(Command::interaction(action, interaction_id, &active))?;
        self.send(command).await
    }

    pub async fn join_calls(&self) -> Option<Value> {
        let active = self.session.active_interaction();
        let command = self.validated(Command::join_calls(&active))?;
        self.send(command).await
    }

    pub async fn message(&self, content: &str, interaction_id: Option<&str>) -> Option<Value> {
        let command = self.validated(Command::message(content, interaction_id))?;
        self.send(command).await
    }

    pub async fn send_email(&self, email: EmailRequest) -> Option<Value> {
        let command = self.validated(Command::send_email(email))?;
        self.send(command).await
    }

    pub async fn send_sms(&self, sms: SmsRequest) -> Option<Value> {
        let command = self.validated(Command::send_sms(sms))?;
        self.send(command).await
    }

    pub async fn start_whatsapp_chat(&self, chat: WhatsAppRequest) -> Option<Value> {
        let command = self.validated(Command::start_whatsapp_chat(chat))?;
        self.send(command).await
    }

    pub async fn transfer(&self, to: &str, interaction_id: Option<&str>) -> Option<Value> {
        let command = self.validated(Command::transfer(to, interaction_id))?;
        self.send(command).await
    }

    /// Switch the presence profile by name or id.
    pub async fn set_presence(&self, profile: &str) -> Option<Value> {
        presence::set_presence(&self.session, &self.rest, profile).await
    }

    /// Switch between Ready and NotReady.
    pub async fn set_ready(&self, ready: bool) -> Option<Value> {
        presence::set_ready(&self.session, &self.rest, ready).await
    }

    /// Call a Restful Interfaces resource in the user's context.
    ///
    /// Returns the parsed JSON (HTTP 200), `true` (other 2xx) or a failure
    /// object with `error: true`.
    pub async fn request(
        &self,
        api: &str,
        method: &str,
        resource: &str,
        body: Option<Value>,
    ) -> Option<Value> {
        let (api, method) = match (api.parse::<RestApi>(), parse_method(method)) {
            (Ok(api), Ok(method)) => (api, method),
            (Err(e), _) | (_, Err(e)) => {
                warn!("request: {}", e);
                return None;
            }
        };
        if !self.session.is_initialized() {
            warn!("request: CPC is not initialized to interact with Communication Panel. Make sure load() was called and the user is logged in");
            return None;
        }
        match self.rest.request(api, method, resource, body).await {
            Ok(outcome) => Some(outcome.to_value()),
            Err(e) => {
                warn!("request: {}", e);
                None
            }
        }
    }

    fn validated(&self, command: Result<Command>) -> Option<Command> {
        match command {
            Ok(command) => Some(command),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn send(&self, command: Command) -> Option<Value> {
        let cpc_fn = command.cpc_fn();
        let request = match command.into_request() {
            Ok(request) => request,
            Err(e) => {
                warn!("{}: {}", cpc_fn, e);
                return None;
            }
        };
        match self.session.send_action(request).await {
            Ok(response) => Some(response.into_inner()),
            Err(e) => {
                debug!("{} failed: {}", cpc_fn, e);
                None
            }
        }
    }
}

fn has_address(queue: &Value, address: &str) -> bool {
    queue
        .get("addresses")
        .and_then(Value::as_array)
        .map(|addresses| {
            addresses
                .iter()
                .any(|item| item.get("address").and_then(Value::as_str) == Some(address))
        })
        .unwrap_or(false)
}
