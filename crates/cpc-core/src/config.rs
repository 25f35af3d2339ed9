//! Centralized configuration for Communication Panel Control.
//!
//! Protocol constants live on associated-constant structs; the per-session
//! options a host passes to `CommunicationPanel::load` live on [`LoadConfig`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{CpcError, Result};
use crate::events::HostEventHandler;
use crate::transport::MountTarget;

/// Action correlation timing.
pub struct ActionConfig;

impl ActionConfig {
    /// Interval between two checks of a pending action.
    pub const WAIT_INTERVAL: Duration = Duration::from_millis(50);
    /// Number of wait cycles before an action is given up.
    pub const MAX_WAITS: u32 = 15;
    /// Infix between the operation name and the counter in action ids.
    pub const ID_INFIX: &'static str = "-action-";

    /// Total time an action may stay pending.
    pub const fn timeout() -> Duration {
        Self::WAIT_INTERVAL.saturating_mul(Self::MAX_WAITS)
    }
}

/// Embedded panel layout and identifiers.
pub struct PanelConfig;

impl PanelConfig {
    pub const PRODUCT_NAME: &'static str = "CPC";
    pub const FRAME_ID: &'static str = "CPC-frame";
    pub const FRAME_ALLOW: &'static str = "microphone";
    pub const PANEL_PATH: &'static str = "ecf/latest/communicationpanel/";
    pub const EMBEDDED_PAGE: &'static str = "embedded.html?salesforce=true";
    pub const INIT_REQUEST_ID: &'static str = "initRequest";
    pub const MASKED_PASSWORD: &'static str = "**********";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const AUTH_PATH: &'static str = "ecfs/authentication/";
    pub const REST_PATH: &'static str = "ecfs/RI/";
    /// Time given to the panel to observe the logout before its frame is removed.
    pub const LOGOUT_SETTLE_DELAY: Duration = Duration::from_secs(1);
    pub const USER_AGENT: &'static str = "CPC/1.0";
}

/// Basic credentials. The password is masked right after authentication.
#[derive(Clone)]
pub struct BasicCredentials {
    pub user_name: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }

    /// Overwrite the password so it cannot leak into later debug output.
    pub fn scrub(&mut self) {
        self.password = PanelConfig::MASKED_PASSWORD.to_string();
    }

    pub fn is_scrubbed(&self) -> bool {
        self.password == PanelConfig::MASKED_PASSWORD
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user_name", &self.user_name)
            .field("password", &PanelConfig::MASKED_PASSWORD)
            .finish()
    }
}

/// Inline authentication performed during `load`.
#[derive(Clone)]
pub enum Authentication {
    OAuth { token: String },
    Basic(BasicCredentials),
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::OAuth { .. } => f.write_str("OAuth { token: <redacted> }"),
            Authentication::Basic(basic) => basic.fmt(f),
        }
    }
}

/// Options for loading the Communication Panel into a host application.
#[derive(Clone)]
pub struct LoadConfig {
    pub event_handler: Arc<dyn HostEventHandler>,
    /// Tenant base URL, always ending with `/`.
    pub tenant_base_url: Url,
    pub mount: Arc<dyn MountTarget>,
    pub enable_debug_log: bool,
    pub deny_popout: bool,
    pub responsive: bool,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub enable_channel_status_updates: bool,
    pub authentication: Option<Authentication>,
}

impl fmt::Debug for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadConfig")
            .field("tenant_base_url", &self.tenant_base_url.as_str())
            .field("enable_debug_log", &self.enable_debug_log)
            .field("deny_popout", &self.deny_popout)
            .field("responsive", &self.responsive)
            .field("min_width", &self.min_width)
            .field("min_height", &self.min_height)
            .field(
                "enable_channel_status_updates",
                &self.enable_channel_status_updates,
            )
            .field("authentication", &self.authentication)
            .finish()
    }
}

impl LoadConfig {
    /// Start building a configuration for the given tenant.
    pub fn builder(
        tenant_base_url: impl Into<String>,
        event_handler: Arc<dyn HostEventHandler>,
        mount: Arc<dyn MountTarget>,
    ) -> LoadConfigBuilder {
        LoadConfigBuilder {
            tenant_base_url: tenant_base_url.into(),
            event_handler,
            mount,
            enable_debug_log: false,
            deny_popout: false,
            responsive: false,
            min_width: None,
            min_height: None,
            enable_channel_status_updates: false,
            authentication: None,
        }
    }

    /// URL of the embedded panel page loaded into the frame.
    pub fn panel_url(&self) -> Result<Url> {
        let mut url = self
            .tenant_base_url
            .join(PanelConfig::PANEL_PATH)?
            .join(PanelConfig::EMBEDDED_PAGE)?;

        {
            let mut query = url.query_pairs_mut();
            if self.responsive {
                query.append_pair("responsive", "true");
            }
            if self.deny_popout {
                query.append_pair("denyPopout", "true");
            }
            if let Some(width) = self.min_width.filter(|w| *w > 0) {
                query.append_pair("minWidth", &width.to_string());
            }
            if let Some(height) = self.min_height.filter(|h| *h > 0) {
                query.append_pair("minHeight", &height.to_string());
            }
            if self.enable_debug_log {
                query.append_pair("sap-ui-debug", "true");
            }
        }

        Ok(url)
    }

    /// Authentication endpoint of the tenant.
    pub fn auth_url(&self) -> Result<Url> {
        Ok(self.tenant_base_url.join(NetworkConfig::AUTH_PATH)?)
    }
}

/// Builder for [`LoadConfig`].
///
/// # Example
///
/// ```rust,ignore
/// let config = LoadConfig::builder("https://tenant.example.com", handler, mount)
///     .deny_popout(true)
///     .min_width(360)
///     .oauth_token(token)
///     .build()?;
/// ```
pub struct LoadConfigBuilder {
    tenant_base_url: String,
    event_handler: Arc<dyn HostEventHandler>,
    mount: Arc<dyn MountTarget>,
    enable_debug_log: bool,
    deny_popout: bool,
    responsive: bool,
    min_width: Option<u32>,
    min_height: Option<u32>,
    enable_channel_status_updates: bool,
    authentication: Option<Authentication>,
}

impl LoadConfigBuilder {
    pub fn enable_debug_log(mut self, enable: bool) -> Self {
        self.enable_debug_log = enable;
        self
    }

    pub fn deny_popout(mut self, deny: bool) -> Self {
        self.deny_popout = deny;
        self
    }

    /// Responsive layout (honoured by 22Q3 panels only).
    pub fn responsive(mut self, enable: bool) -> Self {
        self.responsive = enable;
        self
    }

    pub fn min_width(mut self, width: u32) -> Self {
        self.min_width = Some(width);
        self
    }

    pub fn min_height(mut self, height: u32) -> Self {
        self.min_height = Some(height);
        self
    }

    /// Forward `channel_status` state events to the host handler.
    ///
    /// Default: `false` (they are dropped)
    pub fn enable_channel_status_updates(mut self, enable: bool) -> Self {
        self.enable_channel_status_updates = enable;
        self
    }

    pub fn oauth_token(mut self, token: impl Into<String>) -> Self {
        self.authentication = Some(Authentication::OAuth {
            token: token.into(),
        });
        self
    }

    pub fn basic_credentials(
        mut self,
        user_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.authentication = Some(Authentication::Basic(BasicCredentials::new(
            user_name, password,
        )));
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<LoadConfig> {
        let mut base = self.tenant_base_url.trim().to_string();
        if base.is_empty() {
            return Err(CpcError::Config {
                message: "tenantBaseUrl must be provided".to_string(),
            });
        }
        if !base.ends_with('/') {
            base.push('/');
        }

        let tenant_base_url = Url::parse(&base)?;
        if !matches!(tenant_base_url.scheme(), "http" | "https") {
            return Err(CpcError::Config {
                message: format!(
                    "tenantBaseUrl must be http(s), got {}",
                    tenant_base_url.scheme()
                ),
            });
        }

        Ok(LoadConfig {
            event_handler: self.event_handler,
            tenant_base_url,
            mount: self.mount,
            enable_debug_log: self.enable_debug_log,
            deny_popout: self.deny_popout,
            responsive: self.responsive,
            min_width: self.min_width,
            min_height: self.min_height,
            enable_channel_status_updates: self.enable_channel_status_updates,
            authentication: self.authentication,
        })
    }
}
