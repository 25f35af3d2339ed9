//! Facade over the tenant's Restful Interfaces (RI).
//!
//! Requests run in the logged in user's context: the session cookie from
//! authentication rides along on the shared [`HttpClient`]. Failures are not
//! errors here; they come back as a [`RestFailure`] object the host can
//! inspect, mirroring how the panel reports them.

use std::fmt;
use std::str::FromStr;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use url::Url;

use crate::config::NetworkConfig;
use crate::error::{CpcError, Result};
use crate::network::HttpClient;

/// Restful Interfaces API families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestApi {
    Rci,
    Cmi,
    Dpi,
    Obi,
    Rti,
    Rai,
    Lri,
    Rmi,
}

impl RestApi {
    pub const ALL: [RestApi; 8] = [
        RestApi::Rci,
        RestApi::Cmi,
        RestApi::Dpi,
        RestApi::Obi,
        RestApi::Rti,
        RestApi::Rai,
        RestApi::Lri,
        RestApi::Rmi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestApi::Rci => "RCI",
            RestApi::Cmi => "CMI",
            RestApi::Dpi => "DPI",
            RestApi::Obi => "OBI",
            RestApi::Rti => "RTI",
            RestApi::Rai => "RAI",
            RestApi::Lri => "LRI",
            RestApi::Rmi => "RMI",
        }
    }

    /// Lowercase path segment under `ecfs/RI/`.
    pub fn path_segment(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl FromStr for RestApi {
    type Err = CpcError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        RestApi::ALL
            .iter()
            .copied()
            .find(|api| api.as_str() == upper)
            .ok_or_else(|| {
                let names: Vec<_> = RestApi::ALL.iter().map(RestApi::as_str).collect();
                CpcError::validation(
                    "api",
                    format!("API [{}] is unknown. Use one of the following: {}", s, names.join(",")),
                )
            })
    }
}

impl fmt::Display for RestApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an HTTP verb accepted by the facade.
pub fn parse_method(method: &str) -> Result<Method> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(CpcError::validation(
            "method",
            "Use one of the following: GET,POST,PUT,DELETE",
        )),
    }
}

/// `status` of a failed request: the HTTP code, or `"error"` when no response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FailureStatus {
    Http(u16),
    Transport(&'static str),
}

/// Failure object returned by [`RestClient::request`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestFailure {
    /// Always `true`.
    pub error: bool,
    pub api: String,
    pub method: String,
    pub url: String,
    pub status: FailureStatus,
    pub body: Option<Value>,
}

/// Result of one RI request.
#[derive(Debug, Clone, PartialEq)]
pub enum RestOutcome {
    /// HTTP 200 with a JSON body.
    Json(Value),
    /// Any other 2xx.
    Accepted,
    Failed(RestFailure),
}

impl RestOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, RestOutcome::Failed(_))
    }

    /// Host-facing form: the JSON body, `true`, or the failure object.
    pub fn to_value(&self) -> Value {
        match self {
            RestOutcome::Json(value) => value.clone(),
            RestOutcome::Accepted => Value::Bool(true),
            RestOutcome::Failed(failure) => {
                serde_json::to_value(failure).unwrap_or(Value::Bool(false))
            }
        }
    }
}

/// Client for `<tenant>ecfs/RI/<api>/<resource>`.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: HttpClient,
    tenant_base_url: Url,
}

impl RestClient {
    pub fn new(http: HttpClient, tenant_base_url: Url) -> Self {
        Self {
            http,
            tenant_base_url,
        }
    }

    /// Full URL of a resource. A missing leading `/` is added; a trailing one is kept.
    pub fn resource_url(&self, api: RestApi, resource: &str) -> Result<Url> {
        let resource = if resource.starts_with('/') {
            resource.to_string()
        } else {
            format!("/{}", resource)
        };
        let path = format!("{}{}{}", NetworkConfig::REST_PATH, api.path_segment(), resource);
        Ok(self.tenant_base_url.join(&path)?)
    }

    /// Send one request with a JSON body.
    pub async fn request(
        &self,
        api: RestApi,
        method: Method,
        resource: &str,
        body: Option<Value>,
    ) -> Result<RestOutcome> {
        let url = self.resource_url(api, resource)?;
        let failure = |status: FailureStatus| {
            RestOutcome::Failed(RestFailure {
                error: true,
                api: api.path_segment(),
                method: method.to_string(),
                url: url.to_string(),
                status,
                body: body.clone(),
            })
        };

        let mut builder = self
            .http
            .inner()
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Request failed: {}", e);
                return Ok(failure(FailureStatus::Transport("error")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Restful Interfaces (RI) API [{}] resource [{}] responded HTTP [{}]. Full URL of request: {}",
                api,
                resource,
                status.as_u16(),
                url
            );
            return Ok(failure(FailureStatus::Http(status.as_u16())));
        }

        info!("[{}]: [{}]", status.as_u16(), url);
        if status != StatusCode::OK {
            return Ok(RestOutcome::Accepted);
        }
        match response.json::<Value>().await {
            Ok(value) => Ok(RestOutcome::Json(value)),
            Err(e) => {
                error!("Request failed: {}", e);
                Ok(failure(FailureStatus::Transport("error")))
            }
        }
    }
}
