//! Tenant authentication.
//!
//! The authentication endpoint grants a session cookie that the embedded
//! panel and the REST facade both rely on. Only HTTP 200 counts as success.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use tracing::{error, info, warn};
use url::Url;

use crate::config::{Authentication, BasicCredentials};
use crate::error::{CpcError, Result};
use crate::network::HttpClient;

/// Authorization scheme the endpoint expects on basic form logins.
const ECF_AUTH_SCHEME: &str = "ECFAuth";

/// Form body of a basic login: `Authorization=Basic%20<base64(user:password)>`.
pub fn basic_form_body(credentials: &BasicCredentials) -> String {
    let pair = format!("{}:{}", credentials.user_name, credentials.password);
    format!("Authorization=Basic%20{}", STANDARD.encode(pair.as_bytes()))
}

/// Client for the tenant's `ecfs/authentication/` endpoint.
#[derive(Debug, Clone)]
pub struct Authenticator {
    http: HttpClient,
    url: Url,
}

impl Authenticator {
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self { http, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Log in with whichever method the load configuration carries.
    pub async fn authenticate(&self, authentication: &Authentication) -> Result<()> {
        match authentication {
            Authentication::OAuth { token } => self.login_token(token).await,
            Authentication::Basic(credentials) => self.login_basic(credentials).await,
        }
    }

    /// Basic authentication as a form post.
    pub async fn login_basic(&self, credentials: &BasicCredentials) -> Result<()> {
        if credentials.user_name.is_empty() || credentials.password.is_empty() {
            warn!("Authentication failed. Provide both username and password");
            return Err(CpcError::validation(
                "authentication.basic",
                "username and password are required",
            ));
        }

        let result = self
            .http
            .inner()
            .post(self.url.clone())
            .header(AUTHORIZATION, ECF_AUTH_SCHEME)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(basic_form_body(credentials))
            .send()
            .await;
        self.check_login(result)
    }

    /// OAuth bearer token authentication.
    pub async fn login_token(&self, token: &str) -> Result<()> {
        let result = self
            .http
            .inner()
            .post(self.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await;
        self.check_login(result)
    }

    /// Invalidate the session cookie. Any HTTP answer counts as logged out.
    pub async fn logout(&self) -> Result<()> {
        let response = self
            .http
            .inner()
            .delete(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                error!("Unloading failed. Endpoint [{}] error: {}", self.url, e);
                CpcError::from(e)
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                "Deauthentication failed. Endpoint [{}] responded HTTP [{}]",
                self.url,
                status.as_u16()
            );
        } else {
            info!(
                "Deauthenticated successfully. Endpoint [{}] responded HTTP [{}]",
                self.url,
                status.as_u16()
            );
        }
        Ok(())
    }

    fn check_login(&self, result: reqwest::Result<Response>) -> Result<()> {
        let response = result.map_err(|e| {
            error!(
                "Authentication failed. User will be directed to login screen. Endpoint [{}] error: {}",
                self.url, e
            );
            CpcError::from(e)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                "Authentication failed. User will be directed to login screen if possible. Endpoint [{}] responded HTTP [{}]",
                self.url,
                status.as_u16()
            );
            return Err(CpcError::Http {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        info!(
            "Authentication successful. Endpoint [{}] responded HTTP [{}]",
            self.url,
            status.as_u16()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        authorization: Option<String>,
        content_type: Option<String>,
        body: String,
    }

    fn record(
        method: &'static str,
        status: u16,
        seen: Arc<Mutex<Vec<Seen>>>,
    ) -> impl Fn(HeaderMap, String) -> std::future::Ready<axum::http::StatusCode>
       + Clone
       + Send
       + Sync
       + 'static {
        move |headers: HeaderMap, body: String| {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            seen.lock().unwrap().push(Seen {
                method: method.to_string(),
                authorization: header("authorization"),
                content_type: header("content-type"),
                body,
            });
            std::future::ready(axum::http::StatusCode::from_u16(status).unwrap())
        }
    }

    async fn auth_server(status: u16) -> (Url, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/ecfs/authentication/",
            post(record("POST", status, seen.clone()))
                .delete(record("DELETE", status, seen.clone())),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{}/ecfs/authentication/", addr)).unwrap();
        (url, seen)
    }

    fn authenticator(url: Url) -> Authenticator {
        Authenticator::new(HttpClient::new().unwrap(), url)
    }

    #[test]
    fn test_basic_form_body() {
        let credentials = BasicCredentials::new("agent", "pässword");
        let body = basic_form_body(&credentials);
        let expected = STANDARD.encode("agent:pässword".as_bytes());
        assert_eq!(body, format!("Authorization=Basic%20{}", expected));
    }

    #[tokio::test]
    async fn test_basic_login_sends_form() {
        let (url, seen) = auth_server(200).await;
        let auth = authenticator(url);

        auth.login_basic(&BasicCredentials::new("agent", "secret"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].authorization.as_deref(), Some("ECFAuth"));
        assert_eq!(
            seen[0].content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            seen[0].body,
            format!("Authorization=Basic%20{}", STANDARD.encode("agent:secret"))
        );
    }

    #[tokio::test]
    async fn test_token_login_sends_bearer() {
        let (url, seen) = auth_server(200).await;
        authenticator(url)
            .authenticate(&Authentication::OAuth {
                token: "abc.def".to_string(),
            })
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer abc.def"));
        assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_non_200_is_failure() {
        let (url, _) = auth_server(204).await;
        let err = authenticator(url).login_token("t").await.unwrap_err();
        assert!(matches!(err, CpcError::Http { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_empty_credentials_never_sent() {
        let (url, seen) = auth_server(200).await;
        let err = authenticator(url)
            .login_basic(&BasicCredentials::new("agent", ""))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_tolerates_error_status() {
        let (url, seen) = auth_server(401).await;
        authenticator(url).logout().await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].method, "DELETE");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/ecfs/authentication/", addr)).unwrap();
        let err = authenticator(url).login_token("t").await.unwrap_err();
        assert!(matches!(err, CpcError::Network { .. }));
    }
}
