//! Control API client.
//!
//! Uses reqwest to call the tunnel endpoints. Requests carry a bearer
//! token once one has been obtained or loaded from disk.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::ControlApi;
use super::types::{
    ApiUser, CreateTunnelParams, ErrorEnvelope, TunnelEnvelope, TunnelListEnvelope, TunnelRecord,
    TunnelSummary, UserEnvelope,
};

/// Production control API endpoint.
pub const DEFAULT_API_URL: &str = "https://forwardhq.com/api/v2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Control API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Control API error ({status}): {}", envelope.message)]
    Rejected { status: u16, envelope: ErrorEnvelope },

    #[error("Resource not found")]
    NotFound,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Control API client over HTTPS.
#[derive(Debug)]
pub struct HttpControlApi {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpControlApi {
    /// Create a client for `base_url` (e.g. `"https://forwardhq.com/api/v2"`).
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        if base_url.is_empty() {
            return Err(ApiError::Config("base_url is empty".into()));
        }

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .user_agent(format!("forward/{}", forward_core::VERSION))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Build the URL for an API path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let mut builder = self.http.request(method, self.api_url(path));
        let token = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Config("Invalid token format".into()))?;
            builder = builder.header(AUTHORIZATION, value);
        }
        Ok(builder)
    }

    /// Check HTTP response status, decoding the error envelope for failures.
    async fn check_status(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "Control API rejected request");
        let envelope = serde_json::from_str::<ErrorEnvelope>(&body).unwrap_or_else(|_| {
            ErrorEnvelope {
                message: status.canonical_reason().unwrap_or("Unknown").into(),
                ..ErrorEnvelope::default()
            }
        });
        Err(ApiError::Rejected {
            status: status.as_u16(),
            envelope,
        })
    }
}

#[async_trait]
impl ControlApi for HttpControlApi {
    fn authorize(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    async fn create_tunnel(&self, params: &CreateTunnelParams) -> Result<TunnelRecord, ApiError> {
        debug!(hostport = params.hostport, vhost = %params.vhost, "Creating tunnel");
        let resp = self
            .request(Method::POST, "/tunnels")?
            .json(&json!({ "tunnel": params }))
            .send()
            .await?;
        let envelope: TunnelEnvelope = Self::check_status(resp).await?.json().await?;
        Ok(envelope.tunnel)
    }

    async fn list_tunnels(&self) -> Result<Vec<TunnelSummary>, ApiError> {
        let resp = self.request(Method::GET, "/tunnels")?.send().await?;
        let envelope: TunnelListEnvelope = Self::check_status(resp).await?.json().await?;
        Ok(envelope.tunnels)
    }

    async fn show_tunnel(&self, id: &str) -> Result<Option<TunnelRecord>, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/tunnels/{id}"))?
            .send()
            .await?;
        match Self::check_status(resp).await {
            Ok(resp) => Ok(Some(resp.json::<TunnelEnvelope>().await?.tunnel)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn destroy_tunnel(&self, id: &str) -> Result<(), ApiError> {
        debug!(id, "Destroying tunnel");
        let resp = self
            .request(Method::DELETE, &format!("/tunnels/{id}"))?
            .send()
            .await?;
        match Self::check_status(resp).await {
            Ok(_) | Err(ApiError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn register_tunnel_key(&self, public_key: &str) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, "/tunnel_keys")?
            .json(&json!({ "tunnel_key": { "key": public_key } }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn api_token(&self, email: &str, password: &str) -> Result<ApiUser, ApiError> {
        let resp = self
            .request(Method::POST, "/users/api_token")?
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let envelope: UserEnvelope = Self::check_status(resp).await?.json().await?;
        Ok(envelope.user)
    }

    async fn submit_client_log(&self, log: String) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, "/client_logs")?
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(log)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}
