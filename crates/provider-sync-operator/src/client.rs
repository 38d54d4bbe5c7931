//! Provider API gateway HTTP client
//!
//! Every service speaks JSON over `/v1/<service>/...` routes. Failures carry
//! an AWS-style body `{"code": "...", "message": "..."}`; the code is what the
//! per-service classifiers match on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Header naming the region a request targets
pub const REGION_HEADER: &str = "x-provider-region";

/// Provider reachability, used by the readiness probe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderHealth: Send + Sync {
    /// Check gateway readiness
    ///
    /// Returns `Ok(true)` if ready, `Ok(false)` if the gateway answered but is
    /// not ready. Returns `Err` on transport failures.
    async fn check_readiness(&self) -> Result<bool, ClientError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn api(status: u16, code: &str, message: &str) -> Self {
        ClientError::Api {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Provider error code, if the gateway returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn has_code(&self, expected: &str) -> bool {
        self.code() == Some(expected)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// JSON client for the provider API gateway
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl ProviderClient {
    /// Create a client for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid base URL, if the token
    /// contains invalid header characters, or if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {endpoint}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "endpoint {endpoint} cannot be used as a base URL"
            )));
        }

        if let Some(token) = &api_token {
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ClientError::Config("API token contains invalid characters".to_string())
            })?;
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    /// Build a URL from path segments; each segment is percent-encoded
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, region: Option<&str>) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(region) = region {
            request = request.header(REGION_HEADER, region);
        }
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let error = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ClientError::api(status.as_u16(), &body.code, &body.message),
            Err(_) => ClientError::api(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                &text,
            ),
        };
        debug!(status = status.as_u16(), error = %error, "Provider API error");
        Err(error)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        region: Option<&str>,
        segments: &[&str],
    ) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        let response = self.execute(self.request(Method::GET, url, region)).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        region: Option<&str>,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(segments)?;
        let response = self
            .execute(self.request(method, url, region).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// Send a request whose response body is ignored
    pub(crate) async fn send_unit<B>(
        &self,
        region: Option<&str>,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        self.execute(self.request(method, url, region).json(body))
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(
        &self,
        region: Option<&str>,
        segments: &[&str],
    ) -> Result<(), ClientError> {
        let url = self.url(segments)?;
        self.execute(self.request(Method::DELETE, url, region))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderHealth for ProviderClient {
    #[instrument(skip(self))]
    async fn check_readiness(&self) -> Result<bool, ClientError> {
        let url = self.url(&["v1", "health"])?;
        let response = self.request(Method::GET, url, None).send().await?;

        match response.status() {
            status if status.is_success() => {
                debug!("Provider readiness check: OK");
                Ok(true)
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                debug!("Provider readiness check: NOT READY");
                Ok(false)
            }
            status => Err(ClientError::api(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                "unexpected health response",
            )),
        }
    }
}
