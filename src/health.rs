//! Legacy readiness probe against the upstream's `/health` endpoint.
//!
//! Used by the opt-in [`ShutdownRecovery::HealthPoll`](crate::config::ShutdownRecovery)
//! strategy: after a server-announced shutdown, the transport polls this
//! probe until the server reports ready (or a deadline passes) before
//! dialing again.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::error::{Result, StreamError};

/// Response body of `GET /health`.
#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: String,
}

/// HTTP probe for the upstream health endpoint.
///
/// Sends `Authorization: Bearer <token>`; the header value is cached at
/// construction time to avoid per-request allocation.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    http: reqwest::Client,
    health_url: String,
    auth_header: HeaderValue,
}

impl HealthProbe {
    /// Create a probe for an HTTP(S) base URL.
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .build()
            .map_err(StreamError::Http)?;

        let base = base_url.into();
        let base = base.trim_end_matches('/');
        let auth_header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| StreamError::Auth("token contains invalid header characters".into()))?;

        Ok(Self {
            http,
            health_url: format!("{base}/health"),
            auth_header,
        })
    }

    /// Create a probe from a stream endpoint URL, mapping `ws`/`wss` schemes
    /// back onto `http`/`https`.
    pub fn for_stream_endpoint(base_url: &str, token: &str) -> Result<Self> {
        let mut url = Url::parse(base_url)?;
        let scheme = match url.scheme() {
            "ws" | "http" => "http",
            "wss" | "https" => "https",
            other => {
                return Err(StreamError::InvalidArgument(format!(
                    "unsupported scheme {other:?}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| StreamError::InvalidArgument(format!("cannot use scheme {scheme:?}")))?;
        Self::new(url.as_str().trim_end_matches('/'), token)
    }

    /// One probe round-trip. `Ok(true)` iff the server answered 200 with
    /// `{"status": "ok"}`.
    pub async fn check(&self) -> Result<bool> {
        tracing::debug!(url = %self.health_url, "GET health");
        let resp = self
            .http
            .get(&self.health_url)
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: HealthBody = resp.json().await?;
        Ok(body.status == "ok")
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }
}
